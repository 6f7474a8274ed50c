//! Stemsplit core - audio stem separation behind one interface
//!
//! Two backends with incompatible native contracts are driven through the
//! same [`AudioSeparator::separate`] call:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SeparatorFactory                        │
//! │  • BackendKind -> (config, separator)                   │
//! └─────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │              AudioSeparator (trait)                      │
//! │  • separate(input, output)                              │
//! └─────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               ▼                              ▼
//!     ┌───────────────────┐          ┌───────────────────┐
//!     │ SpleeterSeparator │          │  DemucsSeparator  │
//!     │ (writes files)    │          │ (returns buffers) │
//!     └───────────────────┘          └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! let separator = SeparatorFactory::create(BackendKind::Demucs);
//! separator.separate(Path::new("song.mp3"), Path::new("output_stems/demucs"))?;
//! ```

pub mod config;
pub mod demucs;
pub mod error;
pub mod factory;
pub mod separator;
pub mod spleeter;
pub mod stems;

pub use config::{
    BackendConfigs, BackendKind, DemucsConfig, SeparatorConfig, SpleeterConfig, StemEncoding,
};
pub use demucs::{DemucsSeparator, Device, WaveformEngine, WaveformEngineLoader};
pub use error::{FaultClass, Result, SeparationError};
pub use factory::SeparatorFactory;
pub use separator::{check_input_file, AudioSeparator, SeparationOutcome};
pub use spleeter::{SpectrogramEngine, SpleeterCli, SpleeterSeparator};
pub use stems::{write_stem_wav, Stem, StemSet, Waveform};
