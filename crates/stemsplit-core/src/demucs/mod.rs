//! Demucs backend
//!
//! Unlike spleeter, demucs hands back the separated stems as buffers, so
//! this adapter owns device selection, backend construction and writing
//! each stem to disk.
//!
//! ## Output layout
//!
//! ```text
//! <output>/<model_name>/<input file stem>/<stem name>.wav
//! ```
//!
//! ## Failure policy
//!
//! Computation, invalid-value and I/O faults raised while loading the model,
//! running inference or writing stems are logged and reported as
//! `SeparationOutcome::Contained`. Anything else propagates. Stems written
//! before a fault stay on disk.

mod audio;
mod engine;
mod models;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{BackendKind, DemucsConfig, SeparatorConfig};
use crate::error::{Result, SeparationError};
use crate::separator::{check_input_file, AudioSeparator, SeparationOutcome};
use crate::stems::{write_stem_wav, StemSet, Waveform};

pub use audio::{decode_audio, resample_channel, to_stereo};
pub use engine::{OrtDemucsEngine, OrtDemucsLoader};
pub use models::{find_model, ModelManager, WaveformModel, ALL_MODELS, HTDEMUCS};

/// Compute device for waveform inference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Cpu,
}

impl Device {
    /// Accelerator when available, otherwise the CPU
    pub fn select(gpu_available: bool) -> Self {
        if gpu_available {
            Self::Cuda
        } else {
            Self::Cpu
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded waveform separation model bound to one device
pub trait WaveformEngine: Send {
    /// Sample rate of the stems this engine returns
    fn sample_rate(&self) -> u32;

    /// Separate a file, returning the (resampled) mix and the stems
    fn separate_audio_file(&mut self, input: &Path) -> Result<(Waveform, StemSet)>;
}

/// Constructs waveform engines
pub trait WaveformEngineLoader: Send + Sync {
    /// Whether an accelerator can be targeted on this host
    fn gpu_available(&self) -> bool;

    /// Build an engine for `model_name` on `device`. May download weights.
    fn load(&self, model_name: &str, device: Device) -> Result<Box<dyn WaveformEngine>>;
}

/// Directory the stems of `input` are written to
///
/// `<output>/<model_name>/<input file name without extension>`
pub fn song_output_dir(output: &Path, model_name: &str, input: &Path) -> Result<PathBuf> {
    let base_name = input.file_stem().ok_or_else(|| {
        SeparationError::InvalidValue(format!(
            "Input path has no file name: {}",
            input.display()
        ))
    })?;
    Ok(output.join(model_name).join(base_name))
}

/// Separator backed by demucs
pub struct DemucsSeparator {
    config: DemucsConfig,
    loader: Box<dyn WaveformEngineLoader>,
}

impl DemucsSeparator {
    /// Create a separator running demucs through ONNX Runtime
    pub fn new(config: DemucsConfig) -> Self {
        let loader = OrtDemucsLoader::with_cache_dir(config.model_dir.clone());
        Self::with_loader(config, Box::new(loader))
    }

    /// Create a separator around a specific engine loader
    pub fn with_loader(config: DemucsConfig, loader: Box<dyn WaveformEngineLoader>) -> Self {
        Self { config, loader }
    }

    /// Load, separate and write every stem; the directory written to on success
    fn run(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        let device = Device::select(self.loader.gpu_available());
        log::info!("Demucs will use device: {}", device);

        let mut engine = self.loader.load(&self.config.model_name, device)?;

        log::info!(
            "Processing {} with Demucs model {}...",
            input.display(),
            self.config.model_name
        );
        let (_mix, stems) = engine.separate_audio_file(input)?;

        let song_dir = song_output_dir(output, &self.config.model_name, input)?;
        if !song_dir.is_dir() {
            std::fs::create_dir_all(&song_dir)?;
            log::info!("Created output directory: {}", song_dir.display());
        }

        let sample_rate = engine.sample_rate();
        for stem in stems.iter() {
            let path = song_dir.join(format!("{}.wav", stem.name));
            write_stem_wav(&path, &stem.audio, sample_rate, self.config.encoding)?;
            log::info!("Saved {} to {}", stem.name, path.display());
        }

        Ok(song_dir)
    }
}

impl AudioSeparator for DemucsSeparator {
    fn separate(&self, input: &Path, output: &Path) -> Result<SeparationOutcome> {
        log::info!("--- Using Demucs (model: {}) ---", self.config.model_name);
        check_input_file(input)?;

        match self.run(input, output) {
            Ok(song_dir) => {
                log::info!(
                    "Demucs separation complete. Output files are in {}",
                    song_dir.display()
                );
                Ok(SeparationOutcome::Completed)
            }
            Err(e) if e.is_contained() => {
                log::error!("Error during Demucs processing: {}", e.chain());
                log::debug!("Demucs failure detail: {:?}", e);
                Ok(SeparationOutcome::Contained(e))
            }
            Err(e) => Err(e),
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Demucs
    }

    fn config(&self) -> SeparatorConfig {
        SeparatorConfig::Demucs(self.config.clone())
    }

    fn name(&self) -> &'static str {
        "Demucs"
    }
}
