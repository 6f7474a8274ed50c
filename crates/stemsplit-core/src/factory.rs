//! Backend selection
//!
//! Maps a [`BackendKind`] to its configuration and separator. The mapping
//! is an exhaustive match, so a new backend cannot be added without a
//! constructor here; unrecognized identifiers are rejected while parsing.

use crate::config::{BackendConfigs, BackendKind, SeparatorConfig};
use crate::demucs::DemucsSeparator;
use crate::error::Result;
use crate::separator::AudioSeparator;
use crate::spleeter::SpleeterSeparator;

/// Creates configured separators; holds no state between calls
pub struct SeparatorFactory;

impl SeparatorFactory {
    /// Separator for `kind` with that backend's default configuration
    pub fn create(kind: BackendKind) -> Box<dyn AudioSeparator> {
        Self::create_with(SeparatorConfig::default_for(kind))
    }

    /// Separator matching the variant of `config`
    pub fn create_with(config: SeparatorConfig) -> Box<dyn AudioSeparator> {
        log::debug!(
            "Creating {} separator (model: {})",
            config.kind(),
            config.model_name()
        );
        match config {
            SeparatorConfig::Spleeter(config) => Box::new(SpleeterSeparator::new(config)),
            SeparatorConfig::Demucs(config) => Box::new(DemucsSeparator::new(config)),
        }
    }

    /// Configuration for a backend identifier such as `"demucs"`, taken
    /// from `configs`
    ///
    /// Fails with `SeparationError::InvalidArgument` for anything else, before
    /// any configuration is built.
    pub fn config_from_name(name: &str, configs: &BackendConfigs) -> Result<SeparatorConfig> {
        let kind: BackendKind = name.parse()?;
        Ok(configs.config_for(kind))
    }
}
