//! Separation configuration types

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SeparationError;

/// Default spleeter preset (vocals, drums, bass, piano, other)
pub const DEFAULT_SPLEETER_MODEL: &str = "spleeter:5stems";

/// Default demucs model (drums, bass, other, vocals)
pub const DEFAULT_DEMUCS_MODEL: &str = "htdemucs";

/// Available separation backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Spectrogram-mask separation via spleeter (writes its own files)
    Spleeter,

    /// Waveform-domain separation via demucs (returns stems in memory)
    #[default]
    Demucs,
}

impl BackendKind {
    /// Identifier used on the command line and in settings files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spleeter => "spleeter",
            Self::Demucs => "demucs",
        }
    }

    /// All backend kinds
    pub fn all() -> &'static [Self] {
        &[Self::Spleeter, Self::Demucs]
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = SeparationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SeparationError::InvalidArgument(s.to_string()))
    }
}

/// Sample encoding for stems written by the waveform backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StemEncoding {
    /// 16-bit integer PCM, rescaled when the peak exceeds full scale
    #[default]
    Pcm16,

    /// 32-bit IEEE float, written as-is
    Float32,
}

/// Configuration for the spleeter backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpleeterConfig {
    /// Preset name, passed through to spleeter unmodified
    /// (`spleeter:2stems`, `spleeter:4stems`, `spleeter:5stems`)
    pub model_name: String,
}

impl Default for SpleeterConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_SPLEETER_MODEL.to_string(),
        }
    }
}

/// Configuration for the demucs backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemucsConfig {
    /// Pretrained model name; also the first level of the output layout
    pub model_name: String,

    /// How stems are encoded on disk
    pub encoding: StemEncoding,

    /// Weight cache directory; `None` uses `~/.cache/stemsplit/models`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,
}

impl Default for DemucsConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_DEMUCS_MODEL.to_string(),
            encoding: StemEncoding::default(),
            model_dir: None,
        }
    }
}

/// Stored configuration for every backend; one of them is picked per run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfigs {
    pub spleeter: SpleeterConfig,
    pub demucs: DemucsConfig,
}

impl BackendConfigs {
    /// Configuration for `kind`, copied out of the stored set
    pub fn config_for(&self, kind: BackendKind) -> SeparatorConfig {
        match kind {
            BackendKind::Spleeter => SeparatorConfig::Spleeter(self.spleeter.clone()),
            BackendKind::Demucs => SeparatorConfig::Demucs(self.demucs.clone()),
        }
    }
}

/// Backend-specific configuration, one variant per [`BackendKind`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeparatorConfig {
    Spleeter(SpleeterConfig),
    Demucs(DemucsConfig),
}

impl SeparatorConfig {
    /// Default configuration for a backend
    pub fn default_for(kind: BackendKind) -> Self {
        BackendConfigs::default().config_for(kind)
    }

    /// Backend this configuration belongs to
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Spleeter(_) => BackendKind::Spleeter,
            Self::Demucs(_) => BackendKind::Demucs,
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            Self::Spleeter(config) => &config.model_name,
            Self::Demucs(config) => &config.model_name,
        }
    }

    /// Replace the model identifier, keeping the variant
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        let model_name = model_name.into();
        match &mut self {
            Self::Spleeter(config) => config.model_name = model_name,
            Self::Demucs(config) => config.model_name = model_name,
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("spleeter".parse::<BackendKind>().unwrap(), BackendKind::Spleeter);
        assert_eq!("demucs".parse::<BackendKind>().unwrap(), BackendKind::Demucs);
    }

    #[test]
    fn test_backend_kind_parse_rejects_unknown() {
        for bad in ["", "Demucs", "open-unmix", "spleeter "] {
            match bad.parse::<BackendKind>() {
                Err(SeparationError::InvalidArgument(value)) => assert_eq!(value, bad),
                other => panic!("expected InvalidArgument for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_default_backend_is_demucs() {
        assert_eq!(BackendKind::default(), BackendKind::Demucs);
    }

    #[test]
    fn test_default_models() {
        assert_eq!(
            SeparatorConfig::default_for(BackendKind::Spleeter).model_name(),
            "spleeter:5stems"
        );
        assert_eq!(
            SeparatorConfig::default_for(BackendKind::Demucs).model_name(),
            "htdemucs"
        );
    }

    #[test]
    fn test_with_model_name_keeps_variant() {
        let config = SeparatorConfig::default_for(BackendKind::Spleeter)
            .with_model_name("spleeter:2stems");
        assert_eq!(config.kind(), BackendKind::Spleeter);
        assert_eq!(config.model_name(), "spleeter:2stems");
    }

    #[test]
    fn test_config_for_picks_stored_variant() {
        let mut configs = BackendConfigs::default();
        configs.spleeter.model_name = "spleeter:2stems".to_string();
        configs.demucs.encoding = StemEncoding::Float32;

        assert_eq!(
            configs.config_for(BackendKind::Spleeter),
            SeparatorConfig::Spleeter(configs.spleeter.clone())
        );
        match configs.config_for(BackendKind::Demucs) {
            SeparatorConfig::Demucs(config) => assert_eq!(config.encoding, StemEncoding::Float32),
            other => panic!("expected demucs config, got {:?}", other),
        }
    }

    #[test]
    fn test_demucs_config_yaml_defaults() {
        let config: DemucsConfig = serde_yaml::from_str("encoding: float32").unwrap();
        assert_eq!(config.model_name, DEFAULT_DEMUCS_MODEL);
        assert_eq!(config.encoding, StemEncoding::Float32);
    }
}
