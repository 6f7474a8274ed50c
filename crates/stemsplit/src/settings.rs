//! Settings for the stemsplit command
//!
//! Stored as YAML. Default location: ~/.config/stemsplit/config.yaml
//! Command-line flags take precedence over anything set here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use stemsplit_core::{BackendConfigs, BackendKind};

/// Input used when neither the command line nor the settings name one
pub const DEFAULT_INPUT: &str = "sample_audio/tijucos-no-dia-que-de.mp3";

/// Root under which `<tool>/` output directories are created by default
pub const DEFAULT_OUTPUT_ROOT: &str = "output_stems";

/// Root settings structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Backend identifier (`spleeter` or `demucs`). Kept as text so an
    /// unknown value is rejected by backend selection, not by the YAML parser.
    pub backend: String,
    /// Input audio file
    pub input: PathBuf,
    /// Default output root; the backend name is appended
    pub output_root: PathBuf,
    /// Per-backend settings, stored as top-level `spleeter:` and `demucs:` sections
    #[serde(flatten)]
    pub backends: BackendConfigs,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default().as_str().to_string(),
            input: PathBuf::from(DEFAULT_INPUT),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            backends: BackendConfigs::default(),
        }
    }
}

/// Get the default settings file path
///
/// Returns: ~/.config/stemsplit/config.yaml
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stemsplit")
        .join("config.yaml")
}

/// Load settings from a YAML file
///
/// If the file doesn't exist, returns default settings.
/// If the file exists but is invalid, logs a warning and returns defaults.
pub fn load_settings(path: &Path) -> Settings {
    log::debug!("load_settings: Loading from {:?}", path);

    if !path.exists() {
        log::debug!("load_settings: Settings file doesn't exist, using defaults");
        return Settings::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Settings>(&contents) {
            Ok(settings) => {
                log::info!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                log::warn!("load_settings: Failed to parse settings: {}, using defaults", e);
                Settings::default()
            }
        },
        Err(e) => {
            log::warn!("load_settings: Failed to read settings file: {}, using defaults", e);
            Settings::default()
        }
    }
}

/// Save settings to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(settings).context("Failed to serialize settings to YAML")?;

    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write settings file: {:?}", path))?;

    log::info!("Saved settings to {:?}", path);
    Ok(())
}
