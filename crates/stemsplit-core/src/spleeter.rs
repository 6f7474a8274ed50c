//! Spleeter backend
//!
//! Spleeter is a Python tool that decodes, separates and encodes in one
//! call, choosing its own file names under the output directory. It is run
//! as a subprocess rather than through bindings:
//!
//! ```text
//! <program> separate -p <preset> -o <output_dir> <input>
//! ```
//!
//! The executable is taken from `STEMSPLIT_SPLEETER`, falling back to
//! `spleeter` on `PATH`.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::{BackendKind, SeparatorConfig, SpleeterConfig};
use crate::error::{Result, SeparationError};
use crate::separator::{check_input_file, AudioSeparator, SeparationOutcome};

/// Environment variable naming the spleeter executable
pub const SPLEETER_ENV: &str = "STEMSPLIT_SPLEETER";

/// A backend that separates a file and writes the stems itself
pub trait SpectrogramEngine: Send + Sync {
    fn separate_to_file(&self, model_name: &str, input: &Path, output_dir: &Path) -> Result<()>;
}

/// Runs the spleeter command-line tool
pub struct SpleeterCli {
    program: PathBuf,
}

impl SpleeterCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Program from `STEMSPLIT_SPLEETER`, or `spleeter` on `PATH`
    pub fn from_env() -> Self {
        let program = std::env::var_os(SPLEETER_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("spleeter"));
        Self::new(program)
    }
}

impl SpectrogramEngine for SpleeterCli {
    fn separate_to_file(&self, model_name: &str, input: &Path, output_dir: &Path) -> Result<()> {
        log::debug!(
            "Running {:?} separate -p {} -o {:?} {:?}",
            self.program,
            model_name,
            output_dir,
            input
        );

        let output = Command::new(&self.program)
            .arg("separate")
            .arg("-p")
            .arg(model_name)
            .arg("-o")
            .arg(output_dir)
            .arg(input)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                SeparationError::Backend(format!(
                    "Failed to execute {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SeparationError::Backend(format!(
                "spleeter failed with exit code {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Separator backed by spleeter
///
/// Any failure inside the delegated call propagates to the caller.
pub struct SpleeterSeparator {
    config: SpleeterConfig,
    engine: Box<dyn SpectrogramEngine>,
}

impl SpleeterSeparator {
    /// Create a separator that runs the spleeter executable
    pub fn new(config: SpleeterConfig) -> Self {
        Self::with_engine(config, Box::new(SpleeterCli::from_env()))
    }

    /// Create a separator around a specific engine
    pub fn with_engine(config: SpleeterConfig, engine: Box<dyn SpectrogramEngine>) -> Self {
        Self { config, engine }
    }
}

impl AudioSeparator for SpleeterSeparator {
    fn separate(&self, input: &Path, output: &Path) -> Result<SeparationOutcome> {
        log::info!("--- Using Spleeter (model: {}) ---", self.config.model_name);
        check_input_file(input)?;

        if !output.is_dir() {
            std::fs::create_dir_all(output)?;
            log::info!("Created output directory: {}", output.display());
        }

        log::info!(
            "Processing {} with Spleeter model {}...",
            input.display(),
            self.config.model_name
        );
        self.engine
            .separate_to_file(&self.config.model_name, input, output)?;

        log::info!(
            "Spleeter separation complete. Output files are in {}",
            output.display()
        );
        Ok(SeparationOutcome::Completed)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Spleeter
    }

    fn config(&self) -> SeparatorConfig {
        SeparatorConfig::Spleeter(self.config.clone())
    }

    fn name(&self) -> &'static str {
        "Spleeter"
    }
}
