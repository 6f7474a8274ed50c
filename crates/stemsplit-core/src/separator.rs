//! The `AudioSeparator` capability shared by every backend
//!
//! A backend either writes stem files itself (spleeter) or hands back
//! buffers that the adapter persists (demucs). Callers only see
//! `separate(input, output)`; where the stems land is described by each
//! adapter's output layout.

use std::path::Path;

use crate::config::{BackendKind, SeparatorConfig};
use crate::error::{Result, SeparationError};

/// How a separation run ended when it did not propagate an error
#[derive(Debug)]
pub enum SeparationOutcome {
    /// All stems were written
    Completed,

    /// An anticipated fault stopped the run; it has already been logged.
    /// Stems written before the fault stay on disk.
    Contained(SeparationError),
}

/// Trait for audio stem separators
///
/// ## Implementing a New Backend
///
/// ```ignore
/// struct MySeparator { config: MyConfig }
///
/// impl AudioSeparator for MySeparator {
///     fn separate(&self, input: &Path, output: &Path) -> Result<SeparationOutcome> {
///         check_input_file(input)?;
///         // 1. Run the backend
///         // 2. Make sure stems end up under `output`
///         Ok(SeparationOutcome::Completed)
///     }
///     // ...
/// }
/// ```
pub trait AudioSeparator: Send + Sync {
    /// Separate `input` into stems written under `output`
    ///
    /// A missing input yields `SeparationError::InputNotFound` before any
    /// directory is created or backend invoked.
    fn separate(&self, input: &Path, output: &Path) -> Result<SeparationOutcome>;

    /// Backend this separator wraps
    fn kind(&self) -> BackendKind;

    /// Configuration the separator was built with
    fn config(&self) -> SeparatorConfig;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Fail with `InputNotFound` unless `input` exists on the filesystem
pub fn check_input_file(input: &Path) -> Result<()> {
    if !input.exists() {
        log::error!("Input audio file not found at {}", input.display());
        return Err(SeparationError::InputNotFound {
            path: input.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_input_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.mp3");
        match check_input_file(&missing) {
            Err(SeparationError::InputNotFound { path }) => assert_eq!(path, missing),
            other => panic!("expected InputNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_check_input_file_present() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(check_input_file(file.path()).is_ok());
    }
}
