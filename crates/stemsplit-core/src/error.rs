//! Separation error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during backend selection or audio separation
#[derive(Error, Debug)]
pub enum SeparationError {
    #[error("Input audio file not found at {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("Invalid argument: unrecognized separation tool '{0}'")]
    InvalidArgument(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Model download failed: {0}")]
    ModelDownloadFailed(String),

    #[error("Failed to read audio file: {}", path.display())]
    AudioReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Backend initialization failed: {0}")]
    BackendInitFailed(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Failed to write stem file: {}", path.display())]
    StemWriteError {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Separation backend failed: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Broad category of a [`SeparationError`]
///
/// Adapters decide containment by class, not by variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    NotFound,
    InvalidArgument,
    Computation,
    InvalidValue,
    Io,
    Other,
}

impl SeparationError {
    /// Category of this error
    pub fn fault_class(&self) -> FaultClass {
        match self {
            Self::InputNotFound { .. } => FaultClass::NotFound,
            Self::InvalidArgument(_) => FaultClass::InvalidArgument,
            Self::BackendInitFailed(_) | Self::Inference(_) | Self::UnknownModel(_) => {
                FaultClass::Computation
            }
            Self::InvalidValue(_) | Self::UnsupportedFormat(_) => FaultClass::InvalidValue,
            Self::Io(_)
            | Self::AudioReadError { .. }
            | Self::StemWriteError { .. }
            | Self::ModelDownloadFailed(_) => FaultClass::Io,
            Self::Backend(_) | Self::InvalidConfig(_) => FaultClass::Other,
        }
    }

    /// Whether the waveform adapter absorbs this error instead of propagating it
    pub fn is_contained(&self) -> bool {
        matches!(
            self.fault_class(),
            FaultClass::Computation | FaultClass::InvalidValue | FaultClass::Io
        )
    }

    /// Full `source()` chain joined into one line, for diagnostics
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

pub type Result<T> = std::result::Result<T, SeparationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contained_classes() {
        assert!(SeparationError::Inference("oom".into()).is_contained());
        assert!(SeparationError::InvalidValue("shape".into()).is_contained());
        assert!(SeparationError::Io(std::io::Error::other("disk full")).is_contained());
        assert!(SeparationError::ModelDownloadFailed("timeout".into()).is_contained());
        // The waveform backend fails to construct, same as any load failure
        assert!(SeparationError::UnknownModel("mdx_extra".into()).is_contained());
    }

    #[test]
    fn test_fatal_classes() {
        assert!(!SeparationError::Backend("spleeter exited 1".into()).is_contained());
        assert!(!SeparationError::InvalidConfig("no cache dir".into()).is_contained());
        assert!(!SeparationError::InvalidArgument("foo".into()).is_contained());
        assert!(!SeparationError::InputNotFound {
            path: PathBuf::from("missing.mp3")
        }
        .is_contained());
    }

    #[test]
    fn test_chain_includes_source() {
        let err = SeparationError::AudioReadError {
            path: PathBuf::from("song.mp3"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.chain(), "Failed to read audio file: song.mp3: denied");
    }
}
