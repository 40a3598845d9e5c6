//! Error types for dice-eval operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dice-eval operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during Dice evaluation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed user input, detected before any volume is read.
    #[error("Invalid input: {0}")]
    InputValidation(String),

    /// No decoder handles this kind of file.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A single decoder failed to read a volume.
    #[error("Failed to decode {path}: {reason}")]
    Decode {
        /// Path to the volume that failed to decode.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// The strict decoder refused the file's direction cosines.
    #[error("Direction cosines are not orthonormal: {path}")]
    NonOrthonormalDirection {
        /// Path to the offending volume.
        path: PathBuf,
    },

    /// Both decoders of a fallback chain failed.
    #[error("Unreadable volume {path}: {primary}; fallback decoder: {secondary}")]
    VolumeRead {
        /// Path to the unreadable volume.
        path: PathBuf,
        /// Error from the primary decoder.
        primary: Box<Error>,
        /// Error from the secondary decoder.
        #[source]
        secondary: Box<Error>,
    },

    /// Ground truth and prediction dimensions differ.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Ground-truth shape `[z, y, x]`.
        expected: [usize; 3],
        /// Prediction shape `[z, y, x]`.
        actual: [usize; 3],
    },

    /// A voxel value does not fit the requested storage width.
    #[error("Voxel value {value} in {path} does not fit {width}")]
    LabelOutOfRange {
        /// Path to the volume.
        path: PathBuf,
        /// The offending value.
        value: f64,
        /// Storage width name.
        width: &'static str,
    },

    /// The worker pool could not be created.
    #[error("Executor error: {0}")]
    Executor(String),

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Whether a fallback decoder may succeed where this error was raised.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonOrthonormalDirection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_direction_errors_are_recoverable() {
        let direction = Error::NonOrthonormalDirection { path: PathBuf::from("a.nii") };
        assert!(direction.is_recoverable());

        let decode = Error::Decode { path: PathBuf::from("a.nii"), reason: "truncated".to_string() };
        assert!(!decode.is_recoverable());
        assert!(!Error::UnsupportedFormat("a.txt".to_string()).is_recoverable());
    }

    #[test]
    fn test_volume_read_mentions_both_causes() {
        let err = Error::VolumeRead {
            path: PathBuf::from("case.nii.gz"),
            primary: Box::new(Error::NonOrthonormalDirection { path: PathBuf::from("case.nii.gz") }),
            secondary: Box::new(Error::Decode {
                path: PathBuf::from("case.nii.gz"),
                reason: "bad header".to_string(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("not orthonormal"));
        assert!(msg.contains("bad header"));
    }
}
