//! Error types for the background removal pipeline

use crate::types::ErrorDetail;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error taxonomy for acquisition, compression, submission and storage
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Local input could not be decoded; recovered by submitting the original
    #[error("Decode error: {0}")]
    Decode(String),

    /// No response was obtained from the remote service
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote service answered with a structured failure
    #[error("Remote error: {}", crate::types::format_error_details(.0).trim_end())]
    Remote(Vec<ErrorDetail>),

    /// Storage access was refused by the permission gate
    #[error("Permission denied: storage access is required to save images")]
    PermissionDenied,

    /// Acquisition produced nothing usable
    #[error("No image selected")]
    NoImageSelected,

    /// A request for the same input is still running
    #[error("A request for '{}' is already in flight", .0.display())]
    AlreadyInFlight(PathBuf),

    /// An event arrived for a request that cannot accept it
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid transition error
    pub fn invalid_transition<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTransition(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Flatten this error into the detail entries shown to the user
    ///
    /// Remote failures keep their provider entries; everything else becomes
    /// a single synthesized entry so that a failed run never has an empty
    /// detail list.
    #[must_use]
    pub fn into_details(self) -> Vec<ErrorDetail> {
        match self {
            Self::Remote(details) if !details.is_empty() => details,
            Self::Remote(_) => vec![ErrorDetail::generic()],
            Self::Transport(msg) => vec![ErrorDetail::new("Network error", msg, None)],
            Self::Io(e) => vec![ErrorDetail::new("Storage error", e.to_string(), None)],
            other => vec![ErrorDetail::new("Error", other.to_string(), None)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_display() {
        let err = PipelineError::invalid_config("missing api key");
        assert_eq!(err.to_string(), "Invalid configuration: missing api key");

        let err = PipelineError::AlreadyInFlight(PathBuf::from("/tmp/beach.jpg"));
        assert!(err.to_string().contains("/tmp/beach.jpg"));
    }

    #[test]
    fn test_file_io_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = PipelineError::file_io_error("write image", Path::new("/out/a.png"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("write image"));
        assert!(error_string.contains("/out/a.png"));
        assert!(error_string.contains("access denied"));
    }

    #[test]
    fn test_config_value_error() {
        let err = PipelineError::config_value_error("timeout", 0, "1-600", Some(60));
        let error_string = err.to_string();
        assert!(error_string.contains("timeout"));
        assert!(error_string.contains("1-600"));
        assert!(error_string.contains("Recommended: 60"));
    }

    #[test]
    fn test_remote_error_lists_every_detail() {
        let err = PipelineError::Remote(vec![
            ErrorDetail::new("Bad file", "Too small", Some("resolution_too_low".into())),
            ErrorDetail::new("Credits", "None left", None),
        ]);
        let text = err.to_string();
        assert!(text.contains("Bad file : Too small : resolution_too_low"));
        assert!(text.contains("Credits : None left"));
    }

    #[test]
    fn test_into_details_never_empty() {
        assert_eq!(PipelineError::Remote(Vec::new()).into_details().len(), 1);

        let details = PipelineError::transport("connection refused").into_details();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].title, "Network error");
        assert!(details[0].detail.contains("connection refused"));

        let details = PipelineError::NoImageSelected.into_details();
        assert_eq!(details[0].detail, "No image selected");
    }
}
