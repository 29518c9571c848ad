// Error types for drive-reports.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reasons for every store, API and auth operation.
#[derive(Error, Debug)]
pub enum DriveError {
    /// No valid credential and no way to obtain one. The process cannot continue.
    #[error("Authorization failed: {0}")]
    Auth(String),

    /// A named folder could not be resolved to an identifier.
    #[error("Folder '{0}' not found")]
    FolderNotFound(String),

    /// The local file to upload does not exist.
    #[error("Local file not found: {}", .0.display())]
    LocalFileNotFound(PathBuf),

    /// A caller-supplied record name cannot be used.
    #[error("Invalid name: '{0}'")]
    InvalidName(String),

    /// The service answered with a non-success status.
    #[error("Remote error {status}: {message}")]
    Remote { status: u16, message: String },

    /// Network request error.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with something we could not interpret.
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    /// A downloaded blob is not a report in the expected format.
    #[error("Malformed report: {0}")]
    MalformedReport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DriveError {
    /// Only authorization failures stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriveError::Auth(_))
    }
}

/// Result type alias for drive-reports operations.
pub type Result<T> = std::result::Result<T, DriveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_auth_is_fatal() {
        assert!(DriveError::Auth("no token".into()).is_fatal());
        assert!(!DriveError::FolderNotFound("x".into()).is_fatal());
        assert!(!DriveError::Remote {
            status: 403,
            message: "quota".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = DriveError::LocalFileNotFound(PathBuf::from("missing.txt"));
        assert_eq!(err.to_string(), "Local file not found: missing.txt");
        let err = DriveError::Remote {
            status: 404,
            message: "File not found: abc".into(),
        };
        assert_eq!(err.to_string(), "Remote error 404: File not found: abc");
    }
}
