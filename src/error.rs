//! Error types for folio
//!
//! Every failure maps onto one HTTP-style status so callers can branch on the
//! kind without string matching:
//! - 400: invalid input (never reaches the remote store)
//! - 401/403: authentication / permission failures
//! - 404: missing path, ref, or repository
//! - 409: stale base revision
//! - 429: rate limited by the remote store
//! - 500: everything else
//!
//! CLI exit codes:
//! - 0: Success
//! - 2: User error (bad args, unknown path)
//! - 3: Blocked (stale revision, permission denied)
//! - 4: Operation failed (transport, git, io)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the folio CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;

    /// Exit code for an HTTP-style status
    pub fn for_status(status: u16) -> i32 {
        match status {
            400 | 404 => USER_ERROR,
            401 | 403 | 409 | 429 => BLOCKED,
            _ => OPERATION_FAILED,
        }
    }
}

/// Main error type for folio operations
#[derive(Error, Debug)]
pub enum Error {
    // Local validation (400)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid repository identifier '{0}': expected owner/name")]
    InvalidRepoFormat(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Missing resources (404)
    #[error("Not found: {path} at {reference}")]
    NotFound { path: String, reference: String },

    #[error("Not a file: {0}")]
    NotAFile(String),

    // Stale base revision (409)
    #[error("Conflict on {path}: {message}")]
    Conflict { path: String, message: String },

    // Auth (401 / 403)
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // Throttling (429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Unexpected (500)
    #[error("Cannot decode {path}: unsupported encoding '{encoding}'")]
    Undecodable { path: String, encoding: String },

    #[error("Remote store returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    pub(crate) fn not_found(path: impl Into<String>, reference: impl Into<String>) -> Self {
        Error::NotFound {
            path: path.into(),
            reference: reference.into(),
        }
    }

    pub(crate) fn conflict(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Conflict {
            path: path.into(),
            message: message.into(),
        }
    }

    /// HTTP-style status for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidInput(_) | Error::InvalidRepoFormat(_) | Error::InvalidConfig(_) => 400,
            Error::AuthFailure(_) => 401,
            Error::PermissionDenied(_) => 403,
            Error::NotFound { .. } | Error::NotAFile(_) => 404,
            Error::Conflict { .. } => 409,
            Error::RateLimited(_) => 429,
            Error::Undecodable { .. }
            | Error::Remote { .. }
            | Error::Http(_)
            | Error::Git(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_)
            | Error::OperationFailed(_) => 500,
        }
    }

    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) | Error::InvalidRepoFormat(_) | Error::InvalidConfig(_) => {
                "invalid_input"
            }
            Error::NotFound { .. } | Error::NotAFile(_) => "not_found",
            Error::Conflict { .. } => "conflict",
            Error::AuthFailure(_) => "auth_failure",
            Error::PermissionDenied(_) => "permission_denied",
            Error::RateLimited(_) => "rate_limited",
            Error::Undecodable { .. } => "undecodable",
            _ => "unexpected",
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        exit_codes::for_status(self.status_code())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Structured fields for JSON error bodies
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::NotFound { path, reference } => Some(serde_json::json!({
                "path": path,
                "reference": reference,
            })),
            Error::Conflict { path, message } => Some(serde_json::json!({
                "path": path,
                "message": message,
            })),
            Error::Undecodable { path, encoding } => Some(serde_json::json!({
                "path": path,
                "encoding": encoding,
            })),
            Error::Remote { status, message } => Some(serde_json::json!({
                "remote_status": status,
                "message": message,
            })),
            Error::InvalidRepoFormat(raw) => Some(serde_json::json!({ "input": raw })),
            _ => None,
        }
    }
}

/// Result type alias for folio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error body carried inside the response envelope
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JsonError {
    pub kind: String,
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            kind: err.kind().to_string(),
            status: err.status_code(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(Error::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(Error::InvalidRepoFormat("x".into()).status_code(), 400);
        assert_eq!(Error::not_found("a.md", "main").status_code(), 404);
        assert_eq!(Error::conflict("a.md", "stale").status_code(), 409);
        assert_eq!(Error::AuthFailure("bad token".into()).status_code(), 401);
        assert_eq!(Error::PermissionDenied("ro".into()).status_code(), 403);
        assert_eq!(Error::RateLimited("slow down".into()).status_code(), 429);
        assert_eq!(Error::OperationFailed("boom".into()).status_code(), 500);
    }

    #[test]
    fn conflict_blocks_with_exit_code_three() {
        let err = Error::conflict("posts/a.md", "sha mismatch");
        assert_eq!(err.exit_code(), exit_codes::BLOCKED);
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn json_error_carries_details() {
        let err = Error::not_found("posts/a.md", "main");
        let json = JsonError::from(&err);
        assert_eq!(json.status, 404);
        assert_eq!(json.kind, "not_found");
        let details = json.details.expect("details");
        assert_eq!(details["path"], "posts/a.md");
        assert_eq!(details["reference"], "main");
    }
}
