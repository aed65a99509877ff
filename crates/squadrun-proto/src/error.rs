//! Failure kinds for a single API call.

use std::time::Duration;

/// Result alias for API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Why an API call produced no usable value.
///
/// Transport-level faults and server refusals are kept apart from
/// `Malformed`, which means the server answered but the body did not match
/// the schema the caller expected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// DNS failure, refused connection, reset, TLS error.
    #[error("transport error calling {path}: {reason}")]
    Transport { path: String, reason: String },

    /// The call did not complete within the per-call timeout.
    #[error("request to {path} timed out after {}s", timeout.as_secs())]
    Timeout { path: String, timeout: Duration },

    /// The server answered with a non-success status.
    #[error("request to {path} failed with status {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    /// The body was not JSON, or did not match the endpoint schema.
    #[error("malformed response from {path}: {reason}")]
    Malformed { path: String, reason: String },
}

impl ApiError {
    /// The request path the error belongs to.
    pub fn path(&self) -> &str {
        match self {
            ApiError::Transport { path, .. }
            | ApiError::Timeout { path, .. }
            | ApiError::Status { path, .. }
            | ApiError::Malformed { path, .. } => path,
        }
    }

    /// Returns true for `Malformed`.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ApiError::Malformed { .. })
    }

    /// HTTP status, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
