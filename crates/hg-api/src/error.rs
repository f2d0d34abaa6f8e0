//! API-level error types
//!
//! The remote API signals a handful of conditions that the reconciliation
//! engine reacts to differently, so they get their own variants instead of
//! being folded into a status code.

use hg_core::Error;
use thiserror::Error;

/// Errors returned by a `ForemanApi` implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The record could not be created because it already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The collection or record does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Server-side failure (HTTP 5xx)
    #[error("Server error {status}: {body}")]
    Server { status: u16, body: String },

    /// Any other non-success status
    #[error("API request failed: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("Failed to send request: {0}")]
    Transport(String),

    #[error("Failed to parse response: {0}")]
    Decode(String),
}

/// Result type alias for API calls
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Marker phrases Foreman uses in 422 bodies for uniqueness violations
const CONFLICT_MARKERS: &[&str] = &["already been taken", "already exists"];

impl ApiError {
    /// Classify a non-success HTTP status and its body
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            404 => ApiError::NotFound(body),
            422 if CONFLICT_MARKERS.iter().any(|m| body.contains(m)) => ApiError::Conflict(body),
            500..=599 => ApiError::Server { status, body },
            _ => ApiError::Status { status, body },
        }
    }

    /// Returns true for server-side failures worth retrying on the fallback API
    pub fn is_server_error(&self) -> bool {
        matches!(self, ApiError::Server { .. })
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Conflict(body) => Error::Api { status: 422, body },
            ApiError::NotFound(body) => Error::Api { status: 404, body },
            ApiError::Server { status, body } | ApiError::Status { status, body } => {
                Error::Api { status, body }
            }
            ApiError::Transport(msg) => Error::Transport(msg),
            ApiError::Decode(msg) => Error::Decode(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            ApiError::from_status(404, "missing".into()),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from_status(422, r#"{"error":{"full_messages":["Name has already been taken"]}}"#.into()),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from_status(422, "Name can't be blank".into()),
            ApiError::Status { status: 422, .. }
        ));
        assert!(ApiError::from_status(503, String::new()).is_server_error());
        assert!(!ApiError::from_status(401, String::new()).is_server_error());
    }

    #[test]
    fn test_into_core_error() {
        let err: Error = ApiError::Server {
            status: 500,
            body: "boom".into(),
        }
        .into();
        assert!(matches!(err, Error::Api { status: 500, .. }));
    }
}
