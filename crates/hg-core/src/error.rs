//! Error types for hg-sync

use thiserror::Error;

/// Main error type for reconciliation runs
#[derive(Error, Debug)]
pub enum Error {
    #[error("Resource {resource} does not exist on the remote API")]
    ResourceNotFound { resource: String },

    #[error("No instance of {resource} matching {query} found")]
    NotFound { resource: String, query: String },

    #[error("Too many results ({count}) for search {resource} {query}, try to narrow the search down")]
    AmbiguousResult {
        resource: String,
        query: String,
        count: u64,
    },

    #[error("Hostgroup '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("No existing hostgroup titled '{title}' could be resolved for update")]
    UpdateTargetNotFound { title: String },

    #[error("Upstream server error: {0}")]
    TransientUpstream(String),

    #[error("Category '{0}' is referenced in the tree but not declared")]
    UnknownCategory(String),

    #[error("API request failed: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Get a helpful suggestion for resolving this error
    pub fn suggestion(&self) -> &'static str {
        match self {
            Error::ResourceNotFound { .. } => {
                "Edit your config and use a property name that matches an API resource"
            }
            Error::NotFound { .. } => "Check the referenced object exists in the organization",
            Error::AmbiguousResult { .. } => "Use a more specific value in your config",
            Error::AlreadyExists { .. } => "Re-run with --teardown or --update",
            Error::UpdateTargetNotFound { .. } => {
                "The conflicting hostgroup lives elsewhere in the tree; inspect it manually"
            }
            Error::TransientUpstream(_) => "The server failed on both API versions; check its logs",
            Error::UnknownCategory(_) => "Declare the category under `categories:`",
            Error::InvalidConfig(_) => "Fix the settings block, environment or flags",
            Error::Transport(_) => "Check the URI, TLS settings and network reachability",
            _ => "Run with --verbose for more details",
        }
    }

    /// Returns true if re-running with update mode can get past this error
    pub fn needs_update_mode(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_suggests_flags() {
        let err = Error::AlreadyExists {
            name: "CB".to_string(),
        };
        assert!(err.suggestion().contains("--update"));
        assert!(err.needs_update_mode());
        assert_eq!(err.to_string(), "Hostgroup 'CB' already exists");
    }

    #[test]
    fn test_ambiguous_message() {
        let err = Error::AmbiguousResult {
            resource: "domains".to_string(),
            query: "==example.com".to_string(),
            count: 3,
        };
        assert!(err.to_string().contains("Too many results (3)"));
        assert!(!err.needs_update_mode());
    }
}
