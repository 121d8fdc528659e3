//! Error types for RelaySQL
//!
//! Defines a unified error type that can represent errors from all components.
//! Only the cluster stack ever surfaces these to a remote caller; the dispatcher
//! and the local interpreter turn them into fallbacks or empty row-sets.

use std::fmt;
use std::io;

/// Unified error type for RelaySQL operations
#[derive(Debug)]
pub enum RelayError {
    /// I/O error (local store medium, sockets)
    Io(io::Error),
    /// JSON serialization or deserialization error
    Json(String),
    /// Remote endpoint unreachable, timed out, or the HTTP exchange failed
    Transport(String),
    /// Remote endpoint answered with a non-2xx status
    RemoteStatus(u16),
    /// Remote endpoint answered 2xx without a usable row-set
    RemoteBody(String),
    /// A single database cluster rejected or failed the query
    Cluster(String),
    /// The cluster stack was empty
    NoClusters,
    /// Every cluster in the stack failed; carries the last observed error
    StackExhausted {
        attempted: usize,
        last_error: Box<RelayError>,
    },
    /// Local store error (bad key, unwritable medium)
    Store(String),
    /// Configuration error
    Config(String),
}

impl RelayError {
    /// Wrap the last cluster failure once the whole stack has been tried
    pub fn stack_exhausted(attempted: usize, last_error: RelayError) -> Self {
        RelayError::StackExhausted {
            attempted,
            last_error: Box::new(last_error),
        }
    }

    /// True for failures the dispatcher recovers from by falling back locally
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RelayError::Transport(_) | RelayError::RemoteStatus(_) | RelayError::RemoteBody(_)
        )
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Io(e) => write!(f, "{}", e),
            RelayError::Json(msg) => write!(f, "JSON error: {}", msg),
            RelayError::Transport(msg) => write!(f, "Transport error: {}", msg),
            RelayError::RemoteStatus(code) => write!(f, "Remote endpoint returned HTTP {}", code),
            RelayError::RemoteBody(msg) => write!(f, "Unusable remote response: {}", msg),
            RelayError::Cluster(msg) => write!(f, "{}", msg),
            RelayError::NoClusters => write!(f, "No database connections available"),
            RelayError::StackExhausted { attempted, last_error } => write!(
                f,
                "All {} database clusters failed; last error: {}",
                attempted, last_error
            ),
            RelayError::Store(msg) => write!(f, "Local store error: {}", msg),
            RelayError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Io(e) => Some(e),
            RelayError::StackExhausted { last_error, .. } => Some(last_error.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for RelayError {
    fn from(e: io::Error) -> Self {
        RelayError::Io(e)
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => RelayError::RemoteStatus(status.as_u16()),
            None => RelayError::Transport(e.to_string()),
        }
    }
}

impl From<sqlx::Error> for RelayError {
    fn from(e: sqlx::Error) -> Self {
        RelayError::Cluster(e.to_string())
    }
}

impl From<tempfile::PersistError> for RelayError {
    fn from(e: tempfile::PersistError) -> Self {
        RelayError::Io(e.error)
    }
}

/// Result type alias for RelaySQL operations
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_stack_exhausted_traces_last_error() {
        let err = RelayError::stack_exhausted(3, RelayError::Cluster("tertiary down".into()));
        assert!(err.to_string().contains("All 3 database clusters failed"));
        assert!(err.to_string().contains("tertiary down"));

        let source = err.source().expect("exhaustion carries a source");
        assert_eq!(source.to_string(), "tertiary down");
    }

    #[test]
    fn test_transport_classification() {
        assert!(RelayError::Transport("refused".into()).is_transport());
        assert!(RelayError::RemoteStatus(503).is_transport());
        assert!(RelayError::RemoteBody("no data".into()).is_transport());
        assert!(!RelayError::NoClusters.is_transport());
        assert!(!RelayError::Cluster("x".into()).is_transport());
    }
}
