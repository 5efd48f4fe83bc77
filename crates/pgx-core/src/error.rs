//! Error types for the pgx acquisition core.
//!
//! Two layers live here:
//! - [`FetchErrorKind`]: the classified outcome of a single upstream request.
//!   The resilient client never raises these; it returns them inside a
//!   [`FetchOutcome`](crate::network::FetchOutcome).
//! - [`PgxError`]: everything that crosses a function boundary as `Err`, from
//!   setup failures (cache directory, database) to enricher failures.

use std::path::PathBuf;
use thiserror::Error;

/// Classified failure of one upstream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Upstream answered 429; retried after a fixed cooldown.
    RateLimited,
    /// Timeout, 5xx, or connection failure; retried with backoff.
    TransientNetworkError,
    /// Body could not be interpreted as JSON.
    MalformedResponse,
    /// A 4xx other than 404 and 429.
    PermanentClientError,
}

impl FetchErrorKind {
    /// Whether the retry policy may reissue a request that failed this way.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchErrorKind::RateLimited | FetchErrorKind::TransientNetworkError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::RateLimited => "rate_limited",
            FetchErrorKind::TransientNetworkError => "transient_network_error",
            FetchErrorKind::MalformedResponse => "malformed_response",
            FetchErrorKind::PermanentClientError => "permanent_client_error",
        }
    }
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the pgx core.
#[derive(Debug, Error)]
pub enum PgxError {
    // Upstream errors
    #[error("Fetch from {source_name} failed ({kind}): {message}")]
    Fetch {
        source_name: String,
        kind: FetchErrorKind,
        message: String,
    },

    #[error("No population frequency source returned data for {identifier}")]
    UpstreamUnavailable { identifier: String },

    #[error("HTTP client error: {message}")]
    HttpClient {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Enrichment pipeline cancelled")]
    Cancelled,
}

/// Result type alias for pgx operations.
pub type Result<T> = std::result::Result<T, PgxError>;

impl From<std::io::Error> for PgxError {
    fn from(err: std::io::Error) -> Self {
        PgxError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PgxError {
    fn from(err: serde_json::Error) -> Self {
        PgxError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for PgxError {
    fn from(err: rusqlite::Error) -> Self {
        PgxError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl PgxError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PgxError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Build a fetch failure for the named upstream source.
    pub fn fetch(source_name: impl Into<String>, kind: FetchErrorKind, message: impl Into<String>) -> Self {
        PgxError::Fetch {
            source_name: source_name.into(),
            kind,
            message: message.into(),
        }
    }

    /// The classified fetch failure carried by this error, if any.
    pub fn fetch_kind(&self) -> Option<FetchErrorKind> {
        match self {
            PgxError::Fetch { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Setup errors are the only ones allowed to stop process startup.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            PgxError::Database { .. }
                | PgxError::Io { .. }
                | PgxError::Config { .. }
                | PgxError::HttpClient { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PgxError::fetch("clinvar", FetchErrorKind::PermanentClientError, "HTTP 400");
        assert_eq!(
            err.to_string(),
            "Fetch from clinvar failed (permanent_client_error): HTTP 400"
        );

        let err = PgxError::UpstreamUnavailable {
            identifier: "rs1065852".into(),
        };
        assert_eq!(
            err.to_string(),
            "No population frequency source returned data for rs1065852"
        );
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(FetchErrorKind::RateLimited.is_retryable());
        assert!(FetchErrorKind::TransientNetworkError.is_retryable());
        assert!(!FetchErrorKind::MalformedResponse.is_retryable());
        assert!(!FetchErrorKind::PermanentClientError.is_retryable());
    }

    #[test]
    fn test_fetch_kind_extraction() {
        let err = PgxError::fetch("pharmgkb", FetchErrorKind::TransientNetworkError, "503");
        assert_eq!(err.fetch_kind(), Some(FetchErrorKind::TransientNetworkError));
        assert_eq!(PgxError::Cancelled.fetch_kind(), None);
    }

    #[test]
    fn test_setup_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(PgxError::io_with_path(io, "/cache").is_setup_error());
        assert!(!PgxError::Cancelled.is_setup_error());
    }
}
