//! Error types.

use thiserror::Error;

/// Result alias for gravity operations.
pub type Result<T> = std::result::Result<T, GravityError>;

/// Errors returned by the aggregation engine.
#[derive(Debug, Error)]
pub enum GravityError {
    /// Probe or download of a source failed (timeout, connection, HTTP status).
    /// Scoped to one source; the run continues without it.
    #[error("failed to fetch {uri}: {source}")]
    Network {
        uri: String,
        #[source]
        source: reqwest::Error,
    },

    /// The database is unavailable or a statement failed.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// An operation referenced a source or override that does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// An override domain was empty after trimming.
    #[error("invalid domain: {domain:?}")]
    InvalidDomain { domain: String },

    /// The export file could not be written or swapped into place.
    #[error("failed to write export file {path}: {source}")]
    Export {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl GravityError {
    /// Returns `true` for errors that must abort a whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Export { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_and_export_errors_are_fatal() {
        let storage = GravityError::Storage(rusqlite::Error::InvalidQuery);
        assert!(storage.is_fatal());

        let export = GravityError::Export {
            path: "gravity.list".to_string(),
            source: std::io::Error::other("disk full"),
        };
        assert!(export.is_fatal());

        let missing = GravityError::NotFound {
            what: "source https://example.com/hosts".to_string(),
        };
        assert!(!missing.is_fatal());
        assert_eq!(
            missing.to_string(),
            "not found: source https://example.com/hosts"
        );
    }
}
