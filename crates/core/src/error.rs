//! Unified error types for the karma data layer.
//!
//! Store and serialization failures never reach domain callers: the cache and
//! queue layers turn them into misses through [`LogFailure`].

use tokio_rusqlite::rusqlite;

/// Unified error types for the persistent store, cache and offline queue.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., an empty store key).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Database operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be encoded or decoded.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

/// Converts a fallible store/cache result into an optional value, logging the failure.
///
/// Used at the boundary where caching stops being allowed to fail the caller.
pub trait LogFailure<T> {
    /// Returns `Some(value)` on success; logs `context` with the error and returns `None` otherwise.
    fn log_failure(self, context: &str) -> Option<T>;
}

impl<T> LogFailure<T> for Result<T, Error> {
    fn log_failure(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(%error, "{context}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("empty key".to_string());
        assert!(err.to_string().contains("INVALID_INPUT"));
        assert!(err.to_string().contains("empty key"));
    }

    #[test]
    fn test_serialization_error_from_serde() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = parse.into();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().starts_with("SERIALIZATION_ERROR"));
    }

    #[test]
    fn test_log_failure() {
        let ok: Result<u8, Error> = Ok(7);
        assert_eq!(ok.log_failure("ignored"), Some(7));

        let err: Result<u8, Error> = Err(Error::InvalidInput("bad".into()));
        assert_eq!(err.log_failure("cache read failed"), None);
    }
}
