//! Error types for layercache

use std::io;

use thiserror::Error;

/// Boxed cause carried by [`Error::Decoration`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache operations
#[derive(Debug, Error)]
pub enum Error {
    /// Operation invoked outside the `Started` lifecycle state
    #[error("cache '{id}' is not started ({state})")]
    IllegalState {
        /// Id of the cache that rejected the call
        id: String,
        /// Lifecycle state at the time of the call
        state: &'static str,
    },

    /// Missing, empty or out-of-range argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A decorator's transform, serializer or hash capability failed
    #[error("{layer} decoration failed: {source}")]
    Decoration {
        /// Name of the decorator that failed
        layer: &'static str,
        /// Underlying cause
        #[source]
        source: BoxError,
    },

    /// CAS update gave up after `tries` attempts without a successful swap
    #[error("CAS on key '{key}' exhausted after {tries} tries")]
    CasExhausted {
        /// Key being updated
        key: String,
        /// Attempts made
        tries: u32,
    },

    /// Counter operation on a key that holds a plain value
    #[error("key '{key}' does not hold a counter")]
    NotACounter {
        /// Offending key
        key: String,
    },

    /// Async handle whose task was aborted or whose pool shut down
    #[error("async operation was cancelled")]
    Cancelled,

    /// Worker pool could not be created
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Wrap a capability failure raised inside the named decorator
    pub fn decoration<E>(layer: &'static str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Decoration {
            layer,
            source: source.into(),
        }
    }

    /// Build an argument error for an empty key
    pub fn empty_key() -> Self {
        Error::InvalidArgument("key must not be empty".to_string())
    }
}

/// Reject empty keys on single-key operations
pub fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        Err(Error::empty_key())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_key() {
        assert!(check_key("a").is_ok());
        assert!(matches!(check_key(""), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_decoration_keeps_source() {
        let cause = io::Error::new(io::ErrorKind::InvalidData, "bad gzip header");
        let err = Error::decoration("compress", cause);

        assert!(err.to_string().contains("compress decoration failed"));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "bad gzip header");
    }

    #[test]
    fn test_display_cas_exhausted() {
        let err = Error::CasExhausted {
            key: "k".to_string(),
            tries: 3,
        };
        assert_eq!(err.to_string(), "CAS on key 'k' exhausted after 3 tries");
    }
}
