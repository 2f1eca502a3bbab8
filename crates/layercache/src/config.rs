//! Engine configuration

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default number of worker-pool threads
pub const DEFAULT_WORKERS: usize = 4;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn generated_id() -> String {
    format!("cache-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

/// Configuration shared by every engine built on [`CacheCore`](crate::CacheCore)
///
/// ```
/// use layercache::CacheConfig;
///
/// let config = CacheConfig::from_json(r#"{ "id": "sessions", "workers": 2 }"#).unwrap();
/// assert_eq!(config.id, "sessions");
/// assert_eq!(config.workers, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Cache identity, also used to name worker threads
    #[serde(default = "generated_id")]
    pub id: String,

    /// Upper bound on worker-pool threads servicing async operations
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            id: generated_id(),
            workers: DEFAULT_WORKERS,
        }
    }
}

impl CacheConfig {
    /// Configuration with an explicit id and default pool size
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            workers: DEFAULT_WORKERS,
        }
    }

    /// Set the worker-pool size
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Parse a JSON configuration document
    pub fn from_json(input: &str) -> Result<Self> {
        let config: CacheConfig = serde_json::from_str(input)
            .map_err(|e| Error::InvalidArgument(format!("cache config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::InvalidArgument("cache id must not be empty".to_string()));
        }
        if self.workers == 0 {
            return Err(Error::InvalidArgument("workers must be greater than 0".to_string()));
        }
        Ok(())
    }
}
