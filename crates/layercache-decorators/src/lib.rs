//! # layercache-decorators
//!
//! Composable layers over any [`layercache::Cache`].
//!
//! Each decorator owns one delegate and is itself a cache, so stacks are
//! built inside-out and handed around as `Arc<dyn Cache<_>>`. Lifecycle calls
//! reach the engine at the bottom; async operations run on its worker pool.
//!
//! ## Layers
//! - **Bounding**: [`FifoCache`], [`LruCache`]
//! - **Reclaiming**: [`SoftCache`], [`WeakCache`] over [`Reclaimable`] values
//! - **Transforming**: [`CompressCache`] (bytes), [`SerializeCache`] (typed
//!   view over bytes), [`HashKeyCache`] (keys)
//! - **Guarding**: [`ReadWriteLockCache`], [`ClearupCache`]
//! - **Observing**: [`LoggingCache`]
//! - **Base**: [`ForwardingCache`]
//!
//! ```
//! use std::sync::Arc;
//! use layercache::{Cache, CacheConfig, MemoryCache, SharedCache};
//! use layercache_decorators::{CompressCache, LruCache, SerializeCache};
//!
//! let engine: SharedCache<Vec<u8>> =
//!     MemoryCache::<Vec<u8>>::started(CacheConfig::with_id("docs")).unwrap();
//! let bounded: SharedCache<Vec<u8>> = Arc::new(LruCache::new(engine, 128).unwrap());
//! let packed: SharedCache<Vec<u8>> = Arc::new(CompressCache::new(bounded));
//! let typed: SerializeCache<Vec<u32>> = SerializeCache::new(packed);
//!
//! typed.put("primes", vec![2, 3, 5, 7]).unwrap();
//! assert_eq!(typed.get("primes").unwrap(), Some(vec![2, 3, 5, 7]));
//! ```

#![warn(missing_docs)]

#[macro_use]
mod forward;

mod clearup;
mod compress;
mod error;
mod fifo;
mod hash_key;
mod lock;
mod logging;
mod lru;
mod reclaim;
mod serialize;
mod soft;
mod tracker;
mod weak;

pub use crate::clearup::ClearupCache;
pub use crate::compress::{Codec, CompressCache, GzipCodec};
pub use crate::error::CodecError;
pub use crate::fifo::FifoCache;
pub use crate::forward::ForwardingCache;
pub use crate::hash_key::{AHashKeyHasher, HashKeyCache, KeyHasher, DEFAULT_PREFIX};
pub use crate::lock::ReadWriteLockCache;
pub use crate::logging::{LoggingCache, TARGET as LOG_TARGET};
pub use crate::lru::LruCache;
pub use crate::reclaim::Reclaimable;
pub use crate::serialize::{JsonSerializer, SerializeCache, Serializer};
pub use crate::soft::SoftCache;
pub use crate::tracker::{FifoTracker, LruTracker};
pub use crate::weak::WeakCache;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use layercache::{Cache, CacheConfig, MemoryCache, SharedCache};

    #[test]
    fn test_full_stack_round_trip() {
        let engine = MemoryCache::<Vec<u8>>::started(CacheConfig::with_id("stack")).unwrap();
        let locked: SharedCache<Vec<u8>> =
            Arc::new(ReadWriteLockCache::new(engine.clone() as SharedCache<Vec<u8>>));
        let bounded: SharedCache<Vec<u8>> = Arc::new(FifoCache::new(locked, 2).unwrap());
        let hashed: SharedCache<Vec<u8>> = Arc::new(HashKeyCache::new(bounded));
        let packed: SharedCache<Vec<u8>> = Arc::new(CompressCache::new(hashed));
        let typed: SharedCache<String> = Arc::new(SerializeCache::new(packed));
        let logged = Arc::new(LoggingCache::new(typed));

        logged.put("a", "alpha".to_string()).unwrap();
        logged.put("b", "beta".to_string()).unwrap();
        logged.put("c", "gamma".to_string()).unwrap();

        assert_eq!(engine.len(), 2);
        assert_eq!(logged.get("a").unwrap(), None);
        let found = logged.get_many(&["a", "b", "c"]).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["c"], "gamma");
    }

    #[test]
    fn test_lifecycle_reaches_engine() {
        let engine = MemoryCache::<String>::started(CacheConfig::default()).unwrap();
        let stack: SharedCache<String> = Arc::new(ClearupCache::new(
            Arc::new(LruCache::new(engine.clone() as SharedCache<String>, 4).unwrap()),
            Duration::from_secs(60),
        ));

        stack.stop().unwrap();
        assert!(!engine.is_started());
        assert!(stack.get("a").is_err());
        stack.start().unwrap();
        assert!(engine.is_started());
        assert_eq!(stack.id(), engine.id());
    }

    #[tokio::test]
    async fn test_async_through_stack() {
        let config = CacheConfig::with_id("async-stack");
        let engine = MemoryCache::<Reclaimable<u64>>::started(config).unwrap();
        let weak: SharedCache<u64> = Arc::new(WeakCache::new(engine, 8).unwrap());
        let logged = Arc::new(LoggingCache::new(weak));

        Arc::clone(&logged).put_async("n".to_string(), 9).await.unwrap();
        let value = Arc::clone(&logged).get_async("n".to_string()).await.unwrap();
        assert_eq!(value, Some(9));
    }
}
