//! # layercache
//!
//! Cache contract and in-memory engine for stackable cache decorators.
//!
//! ## Architecture
//! - **Contract**: [`Cache`] trait; a handful of primitives, every overload,
//!   batch form and async twin derived from them
//! - **Core**: [`CacheCore`] for identity, idempotent start/stop and the owned
//!   [`WorkerPool`]
//! - **Engine**: [`MemoryCache`], ahash map behind a `parking_lot` lock with
//!   lazy expiry, version-stamped CAS and atomic counters
//! - **Async**: [`AsyncHandle`], awaitable or blockable, best-effort cancel
//!
//! ```
//! use std::sync::Arc;
//! use layercache::{Cache, CacheConfig, MemoryCache};
//!
//! let cache = MemoryCache::<String>::started(CacheConfig::with_id("docs")).unwrap();
//! cache.put("greeting", "hello".to_string()).unwrap();
//! assert_eq!(cache.get("greeting").unwrap().as_deref(), Some("hello"));
//!
//! let pending = Arc::clone(&cache).get_async("greeting".to_string());
//! assert_eq!(pending.wait().unwrap().as_deref(), Some("hello"));
//! ```

#![warn(missing_docs)]

mod cache;
mod cas;
mod config;
mod error;
mod lifecycle;
mod memory;
mod pool;
mod stats;
mod ttl;

pub use crate::cache::{submit_on, Cache, SharedCache};
pub use crate::cas::{CasFn, CasOperation, CasOutcome};
pub use crate::config::{CacheConfig, DEFAULT_WORKERS};
pub use crate::error::{check_key, BoxError, Error, Result};
pub use crate::lifecycle::{CacheCore, Lifecycle};
pub use crate::memory::MemoryCache;
pub use crate::pool::{AsyncHandle, Executor, WorkerPool};
pub use crate::stats::CacheStats;
pub use crate::ttl::Ttl;
