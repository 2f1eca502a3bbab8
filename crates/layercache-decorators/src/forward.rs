//! Decorator base: verbatim forwarding to one delegate
//!
//! [`ForwardingCache`] is the plain composition point. The macros below are
//! the same forwarding bodies, shared by concrete decorators for the
//! operations they leave alone. They expect a `delegate` field.

use std::collections::HashMap;
use std::sync::Arc;

use layercache::{AsyncHandle, Cache, CasOperation, Result, SharedCache, Ttl};

/// Forwards `id`, `start`, `stop`, `is_started` and `executor` to `self.delegate`
macro_rules! forward_lifecycle {
    () => {
        fn id(&self) -> &str {
            self.delegate.id()
        }

        fn start(&self) -> layercache::Result<()> {
            self.delegate.start()
        }

        fn stop(&self) -> layercache::Result<()> {
            self.delegate.stop()
        }

        fn is_started(&self) -> bool {
            self.delegate.is_started()
        }

        fn executor(&self) -> layercache::Result<layercache::Executor> {
            self.delegate.executor()
        }
    };
}

/// Forwards the four counter operations to `self.delegate`
macro_rules! forward_counters {
    () => {
        fn get_counter(&self, key: &str) -> layercache::Result<i64> {
            self.delegate.get_counter(key)
        }

        fn set_counter(&self, key: &str, value: i64) -> layercache::Result<()> {
            self.delegate.set_counter(key, value)
        }

        fn increment(&self, key: &str, delta: i64) -> layercache::Result<i64> {
            self.delegate.increment(key, delta)
        }

        fn decrement(&self, key: &str, delta: i64) -> layercache::Result<i64> {
            self.delegate.decrement(key, delta)
        }
    };
}

/// Decorator that changes nothing
///
/// Useful as the outermost handle of a stack, or as a starting point for a
/// decorator that only overrides a couple of operations.
pub struct ForwardingCache<V> {
    delegate: SharedCache<V>,
}

impl<V> ForwardingCache<V>
where
    V: Send + 'static,
{
    /// Wrap `delegate`
    pub fn new(delegate: SharedCache<V>) -> Self {
        Self { delegate }
    }

    /// The wrapped cache
    pub fn delegate(&self) -> &SharedCache<V> {
        &self.delegate
    }
}

impl<V> Cache<V> for ForwardingCache<V>
where
    V: Send + 'static,
{
    forward_lifecycle!();
    forward_counters!();

    fn contains_key(&self, key: &str) -> Result<bool> {
        self.delegate.contains_key(key)
    }

    fn put_with(
        &self,
        key: &str,
        value: V,
        ttl: Ttl,
        cas: Option<&dyn CasOperation<V>>,
    ) -> Result<()> {
        self.delegate.put_with(key, value, ttl, cas)
    }

    fn get(&self, key: &str) -> Result<Option<V>> {
        self.delegate.get(key)
    }

    fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, V>> {
        self.delegate.get_many(keys)
    }

    fn remove(&self, key: &str) -> Result<Option<V>> {
        self.delegate.remove(key)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<Vec<Option<V>>> {
        self.delegate.remove_many(keys)
    }

    fn clear(&self) -> Result<bool> {
        self.delegate.clear()
    }

    fn contains_key_async(self: Arc<Self>, key: String) -> AsyncHandle<bool> {
        Arc::clone(&self.delegate).contains_key_async(key)
    }

    fn put_async(self: Arc<Self>, key: String, value: V) -> AsyncHandle<()> {
        Arc::clone(&self.delegate).put_async(key, value)
    }

    fn put_ttl_async(self: Arc<Self>, key: String, value: V, ttl: Ttl) -> AsyncHandle<()> {
        Arc::clone(&self.delegate).put_ttl_async(key, value, ttl)
    }

    fn put_with_async(
        self: Arc<Self>,
        key: String,
        value: V,
        ttl: Ttl,
        cas: Option<Arc<dyn CasOperation<V>>>,
    ) -> AsyncHandle<()> {
        Arc::clone(&self.delegate).put_with_async(key, value, ttl, cas)
    }

    fn get_async(self: Arc<Self>, key: String) -> AsyncHandle<Option<V>> {
        Arc::clone(&self.delegate).get_async(key)
    }

    fn get_many_async(self: Arc<Self>, keys: Vec<String>) -> AsyncHandle<HashMap<String, V>> {
        Arc::clone(&self.delegate).get_many_async(keys)
    }

    fn remove_async(self: Arc<Self>, key: String) -> AsyncHandle<Option<V>> {
        Arc::clone(&self.delegate).remove_async(key)
    }

    fn remove_many_async(self: Arc<Self>, keys: Vec<String>) -> AsyncHandle<Vec<Option<V>>> {
        Arc::clone(&self.delegate).remove_many_async(keys)
    }

    fn clear_async(self: Arc<Self>) -> AsyncHandle<bool> {
        Arc::clone(&self.delegate).clear_async()
    }

    fn get_counter_async(self: Arc<Self>, key: String) -> AsyncHandle<i64> {
        Arc::clone(&self.delegate).get_counter_async(key)
    }

    fn increment_async(self: Arc<Self>, key: String, delta: i64) -> AsyncHandle<i64> {
        Arc::clone(&self.delegate).increment_async(key, delta)
    }

    fn decrement_async(self: Arc<Self>, key: String, delta: i64) -> AsyncHandle<i64> {
        Arc::clone(&self.delegate).decrement_async(key, delta)
    }
}
