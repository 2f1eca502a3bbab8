//! The cache contract
//!
//! Implementors provide a small set of canonical primitives; every overload,
//! batch form and async variant is derived from them by provided methods.
//! Decorators implement the same trait around an `Arc<dyn Cache<_>>` and
//! override only what they change.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cas::CasOperation;
use crate::error::Result;
use crate::pool::{AsyncHandle, Executor};
use crate::ttl::Ttl;

/// Shared, type-erased cache handle, the unit decorators compose over
pub type SharedCache<V> = Arc<dyn Cache<V>>;

/// Key-value cache with lifecycle, CAS puts, counters and async variants
pub trait Cache<V>: Send + Sync + 'static
where
    V: Send + 'static,
{
    /// Cache identity
    fn id(&self) -> &str;

    /// Start the cache; no-op if already started
    fn start(&self) -> Result<()>;

    /// Stop the cache; no-op unless started
    fn stop(&self) -> Result<()>;

    /// Whether operations are currently accepted
    fn is_started(&self) -> bool;

    /// Worker pool that services this cache's async operations
    fn executor(&self) -> Result<Executor>;

    /// Whether `key` currently maps to a live entry
    fn contains_key(&self, key: &str) -> Result<bool>;

    /// Canonical put: store `value` under `key` with an expiry and optional CAS
    fn put_with(
        &self,
        key: &str,
        value: V,
        ttl: Ttl,
        cas: Option<&dyn CasOperation<V>>,
    ) -> Result<()>;

    /// Value stored under `key`, `None` if absent
    fn get(&self, key: &str) -> Result<Option<V>>;

    /// Remove `key`, returning its previous value
    fn remove(&self, key: &str) -> Result<Option<V>>;

    /// Drop every entry
    fn clear(&self) -> Result<bool>;

    /// Counter stored under `key`, 0 if absent
    fn get_counter(&self, key: &str) -> Result<i64>;

    /// Overwrite the counter stored under `key`
    fn set_counter(&self, key: &str, value: i64) -> Result<()>;

    /// Store `value` without expiry
    fn put(&self, key: &str, value: V) -> Result<()> {
        self.put_with(key, value, Ttl::Unbounded, None)
    }

    /// Store `value` with an expiry
    fn put_ttl(&self, key: &str, value: V, ttl: Ttl) -> Result<()> {
        self.put_with(key, value, ttl, None)
    }

    /// Store `value` through a CAS update
    fn put_cas(&self, key: &str, value: V, cas: &dyn CasOperation<V>) -> Result<()> {
        self.put_with(key, value, Ttl::Unbounded, Some(cas))
    }

    /// Values for every present key; absent and empty keys are omitted
    fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, V>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys.iter().filter(|k| !k.is_empty()) {
            if let Some(value) = self.get(key)? {
                found.insert((*key).to_string(), value);
            }
        }
        Ok(found)
    }

    /// Previous values in input order, one slot per non-empty key
    fn remove_many(&self, keys: &[&str]) -> Result<Vec<Option<V>>> {
        keys.iter()
            .filter(|k| !k.is_empty())
            .map(|key| self.remove(key))
            .collect()
    }

    /// Add `delta` to a counter. Not atomic unless the engine overrides it.
    fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        let next = self.get_counter(key)?.wrapping_add(delta);
        self.set_counter(key, next)?;
        Ok(next)
    }

    /// Subtract `delta` from a counter. Not atomic unless the engine overrides it.
    fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
        let next = self.get_counter(key)?.wrapping_sub(delta);
        self.set_counter(key, next)?;
        Ok(next)
    }

    /// Async [`Cache::contains_key`]
    fn contains_key_async(self: Arc<Self>, key: String) -> AsyncHandle<bool> {
        submit_on::<V, Self, _, _>(self, move |cache| cache.contains_key(&key))
    }

    /// Async [`Cache::put`]
    fn put_async(self: Arc<Self>, key: String, value: V) -> AsyncHandle<()> {
        submit_on::<V, Self, _, _>(self, move |cache| cache.put(&key, value))
    }

    /// Async [`Cache::put_ttl`]
    fn put_ttl_async(self: Arc<Self>, key: String, value: V, ttl: Ttl) -> AsyncHandle<()> {
        submit_on::<V, Self, _, _>(self, move |cache| cache.put_ttl(&key, value, ttl))
    }

    /// Async [`Cache::put_with`]
    fn put_with_async(
        self: Arc<Self>,
        key: String,
        value: V,
        ttl: Ttl,
        cas: Option<Arc<dyn CasOperation<V>>>,
    ) -> AsyncHandle<()> {
        submit_on::<V, Self, _, _>(self, move |cache| {
            cache.put_with(&key, value, ttl, cas.as_deref())
        })
    }

    /// Async [`Cache::get`]
    fn get_async(self: Arc<Self>, key: String) -> AsyncHandle<Option<V>> {
        submit_on::<V, Self, _, _>(self, move |cache| cache.get(&key))
    }

    /// Async [`Cache::get_many`]
    fn get_many_async(self: Arc<Self>, keys: Vec<String>) -> AsyncHandle<HashMap<String, V>> {
        submit_on::<V, Self, _, _>(self, move |cache| {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            cache.get_many(&keys)
        })
    }

    /// Async [`Cache::remove`]
    fn remove_async(self: Arc<Self>, key: String) -> AsyncHandle<Option<V>> {
        submit_on::<V, Self, _, _>(self, move |cache| cache.remove(&key))
    }

    /// Async [`Cache::remove_many`]
    fn remove_many_async(self: Arc<Self>, keys: Vec<String>) -> AsyncHandle<Vec<Option<V>>> {
        submit_on::<V, Self, _, _>(self, move |cache| {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            cache.remove_many(&keys)
        })
    }

    /// Async [`Cache::clear`]
    fn clear_async(self: Arc<Self>) -> AsyncHandle<bool> {
        submit_on::<V, Self, _, _>(self, |cache| cache.clear())
    }

    /// Async [`Cache::get_counter`]
    fn get_counter_async(self: Arc<Self>, key: String) -> AsyncHandle<i64> {
        submit_on::<V, Self, _, _>(self, move |cache| cache.get_counter(&key))
    }

    /// Async [`Cache::increment`]
    fn increment_async(self: Arc<Self>, key: String, delta: i64) -> AsyncHandle<i64> {
        submit_on::<V, Self, _, _>(self, move |cache| cache.increment(&key, delta))
    }

    /// Async [`Cache::decrement`]
    fn decrement_async(self: Arc<Self>, key: String, delta: i64) -> AsyncHandle<i64> {
        submit_on::<V, Self, _, _>(self, move |cache| cache.decrement(&key, delta))
    }
}

/// Run `job` against `cache` on the cache's worker pool.
///
/// Resolves immediately with the lifecycle error when the cache has no pool.
pub fn submit_on<V, C, T, F>(cache: Arc<C>, job: F) -> AsyncHandle<T>
where
    V: Send + 'static,
    C: Cache<V> + ?Sized,
    T: Send + 'static,
    F: FnOnce(&C) -> Result<T> + Send + 'static,
{
    match cache.executor() {
        Ok(executor) => executor.submit(move || job(&cache)),
        Err(err) => AsyncHandle::failed(err),
    }
}
