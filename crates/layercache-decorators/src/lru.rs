//! Least-recently-used bounded decorator

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use layercache::{check_key, Cache, CasOperation, Error, Result, SharedCache, Ttl};
use parking_lot::Mutex;
use tracing::debug;

use crate::tracker::LruTracker;

/// Bounds the delegate to `capacity` keys, evicting the least recently used
///
/// Puts, counter writes and successful reads refresh a key. When a new key
/// pushes the tracker past its bound the stalest key is removed from the
/// delegate.
pub struct LruCache<V> {
    delegate: SharedCache<V>,
    tracker: Mutex<LruTracker<String>>,
    capacity: usize,
    evictions: AtomicU64,
}

impl<V> LruCache<V>
where
    V: Send + 'static,
{
    /// Wrap `delegate`, bounded to `capacity` keys
    pub fn new(delegate: SharedCache<V>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument(
                "lru capacity must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            delegate,
            tracker: Mutex::new(LruTracker::new(capacity)),
            capacity,
            evictions: AtomicU64::new(0),
        })
    }

    /// Configured bound
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys evicted so far
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Number of keys currently tracked
    pub fn tracked(&self) -> usize {
        self.tracker.lock().len()
    }

    fn track<T>(&self, key: &str, write: impl FnOnce() -> Result<T>) -> Result<T> {
        check_key(key)?;
        let (fresh, evicted) = {
            let mut tracker = self.tracker.lock();
            let fresh = !tracker.contains(key);
            (fresh, tracker.insert(key.to_string()))
        };
        let written = write();
        if written.is_err() && fresh {
            self.tracker.lock().remove(key);
        }
        // The stalest key is no longer tracked, so it goes even if the write failed.
        if let Some(stalest) = evicted {
            debug!(cache = %self.delegate.id(), key = %stalest, "lru eviction");
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.remove(&stalest)?;
        }
        written
    }
}

impl<V> Cache<V> for LruCache<V>
where
    V: Send + 'static,
{
    forward_lifecycle!();

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
        self.track(key, || self.delegate.put_with(key, value, ttl, cas))
    }

    fn get(&self, key: &str) -> Result<Option<V>> {
        let value = self.delegate.get(key)?;
        if value.is_some() {
            self.tracker.lock().touch(key);
        }
        Ok(value)
    }

    fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, V>> {
        let found = self.delegate.get_many(keys)?;
        if !found.is_empty() {
            let mut tracker = self.tracker.lock();
            // Refresh in request order so the last requested key ends up freshest.
            for key in keys.iter().filter(|k| found.contains_key(**k)) {
                tracker.touch(*key);
            }
        }
        Ok(found)
    }

    fn remove(&self, key: &str) -> Result<Option<V>> {
        self.tracker.lock().remove(key);
        self.delegate.remove(key)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<Vec<Option<V>>> {
        {
            let mut tracker = self.tracker.lock();
            for key in keys {
                tracker.remove(*key);
            }
        }
        self.delegate.remove_many(keys)
    }

    fn clear(&self) -> Result<bool> {
        let mut tracker = self.tracker.lock();
        let cleared = self.delegate.clear()?;
        tracker.clear();
        Ok(cleared)
    }

    fn get_counter(&self, key: &str) -> Result<i64> {
        self.delegate.get_counter(key)
    }

    fn set_counter(&self, key: &str, value: i64) -> Result<()> {
        self.track(key, || self.delegate.set_counter(key, value))
    }

    fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        self.track(key, || self.delegate.increment(key, delta))
    }

    fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
        self.track(key, || self.delegate.decrement(key, delta))
    }
}
