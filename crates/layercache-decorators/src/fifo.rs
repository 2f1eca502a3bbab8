//! First-in-first-out bounded decorator

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use layercache::{check_key, Cache, CasOperation, Error, Result, SharedCache, Ttl};
use parking_lot::Mutex;
use tracing::debug;

use crate::tracker::FifoTracker;

/// Bounds the delegate to `capacity` entries, evicting in insertion order
///
/// Every put and counter write enqueues its key; once the queue outgrows the
/// bound the eldest key is removed from the delegate. Overwrites do not move
/// a key and removals do not dequeue it, so the bound is over writes rather
/// than distinct live keys.
pub struct FifoCache<V> {
    delegate: SharedCache<V>,
    tracker: Mutex<FifoTracker<String>>,
    capacity: usize,
    evictions: AtomicU64,
}

impl<V> FifoCache<V>
where
    V: Send + 'static,
{
    /// Wrap `delegate`, bounded to `capacity` tracked writes
    pub fn new(delegate: SharedCache<V>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument(
                "fifo capacity must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            delegate,
            tracker: Mutex::new(FifoTracker::new(capacity)),
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

    fn track<T>(&self, key: &str, write: impl FnOnce() -> Result<T>) -> Result<T> {
        check_key(key)?;
        let evicted = self.tracker.lock().push(key.to_string());
        // The eldest key has left the queue, so it goes even if the write fails.
        let written = write();
        if let Some(eldest) = evicted.filter(|eldest| eldest != key) {
            debug!(cache = %self.delegate.id(), key = %eldest, "fifo eviction");
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.remove(&eldest)?;
        }
        written
    }
}

impl<V> Cache<V> for FifoCache<V>
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
