//! Periodic self-clearing decorator

use std::collections::HashMap;
use std::time::{Duration, Instant};

use layercache::{Cache, CasOperation, Result, SharedCache, Ttl};
use parking_lot::Mutex;
use tracing::debug;

/// Clears the delegate whenever `interval` has elapsed since the last clear
///
/// The check runs at the start of reads and single-key writes. A read that
/// triggers the clear returns the empty result without consulting the
/// delegate; a write that triggers it goes ahead on the emptied delegate.
/// Counter operations never trigger it.
pub struct ClearupCache<V> {
    delegate: SharedCache<V>,
    interval: Duration,
    last_cleared: Mutex<Instant>,
}

impl<V> ClearupCache<V>
where
    V: Send + 'static,
{
    /// Wrap `delegate`, clearing it every `interval`
    pub fn new(delegate: SharedCache<V>, interval: Duration) -> Self {
        Self {
            delegate,
            interval,
            last_cleared: Mutex::new(Instant::now()),
        }
    }

    /// Configured interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Clear the delegate if the interval has elapsed; returns whether it did
    fn clear_if_due(&self) -> Result<bool> {
        let mut last = self.last_cleared.lock();
        if last.elapsed() < self.interval {
            return Ok(false);
        }
        self.delegate.clear()?;
        *last = Instant::now();
        debug!(cache = %self.delegate.id(), interval = ?self.interval, "interval clear");
        Ok(true)
    }
}

impl<V> Cache<V> for ClearupCache<V>
where
    V: Send + 'static,
{
    forward_lifecycle!();
    forward_counters!();

    fn contains_key(&self, key: &str) -> Result<bool> {
        if self.clear_if_due()? {
            return Ok(false);
        }
        self.delegate.contains_key(key)
    }

    fn put_with(
        &self,
        key: &str,
        value: V,
        ttl: Ttl,
        cas: Option<&dyn CasOperation<V>>,
    ) -> Result<()> {
        self.clear_if_due()?;
        self.delegate.put_with(key, value, ttl, cas)
    }

    fn get(&self, key: &str) -> Result<Option<V>> {
        if self.clear_if_due()? {
            return Ok(None);
        }
        self.delegate.get(key)
    }

    fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, V>> {
        if self.clear_if_due()? {
            return Ok(HashMap::new());
        }
        self.delegate.get_many(keys)
    }

    fn remove(&self, key: &str) -> Result<Option<V>> {
        self.clear_if_due()?;
        self.delegate.remove(key)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<Vec<Option<V>>> {
        self.clear_if_due()?;
        self.delegate.remove_many(keys)
    }

    fn clear(&self) -> Result<bool> {
        let mut last = self.last_cleared.lock();
        let cleared = self.delegate.clear()?;
        *last = Instant::now();
        Ok(cleared)
    }
}
