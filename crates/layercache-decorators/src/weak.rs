//! Weak-reference tier: values live only while recently used

use std::collections::HashMap;
use std::sync::Arc;

use layercache::{Cache, CasOperation, Error, Result, SharedCache, Ttl};

use crate::reclaim::{Reclaimable, ReclaimCore, Tracked};

const LAYER: &str = "weak";

/// Stores non-owning references to values
///
/// Writes and reads pin the value on a bounded retention list; a value
/// pushed off the list with no other holder is gone. Reading it afterwards
/// is a miss that schedules removal of its key, and the next put purges
/// every key whose value has died.
pub struct WeakCache<V> {
    core: ReclaimCore<V>,
}

impl<V> WeakCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Wrap `delegate`, keeping the `retention` most recently used values alive
    pub fn new(delegate: SharedCache<Reclaimable<V>>, retention: usize) -> Result<Self> {
        if retention == 0 {
            return Err(Error::InvalidArgument(
                "weak retention must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            core: ReclaimCore::new(delegate, retention, LAYER),
        })
    }

    /// Values currently pinned by the retention list
    pub fn retained(&self) -> usize {
        self.core.retained()
    }

    /// Dead keys waiting to be purged from the delegate
    pub fn pending(&self) -> usize {
        self.core.pending()
    }

    fn wrap(&self, tracked: Arc<Tracked<V>>) -> Reclaimable<V> {
        let stored = Reclaimable::weak(&tracked);
        self.core.retention().pin(tracked);
        stored
    }
}

impl<V> Cache<V> for WeakCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn id(&self) -> &str {
        self.core.delegate().id()
    }

    fn start(&self) -> Result<()> {
        self.core.delegate().start()
    }

    fn stop(&self) -> Result<()> {
        self.core.delegate().stop()
    }

    fn is_started(&self) -> bool {
        self.core.delegate().is_started()
    }

    fn executor(&self) -> Result<layercache::Executor> {
        self.core.delegate().executor()
    }

    fn contains_key(&self, key: &str) -> Result<bool> {
        self.core.delegate().contains_key(key)
    }

    fn put_with(
        &self,
        key: &str,
        value: V,
        ttl: Ttl,
        cas: Option<&dyn CasOperation<V>>,
    ) -> Result<()> {
        let wrap = |tracked: Arc<Tracked<V>>| self.wrap(tracked);
        self.core.put_with(key, value, ttl, cas, &wrap)
    }

    fn get(&self, key: &str) -> Result<Option<V>> {
        self.core.get(key)
    }

    fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, V>> {
        self.core.get_many(keys)
    }

    fn remove(&self, key: &str) -> Result<Option<V>> {
        self.core.remove(key)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<Vec<Option<V>>> {
        self.core.remove_many(keys)
    }

    fn clear(&self) -> Result<bool> {
        self.core.clear()
    }

    fn get_counter(&self, key: &str) -> Result<i64> {
        self.core.delegate().get_counter(key)
    }

    fn set_counter(&self, key: &str, value: i64) -> Result<()> {
        self.core.delegate().set_counter(key, value)
    }

    fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        self.core.delegate().increment(key, delta)
    }

    fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
        self.core.delegate().decrement(key, delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    use layercache::{CacheConfig, MemoryCache};

    fn stack(retention: usize) -> (Arc<MemoryCache<Reclaimable<u64>>>, Arc<WeakCache<u64>>) {
        let memory = MemoryCache::started(CacheConfig::with_id("weak-test")).unwrap();
        let weak = WeakCache::new(memory.clone() as SharedCache<_>, retention).unwrap();
        (memory, Arc::new(weak))
    }

    fn eventually(mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_zero_retention_rejected() {
        let memory = MemoryCache::<Reclaimable<u64>>::started(CacheConfig::default()).unwrap();
        assert!(WeakCache::new(memory as SharedCache<_>, 0).is_err());
    }

    #[test]
    fn test_recent_values_stay_reachable() {
        let (_memory, weak) = stack(2);
        weak.put("a", 1).unwrap();
        weak.put("b", 2).unwrap();

        assert_eq!(weak.get("a").unwrap(), Some(1));
        assert_eq!(weak.get("b").unwrap(), Some(2));
    }

    #[test]
    fn test_unpinned_value_reads_as_miss_then_disappears() {
        let (memory, weak) = stack(1);
        weak.put("a", 1).unwrap();
        weak.put("b", 2).unwrap();

        assert!(memory.contains_key("a").unwrap());
        assert_eq!(weak.get("a").unwrap(), None);
        assert!(eventually(|| !weak.contains_key("a").unwrap()));
    }

    #[test]
    fn test_put_purges_dead_keys() {
        let (memory, weak) = stack(1);
        weak.put("a", 1).unwrap();
        weak.put("b", 2).unwrap();
        weak.put("c", 3).unwrap();

        assert!(!memory.contains_key("a").unwrap());
        assert!(memory.contains_key("b").unwrap());
        assert_eq!(weak.get("c").unwrap(), Some(3));
    }

    #[test]
    fn test_read_extends_lifetime() {
        let (_memory, weak) = stack(2);
        weak.put("a", 1).unwrap();
        weak.put("b", 2).unwrap();
        assert_eq!(weak.get("a").unwrap(), Some(1));
        weak.put("c", 3).unwrap();

        assert_eq!(weak.get("a").unwrap(), Some(1));
        assert_eq!(weak.get("b").unwrap(), None);
    }

    #[test]
    fn test_remove_returns_live_value_only() {
        let (_memory, weak) = stack(1);
        weak.put("a", 1).unwrap();
        weak.put("b", 2).unwrap();

        assert_eq!(weak.remove_many(&["a", "b"]).unwrap(), vec![None, Some(2)]);
    }

    #[test]
    fn test_async_get_of_dead_value() {
        let (memory, weak) = stack(1);
        weak.put("a", 1).unwrap();
        weak.put("b", 2).unwrap();

        let found = Arc::clone(&weak).get_async("a".to_string()).wait().unwrap();
        assert_eq!(found, None);
        assert!(eventually(|| memory.len() == 1));
    }

    #[test]
    fn test_clear_drops_pins() {
        let (memory, weak) = stack(4);
        weak.put("a", 1).unwrap();
        weak.put("b", 2).unwrap();
        assert_eq!(weak.retained(), 2);

        weak.clear().unwrap();
        assert_eq!(weak.retained(), 0);
        assert_eq!(weak.pending(), 0);
        assert!(memory.is_empty());
    }
}
