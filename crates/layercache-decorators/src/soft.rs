//! Soft-reference tier: values survive until reclaimed under pressure

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use layercache::{Cache, CasOperation, Error, Result, SharedCache, Ttl};
use parking_lot::Mutex;
use tracing::debug;

use crate::reclaim::{Reclaimable, ReclaimCore, SoftSlot, Tracked};

const LAYER: &str = "soft";
const PRUNE_FLOOR: usize = 64;

/// Slots in write order; dead entries are pruned as the list doubles
struct SlotRegistry<V> {
    slots: VecDeque<Weak<SoftSlot<V>>>,
    prune_at: usize,
}

/// Stores values behind reclaimable slots
///
/// A value stays reachable while its slot is full. [`SoftCache::reclaim`]
/// empties the oldest slots whose values are not pinned by the retention
/// list, and an optional soft limit does so automatically after each put.
/// Reading a reclaimed value is a miss that schedules removal of its key.
pub struct SoftCache<V> {
    core: ReclaimCore<V>,
    registry: Mutex<SlotRegistry<V>>,
    soft_limit: Option<usize>,
}

impl<V> SoftCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Wrap `delegate`, pinning the `retention` most recently used values
    pub fn new(delegate: SharedCache<Reclaimable<V>>, retention: usize) -> Result<Self> {
        if retention == 0 {
            return Err(Error::InvalidArgument(
                "soft retention must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            core: ReclaimCore::new(delegate, retention, LAYER),
            registry: Mutex::new(SlotRegistry {
                slots: VecDeque::new(),
                prune_at: PRUNE_FLOOR,
            }),
            soft_limit: None,
        })
    }

    /// Reclaim automatically whenever more than `limit` slots are live
    pub fn with_soft_limit(mut self, limit: usize) -> Self {
        self.soft_limit = Some(limit);
        self
    }

    /// Empty up to `max` of the oldest unpinned slots
    ///
    /// Returns how many values were reclaimed. Their keys are removed from
    /// the delegate on the next put, or as soon as they are read.
    pub fn reclaim(&self, max: usize) -> usize {
        let mut released = Vec::new();
        self.registry.lock().slots.retain(|weak| {
            let Some(slot) = weak.upgrade() else {
                return false;
            };
            if slot.is_empty() {
                return false;
            }
            if released.len() < max {
                if let Some(tracked) = slot.take_unpinned() {
                    released.push(tracked);
                    return false;
                }
            }
            true
        });

        let reclaimed = released.len();
        drop(released);
        if reclaimed > 0 {
            debug!(cache = %self.core.delegate().id(), reclaimed, "soft values reclaimed");
        }
        reclaimed
    }

    /// Values currently pinned by the retention list
    pub fn retained(&self) -> usize {
        self.core.retained()
    }

    /// Reclaimed keys waiting to be purged from the delegate
    pub fn pending(&self) -> usize {
        self.core.pending()
    }

    fn wrap(&self, tracked: Arc<Tracked<V>>) -> Reclaimable<V> {
        let slot = Arc::new(SoftSlot::new(tracked));
        let mut registry = self.registry.lock();
        if registry.slots.len() >= registry.prune_at {
            registry.slots.retain(|weak| weak.strong_count() > 0);
            registry.prune_at = (registry.slots.len() * 2).max(PRUNE_FLOOR);
        }
        registry.slots.push_back(Arc::downgrade(&slot));
        Reclaimable::soft(slot)
    }

    fn enforce_limit(&self) {
        let Some(limit) = self.soft_limit else {
            return;
        };
        let live = {
            let mut registry = self.registry.lock();
            if registry.slots.len() > limit {
                registry
                    .slots
                    .retain(|weak| weak.upgrade().is_some_and(|slot| !slot.is_empty()));
            }
            registry.slots.len()
        };
        if live > limit {
            self.reclaim(live - limit);
        }
    }
}

impl<V> Cache<V> for SoftCache<V>
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
        self.core.put_with(key, value, ttl, cas, &wrap)?;
        self.enforce_limit();
        Ok(())
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
        let cleared = self.core.clear()?;
        self.registry.lock().slots.clear();
        Ok(cleared)
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
