//! Reclaimable storage shared by the soft and weak tiers
//!
//! Decorated values are stored in the delegate as [`Reclaimable`] wrappers.
//! The wrapper owns nothing the cache depends on: a soft wrapper points at a
//! slot the decorator may empty under pressure, a weak wrapper holds a
//! non-owning reference kept alive only by the retention list. When the last
//! strong reference to a value goes away its key is pushed onto the
//! [`ReclaimQueue`], and the next put drains the queue against the delegate.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};

use ahash::AHashSet;
use layercache::{check_key, submit_on, Cache, CasOperation, Result, SharedCache, Ttl};
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Keys whose values lost their last strong reference
#[derive(Default)]
pub(crate) struct ReclaimQueue {
    keys: Mutex<Vec<String>>,
}

impl ReclaimQueue {
    fn notify(&self, key: String) {
        self.keys.lock().push(key);
    }

    fn drain(&self) -> Vec<String> {
        mem::take(&mut *self.keys.lock())
    }

    fn len(&self) -> usize {
        self.keys.lock().len()
    }
}

/// A decorated value that reports its key when dropped
pub(crate) struct Tracked<V> {
    key: String,
    value: V,
    queue: Arc<ReclaimQueue>,
}

impl<V> Drop for Tracked<V> {
    fn drop(&mut self) {
        self.queue.notify(mem::take(&mut self.key));
    }
}

/// Slot a soft wrapper points into; emptied when the value is reclaimed
pub(crate) struct SoftSlot<V> {
    value: Mutex<Option<Arc<Tracked<V>>>>,
}

impl<V> SoftSlot<V> {
    pub(crate) fn new(tracked: Arc<Tracked<V>>) -> Self {
        Self {
            value: Mutex::new(Some(tracked)),
        }
    }

    /// Empty the slot if nothing outside it holds the value
    ///
    /// Returns the taken value so the caller can drop it outside any lock.
    /// `None` means the slot was already empty or the value is pinned.
    pub(crate) fn take_unpinned(&self) -> Option<Arc<Tracked<V>>> {
        let mut value = self.value.lock();
        let unpinned = value
            .as_ref()
            .is_some_and(|tracked| Arc::strong_count(tracked) == 1);
        if unpinned {
            value.take()
        } else {
            None
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.value.lock().is_none()
    }
}

enum Link<V> {
    Soft(Arc<SoftSlot<V>>),
    Weak(Weak<Tracked<V>>),
}

/// What the soft and weak tiers store in their delegate
///
/// Cloning shares the underlying slot or reference; it never extends the
/// value's lifetime.
pub struct Reclaimable<V> {
    link: Link<V>,
}

impl<V> Reclaimable<V> {
    pub(crate) fn soft(slot: Arc<SoftSlot<V>>) -> Self {
        Self {
            link: Link::Soft(slot),
        }
    }

    pub(crate) fn weak(tracked: &Arc<Tracked<V>>) -> Self {
        Self {
            link: Link::Weak(Arc::downgrade(tracked)),
        }
    }

    fn upgrade(&self) -> Option<Arc<Tracked<V>>> {
        match &self.link {
            Link::Soft(slot) => slot.value.lock().clone(),
            Link::Weak(weak) => weak.upgrade(),
        }
    }

    /// Whether the wrapped value has been reclaimed
    pub fn is_reclaimed(&self) -> bool {
        match &self.link {
            Link::Soft(slot) => slot.is_empty(),
            Link::Weak(weak) => weak.strong_count() == 0,
        }
    }
}

impl<V> Clone for Reclaimable<V> {
    fn clone(&self) -> Self {
        let link = match &self.link {
            Link::Soft(slot) => Link::Soft(Arc::clone(slot)),
            Link::Weak(weak) => Link::Weak(Weak::clone(weak)),
        };
        Self { link }
    }
}

impl<V> fmt::Debug for Reclaimable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tier = match self.link {
            Link::Soft(_) => "soft",
            Link::Weak(_) => "weak",
        };
        f.debug_struct("Reclaimable")
            .field("tier", &tier)
            .field("reclaimed", &self.is_reclaimed())
            .finish()
    }
}

/// Bounded list of recently written or read values, held strongly
pub(crate) struct RetentionList<V> {
    pinned: Mutex<VecDeque<Arc<Tracked<V>>>>,
    capacity: usize,
}

impl<V> RetentionList<V> {
    fn new(capacity: usize) -> Self {
        Self {
            pinned: Mutex::new(VecDeque::with_capacity(capacity + 1)),
            capacity,
        }
    }

    pub(crate) fn pin(&self, tracked: Arc<Tracked<V>>) {
        let released = {
            let mut pinned = self.pinned.lock();
            pinned.push_back(tracked);
            if pinned.len() > self.capacity {
                pinned.pop_front()
            } else {
                None
            }
        };
        drop(released);
    }

    fn clear(&self) {
        let released = mem::take(&mut *self.pinned.lock());
        drop(released);
    }

    fn len(&self) -> usize {
        self.pinned.lock().len()
    }
}

/// How a tier turns a freshly written value into a stored wrapper
pub(crate) type Wrap<'a, V> = &'a (dyn Fn(Arc<Tracked<V>>) -> Reclaimable<V> + Send + Sync);

/// State and operations common to both reclaimable tiers
pub(crate) struct ReclaimCore<V> {
    delegate: SharedCache<Reclaimable<V>>,
    queue: Arc<ReclaimQueue>,
    retention: RetentionList<V>,
    layer: &'static str,
}

impl<V> ReclaimCore<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        delegate: SharedCache<Reclaimable<V>>,
        retention: usize,
        layer: &'static str,
    ) -> Self {
        Self {
            delegate,
            queue: Arc::new(ReclaimQueue::default()),
            retention: RetentionList::new(retention),
            layer,
        }
    }

    pub(crate) fn delegate(&self) -> &SharedCache<Reclaimable<V>> {
        &self.delegate
    }

    pub(crate) fn retention(&self) -> &RetentionList<V> {
        &self.retention
    }

    pub(crate) fn retained(&self) -> usize {
        self.retention.len()
    }

    pub(crate) fn pending(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn track(&self, key: &str, value: V) -> Arc<Tracked<V>> {
        Arc::new(Tracked {
            key: key.to_string(),
            value,
            queue: Arc::clone(&self.queue),
        })
    }

    /// Remove delegate entries whose values have been reclaimed
    ///
    /// A queued key is only removed if the wrapper currently stored for it
    /// is dead, so a key rewritten since its old value died is left alone.
    pub(crate) fn drain(&self) -> Result<usize> {
        let queued = self.queue.drain();
        if queued.is_empty() {
            return Ok(0);
        }

        let mut seen = AHashSet::with_capacity(queued.len());
        let unique = queued.iter().filter(|key| seen.insert(key.as_str()));
        let removed = remove_dead(self.delegate.as_ref(), unique.map(String::as_str))?;
        trace!(layer = self.layer, queued = queued.len(), removed, "reclaim queue drained");
        Ok(removed)
    }

    /// Schedule removal of `keys` on the delegate's pool, re-checked there
    fn purge_later(&self, keys: Vec<String>) {
        drop(submit_on::<Reclaimable<V>, dyn Cache<Reclaimable<V>>, _, _>(
            Arc::clone(&self.delegate),
            move |delegate| remove_dead(delegate, keys.iter().map(String::as_str)),
        ));
    }

    pub(crate) fn put_with(
        &self,
        key: &str,
        value: V,
        ttl: Ttl,
        cas: Option<&dyn CasOperation<V>>,
        wrap: Wrap<'_, V>,
    ) -> Result<()> {
        check_key(key)?;
        self.drain()?;

        match cas {
            None => {
                let stored = wrap(self.track(key, value));
                self.delegate.put_with(key, stored, ttl, None)
            }
            Some(op) => {
                let adapter = ReclaimCas {
                    op,
                    fallback: value.clone(),
                    key,
                    core: self,
                    wrap,
                };
                let initial = wrap(self.track(key, value));
                self.delegate.put_with(key, initial, ttl, Some(&adapter))
            }
        }
    }

    fn resolve(&self, stored: &Reclaimable<V>) -> Option<V> {
        let tracked = stored.upgrade()?;
        let value = tracked.value.clone();
        self.retention.pin(tracked);
        Some(value)
    }

    pub(crate) fn get(&self, key: &str) -> Result<Option<V>> {
        let Some(stored) = self.delegate.get(key)? else {
            return Ok(None);
        };
        match self.resolve(&stored) {
            Some(value) => Ok(Some(value)),
            None => {
                debug!(layer = self.layer, key, "reclaimed value read as miss");
                self.purge_later(vec![key.to_string()]);
                Ok(None)
            }
        }
    }

    pub(crate) fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, V>> {
        let stored = self.delegate.get_many(keys)?;
        let mut found = HashMap::with_capacity(stored.len());
        let mut dead = Vec::new();
        for (key, wrapper) in stored {
            match self.resolve(&wrapper) {
                Some(value) => {
                    found.insert(key, value);
                }
                None => dead.push(key),
            }
        }
        if !dead.is_empty() {
            debug!(layer = self.layer, count = dead.len(), "reclaimed values read as misses");
            self.purge_later(dead);
        }
        Ok(found)
    }

    pub(crate) fn remove(&self, key: &str) -> Result<Option<V>> {
        Ok(self
            .delegate
            .remove(key)?
            .and_then(|stored| stored.upgrade())
            .map(|tracked| tracked.value.clone()))
    }

    pub(crate) fn remove_many(&self, keys: &[&str]) -> Result<Vec<Option<V>>> {
        Ok(self
            .delegate
            .remove_many(keys)?
            .into_iter()
            .map(|stored| {
                stored
                    .and_then(|stored| stored.upgrade())
                    .map(|tracked| tracked.value.clone())
            })
            .collect())
    }

    pub(crate) fn clear(&self) -> Result<bool> {
        // Releasing pins queues more keys; drop those too.
        self.retention.clear();
        self.queue.drain();
        self.delegate.clear()
    }
}

/// Remove each key whose stored wrapper is dead; returns how many went
fn remove_dead<'k, V>(
    delegate: &dyn Cache<Reclaimable<V>>,
    keys: impl IntoIterator<Item = &'k str>,
) -> Result<usize>
where
    V: Send + Sync + 'static,
{
    let mut removed = 0;
    for key in keys {
        let dead = delegate
            .get(key)?
            .is_some_and(|stored| stored.is_reclaimed());
        if dead {
            delegate.remove(key)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Runs a caller's CAS operation over reclaimable wrappers
///
/// A reclaimed current value has nothing to compute from, so the caller's
/// supplied value is written fresh in its place.
struct ReclaimCas<'a, V> {
    op: &'a dyn CasOperation<V>,
    fallback: V,
    key: &'a str,
    core: &'a ReclaimCore<V>,
    wrap: Wrap<'a, V>,
}

impl<V> CasOperation<Reclaimable<V>> for ReclaimCas<'_, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn max_tries(&self) -> u32 {
        self.op.max_tries()
    }

    fn compute_new_value(&self, current: &Reclaimable<V>) -> Result<Reclaimable<V>> {
        let next = match current.upgrade() {
            Some(tracked) => self.op.compute_new_value(&tracked.value)?,
            None => self.fallback.clone(),
        };
        Ok((self.wrap)(self.core.track(self.key, next)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reclaim_core(retention: usize) -> ReclaimCore<i32> {
        let memory =
            layercache::MemoryCache::<Reclaimable<i32>>::started(layercache::CacheConfig::default())
                .unwrap();
        ReclaimCore::new(memory as SharedCache<Reclaimable<i32>>, retention, "test")
    }

    #[test]
    fn test_drop_notifies_queue() {
        let core = reclaim_core(1);
        let tracked = core.track("a", 1);
        assert_eq!(core.pending(), 0);
        drop(tracked);
        assert_eq!(core.pending(), 1);
    }

    #[test]
    fn test_retention_releases_oldest() {
        let core = reclaim_core(2);
        core.retention().pin(core.track("a", 1));
        core.retention().pin(core.track("b", 2));
        assert_eq!(core.pending(), 0);

        core.retention().pin(core.track("c", 3));
        assert_eq!(core.retained(), 2);
        assert_eq!(core.pending(), 1);
    }

    #[test]
    fn test_soft_slot_respects_pins() {
        let core = reclaim_core(1);
        let tracked = core.track("a", 1);
        let slot = SoftSlot::new(Arc::clone(&tracked));
        assert!(slot.take_unpinned().is_none());

        drop(tracked);
        assert!(slot.take_unpinned().is_some());
        assert!(slot.is_empty());
    }

    #[test]
    fn test_wrapper_state() {
        let core = reclaim_core(1);
        let tracked = core.track("a", 1);
        let weak = Reclaimable::weak(&tracked);
        let copy = weak.clone();
        assert!(!copy.is_reclaimed());

        drop(tracked);
        assert!(weak.is_reclaimed());
        assert!(copy.is_reclaimed());
        assert_eq!(format!("{weak:?}"), "Reclaimable { tier: \"weak\", reclaimed: true }");
    }

    #[test]
    fn test_miss_removal_spares_rewritten_key() {
        let memory = layercache::MemoryCache::<Reclaimable<i32>>::started(
            layercache::CacheConfig::with_id("reclaim-race").workers(1),
        )
        .unwrap();
        let core = ReclaimCore::new(memory.clone() as SharedCache<Reclaimable<i32>>, 4, "test");
        let executor = memory.executor().unwrap();

        let old = core.track("a", 1);
        core.delegate().put("a", Reclaimable::weak(&old)).unwrap();
        drop(old);

        // Hold the only worker so the scheduled removal waits behind it.
        let gate = Arc::new(std::sync::Barrier::new(2));
        let blocker = {
            let gate = Arc::clone(&gate);
            executor.submit(move || {
                gate.wait();
                Ok(())
            })
        };
        assert_eq!(core.get("a").unwrap(), None);

        let fresh = core.track("a", 2);
        core.delegate().put("a", Reclaimable::weak(&fresh)).unwrap();
        core.retention().pin(fresh);
        gate.wait();
        blocker.wait().unwrap();
        executor.submit(|| Ok(())).wait().unwrap();

        assert_eq!(core.get("a").unwrap(), Some(2));
    }

    #[test]
    fn test_remove_dead_checks_each_key() {
        let core = reclaim_core(4);
        let dead = core.track("a", 1);
        core.delegate().put("a", Reclaimable::weak(&dead)).unwrap();
        drop(dead);
        let live = core.track("b", 2);
        core.delegate().put("b", Reclaimable::weak(&live)).unwrap();

        let removed = remove_dead(core.delegate().as_ref(), ["a", "b", "missing"]).unwrap();
        assert_eq!(removed, 1);
        assert!(!core.delegate().contains_key("a").unwrap());
        assert!(core.delegate().contains_key("b").unwrap());
    }

    #[test]
    fn test_drain_skips_rewritten_keys() {
        let core = reclaim_core(4);
        let keep = |tracked: Arc<Tracked<i32>>| {
            let stored = Reclaimable::weak(&tracked);
            core.retention().pin(tracked);
            stored
        };

        let old = core.track("a", 1);
        core.delegate().put("a", Reclaimable::weak(&old)).unwrap();
        drop(old);
        core.delegate().put("a", keep(core.track("a", 2))).unwrap();

        assert_eq!(core.drain().unwrap(), 0);
        assert_eq!(core.get("a").unwrap(), Some(2));
    }
}
