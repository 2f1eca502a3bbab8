//! In-process map-backed engine
//!
//! Entries live in one `RwLock`ed ahash map. Expiry is lazy: an entry whose
//! deadline has passed is purged by whichever access finds it. Every write
//! stamps the entry with a fresh version, which is what CAS swaps compare.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::cache::Cache;
use crate::cas::{CasOperation, CasOutcome};
use crate::config::CacheConfig;
use crate::error::{check_key, Error, Result};
use crate::lifecycle::CacheCore;
use crate::pool::Executor;
use crate::stats::CacheStats;
use crate::ttl::Ttl;

enum Slot<V> {
    Value(V),
    Counter(i64),
}

struct Entry<V> {
    slot: Slot<V>,
    created: Instant,
    expires_at: Option<Instant>,
    version: u64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-memory cache engine
pub struct MemoryCache<V> {
    core: CacheCore,
    entries: RwLock<AHashMap<String, Entry<V>>>,
    next_version: AtomicU64,
    stats: CacheStats,
}

impl<V> MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an unstarted engine
    ///
    /// # Arguments
    /// * `config` - Identity and worker-pool size
    ///
    /// # Returns
    /// * `Result<MemoryCache<V>>` - Engine handle, call `start()` before use
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            core: CacheCore::new(&config),
            entries: RwLock::new(AHashMap::new()),
            next_version: AtomicU64::new(1),
            stats: CacheStats::new(),
        })
    }

    /// Create, start and share an engine in one step
    pub fn started(config: CacheConfig) -> Result<Arc<Self>> {
        let cache = Self::new(config)?;
        cache.start()?;
        Ok(Arc::new(cache))
    }

    /// Get engine statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of stored slots, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if no slots are stored
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Run the CAS protocol for `key`.
    ///
    /// When the key is absent `value` is inserted as-is. Otherwise the
    /// operation computes a replacement from the current value, and the swap
    /// only lands if the entry's version is unchanged. At most `max_tries`
    /// attempts are made. The result is `Success` or `Exhausted`.
    pub fn cas(
        &self,
        key: &str,
        value: V,
        ttl: Ttl,
        op: &dyn CasOperation<V>,
    ) -> Result<CasOutcome<V>> {
        self.core.ensure_started()?;
        check_key(key)?;
        let deadline = ttl.deadline(Instant::now())?;
        self.run_cas(key, value, deadline, op)
    }

    fn run_cas(
        &self,
        key: &str,
        value: V,
        deadline: Option<Instant>,
        op: &dyn CasOperation<V>,
    ) -> Result<CasOutcome<V>> {
        let tries = op.max_tries().max(1);
        let mut fresh = Some(value);

        for attempt in 1..=tries {
            let outcome = match self.snapshot(key)? {
                None => self.try_insert_absent(key, &mut fresh, deadline),
                Some((current, version)) => {
                    let next = op.compute_new_value(&current)?;
                    self.try_swap(key, version, next, deadline)
                }
            };

            match outcome {
                CasOutcome::Conflict => {
                    self.stats.record_cas_conflict();
                    debug!(id = %self.core.id(), key, attempt, tries, "CAS conflict");
                }
                done => return Ok(done),
            }
        }

        Ok(CasOutcome::Exhausted { tries })
    }

    /// Current value and version, `None` if absent or expired
    fn snapshot(&self, key: &str) -> Result<Option<(V, u64)>> {
        self.lookup(key, |entry| match &entry.slot {
            Slot::Value(value) => Ok((value.clone(), entry.version)),
            Slot::Counter(_) => Err(Error::InvalidArgument(format!(
                "CAS on counter key '{}'",
                key
            ))),
        })
        .transpose()
    }

    fn try_insert_absent(
        &self,
        key: &str,
        fresh: &mut Option<V>,
        deadline: Option<Instant>,
    ) -> CasOutcome<V> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| !entry.is_expired(now)) {
            return CasOutcome::Conflict;
        }
        let Some(value) = fresh.take() else {
            return CasOutcome::Conflict;
        };

        let stored = value.clone();
        entries.insert(key.to_string(), self.entry(Slot::Value(value), now, deadline));
        self.stats.record_insert();
        CasOutcome::Success(stored)
    }

    fn try_swap(
        &self,
        key: &str,
        expected: u64,
        next: V,
        deadline: Option<Instant>,
    ) -> CasOutcome<V> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) if entry.version == expected && !entry.is_expired(now) => {
                entry.slot = Slot::Value(next.clone());
                entry.expires_at = deadline;
                entry.version = self.bump_version();
                self.stats.record_insert();
                CasOutcome::Success(next)
            }
            _ => CasOutcome::Conflict,
        }
    }

    /// Apply `f` to the live entry for `key`, purging it first if expired
    fn lookup<R>(&self, key: &str, f: impl FnOnce(&Entry<V>) -> R) -> Option<R> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(f(entry)),
                Some(_) => {}
            }
        }
        self.purge_expired(&[key], now);
        None
    }

    fn purge_expired(&self, keys: &[&str], now: Instant) {
        let mut entries = self.entries.write();
        for key in keys {
            // Another writer may have replaced it since the read lock dropped.
            if entries.get(*key).is_some_and(|entry| entry.is_expired(now)) {
                if let Some(entry) = entries.remove(*key) {
                    self.stats.record_expiration();
                    trace!(
                        id = %self.core.id(),
                        key,
                        age_ms = now.duration_since(entry.created).as_millis() as u64,
                        "purged expired entry"
                    );
                }
            }
        }
    }

    fn insert(&self, key: &str, slot: Slot<V>, deadline: Option<Instant>) {
        let entry = self.entry(slot, Instant::now(), deadline);
        self.entries.write().insert(key.to_string(), entry);
        self.stats.record_insert();
    }

    fn entry(&self, slot: Slot<V>, now: Instant, deadline: Option<Instant>) -> Entry<V> {
        Entry {
            slot,
            created: now,
            expires_at: deadline,
            version: self.bump_version(),
        }
    }

    fn bump_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed)
    }

    /// Atomic read-modify-write under the write lock
    fn add(&self, key: &str, delta: i64) -> Result<i64> {
        self.core.ensure_started()?;
        check_key(key)?;

        let now = Instant::now();
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(key) {
            if !entry.is_expired(now) {
                return match &mut entry.slot {
                    Slot::Counter(current) => {
                        *current = current.wrapping_add(delta);
                        let next = *current;
                        entry.version = self.bump_version();
                        Ok(next)
                    }
                    Slot::Value(_) => Err(Error::NotACounter {
                        key: key.to_string(),
                    }),
                };
            }
        }

        entries.insert(key.to_string(), self.entry(Slot::Counter(delta), now, None));
        self.stats.record_insert();
        Ok(delta)
    }
}

impl<V> Cache<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn id(&self) -> &str {
        self.core.id()
    }

    fn start(&self) -> Result<()> {
        self.core.start()
    }

    fn stop(&self) -> Result<()> {
        self.core.stop()
    }

    fn is_started(&self) -> bool {
        self.core.is_started()
    }

    fn executor(&self) -> Result<Executor> {
        self.core.executor()
    }

    fn contains_key(&self, key: &str) -> Result<bool> {
        self.core.ensure_started()?;
        check_key(key)?;
        Ok(self.lookup(key, |_| ()).is_some())
    }

    fn put_with(
        &self,
        key: &str,
        value: V,
        ttl: Ttl,
        cas: Option<&dyn CasOperation<V>>,
    ) -> Result<()> {
        self.core.ensure_started()?;
        check_key(key)?;
        let deadline = ttl.deadline(Instant::now())?;

        let Some(op) = cas else {
            self.insert(key, Slot::Value(value), deadline);
            return Ok(());
        };

        match self.run_cas(key, value, deadline, op)? {
            CasOutcome::Success(_) => Ok(()),
            CasOutcome::Exhausted { tries } => Err(Error::CasExhausted {
                key: key.to_string(),
                tries,
            }),
            CasOutcome::Conflict => Err(Error::CasExhausted {
                key: key.to_string(),
                tries: op.max_tries(),
            }),
        }
    }

    fn get(&self, key: &str) -> Result<Option<V>> {
        self.core.ensure_started()?;
        check_key(key)?;

        let value = self
            .lookup(key, |entry| match &entry.slot {
                Slot::Value(value) => Some(value.clone()),
                Slot::Counter(_) => None,
            })
            .flatten();

        if value.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        Ok(value)
    }

    fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, V>> {
        self.core.ensure_started()?;

        let now = Instant::now();
        let mut found = HashMap::with_capacity(keys.len());
        let mut expired = Vec::new();
        {
            let entries = self.entries.read();
            for key in keys.iter().copied().filter(|k| !k.is_empty()) {
                match entries.get(key) {
                    Some(entry) if entry.is_expired(now) => expired.push(key),
                    Some(Entry {
                        slot: Slot::Value(value),
                        ..
                    }) => {
                        found.insert(key.to_string(), value.clone());
                    }
                    _ => {}
                }
            }
        }
        if !expired.is_empty() {
            self.purge_expired(&expired, now);
        }

        let hits = found.len();
        let requested = keys.iter().filter(|k| !k.is_empty()).count();
        (0..hits).for_each(|_| self.stats.record_hit());
        (hits..requested).for_each(|_| self.stats.record_miss());
        Ok(found)
    }

    fn remove(&self, key: &str) -> Result<Option<V>> {
        self.core.ensure_started()?;
        check_key(key)?;

        let now = Instant::now();
        let removed = self.entries.write().remove(key);
        Ok(match removed {
            Some(entry) if entry.is_expired(now) => {
                self.stats.record_expiration();
                None
            }
            Some(Entry {
                slot: Slot::Value(value),
                ..
            }) => Some(value),
            _ => None,
        })
    }

    fn clear(&self) -> Result<bool> {
        self.core.ensure_started()?;
        let mut entries = self.entries.write();
        let dropped = entries.len();
        entries.clear();
        debug!(id = %self.core.id(), dropped, "cache cleared");
        Ok(true)
    }

    fn get_counter(&self, key: &str) -> Result<i64> {
        self.core.ensure_started()?;
        check_key(key)?;

        self.lookup(key, |entry| match entry.slot {
            Slot::Counter(n) => Ok(n),
            Slot::Value(_) => Err(Error::NotACounter {
                key: key.to_string(),
            }),
        })
        .unwrap_or(Ok(0))
    }

    fn set_counter(&self, key: &str, value: i64) -> Result<()> {
        self.core.ensure_started()?;
        check_key(key)?;
        self.insert(key, Slot::Counter(value), None);
        Ok(())
    }

    fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        self.add(key, delta)
    }

    fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
        self.add(key, delta.wrapping_neg())
    }
}
