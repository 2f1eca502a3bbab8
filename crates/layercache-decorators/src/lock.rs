//! Reader-writer locking decorator

use std::collections::HashMap;

use layercache::{Cache, CasOperation, Executor, Result, SharedCache, Ttl};
use parking_lot::RwLock;

/// Serializes mutations against a non-thread-safe delegate
///
/// Reads (`id`, `is_started`, `contains_key`, `get`, `get_many`,
/// `get_counter`) share the lock; every other operation, lifecycle
/// included, takes it exclusively. `executor` is not guarded.
pub struct ReadWriteLockCache<V> {
    delegate: SharedCache<V>,
    lock: RwLock<()>,
}

impl<V> ReadWriteLockCache<V>
where
    V: Send + 'static,
{
    /// Wrap `delegate`
    pub fn new(delegate: SharedCache<V>) -> Self {
        Self {
            delegate,
            lock: RwLock::new(()),
        }
    }
}

impl<V> Cache<V> for ReadWriteLockCache<V>
where
    V: Send + 'static,
{
    fn id(&self) -> &str {
        let _guard = self.lock.read();
        self.delegate.id()
    }

    fn start(&self) -> Result<()> {
        let _guard = self.lock.write();
        self.delegate.start()
    }

    fn stop(&self) -> Result<()> {
        let _guard = self.lock.write();
        self.delegate.stop()
    }

    fn is_started(&self) -> bool {
        let _guard = self.lock.read();
        self.delegate.is_started()
    }

    fn executor(&self) -> Result<Executor> {
        self.delegate.executor()
    }

    fn contains_key(&self, key: &str) -> Result<bool> {
        let _guard = self.lock.read();
        self.delegate.contains_key(key)
    }

    fn put_with(
        &self,
        key: &str,
        value: V,
        ttl: Ttl,
        cas: Option<&dyn CasOperation<V>>,
    ) -> Result<()> {
        let _guard = self.lock.write();
        self.delegate.put_with(key, value, ttl, cas)
    }

    fn get(&self, key: &str) -> Result<Option<V>> {
        let _guard = self.lock.read();
        self.delegate.get(key)
    }

    fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, V>> {
        let _guard = self.lock.read();
        self.delegate.get_many(keys)
    }

    fn remove(&self, key: &str) -> Result<Option<V>> {
        let _guard = self.lock.write();
        self.delegate.remove(key)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<Vec<Option<V>>> {
        let _guard = self.lock.write();
        self.delegate.remove_many(keys)
    }

    fn clear(&self) -> Result<bool> {
        let _guard = self.lock.write();
        self.delegate.clear()
    }

    fn get_counter(&self, key: &str) -> Result<i64> {
        let _guard = self.lock.read();
        self.delegate.get_counter(key)
    }

    fn set_counter(&self, key: &str, value: i64) -> Result<()> {
        let _guard = self.lock.write();
        self.delegate.set_counter(key, value)
    }

    fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        let _guard = self.lock.write();
        self.delegate.increment(key, delta)
    }

    fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
        let _guard = self.lock.write();
        self.delegate.decrement(key, delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use layercache::{CacheConfig, MemoryCache};

    /// Delegate that counts readers inside `get` and waits for a partner
///
/// `put_with` meets the partner twice: once on entry, once to be released.
    struct Rendezvous {
        inner: Arc<MemoryCache<u32>>,
        barrier: Barrier,
        inside: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Cache<u32> for Rendezvous {
        fn id(&self) -> &str {
            self.inner.id()
        }
        fn start(&self) -> Result<()> {
            self.inner.start()
        }
        fn stop(&self) -> Result<()> {
            self.inner.stop()
        }
        fn is_started(&self) -> bool {
            self.inner.is_started()
        }
        fn executor(&self) -> Result<Executor> {
            self.inner.executor()
        }
        fn contains_key(&self, key: &str) -> Result<bool> {
            self.inner.contains_key(key)
        }
        fn put_with(
            &self,
            key: &str,
            value: u32,
            ttl: Ttl,
            cas: Option<&dyn CasOperation<u32>>,
        ) -> Result<()> {
            // Signal entry, then hold until released.
            self.barrier.wait();
            self.barrier.wait();
            self.inner.put_with(key, value, ttl, cas)
        }
        fn get(&self, key: &str) -> Result<Option<u32>> {
            let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            // Both readers must be inside at once to get past this.
            self.barrier.wait();
            self.inside.fetch_sub(1, Ordering::SeqCst);
            self.inner.get(key)
        }
        fn remove(&self, key: &str) -> Result<Option<u32>> {
            self.inner.remove(key)
        }
        fn clear(&self) -> Result<bool> {
            self.inner.clear()
        }
        fn get_counter(&self, key: &str) -> Result<i64> {
            self.inner.get_counter(key)
        }
        fn set_counter(&self, key: &str, value: i64) -> Result<()> {
            self.inner.set_counter(key, value)
        }
    }

    fn rendezvous(id: &str) -> Arc<Rendezvous> {
        let inner = MemoryCache::<u32>::started(CacheConfig::with_id(id)).unwrap();
        inner.put("a", 1).unwrap();
        Arc::new(Rendezvous {
            inner,
            barrier: Barrier::new(2),
            inside: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_readers_run_concurrently() {
        let rendezvous = rendezvous("lock-test");
        let locked = Arc::new(ReadWriteLockCache::new(rendezvous.clone() as SharedCache<u32>));

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let locked = Arc::clone(&locked);
                thread::spawn(move || locked.get("a").unwrap())
            })
            .collect();
        for reader in readers {
            assert_eq!(reader.join().unwrap(), Some(1));
        }
        assert_eq!(rendezvous.peak.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_id_waits_for_writer() {
        let rendezvous = rendezvous("lock-id");
        let locked = Arc::new(ReadWriteLockCache::new(rendezvous.clone() as SharedCache<u32>));

        let writer = {
            let locked = Arc::clone(&locked);
            thread::spawn(move || locked.put("b", 2).unwrap())
        };
        rendezvous.barrier.wait();

        let read_id = Arc::new(AtomicBool::new(false));
        let reader = {
            let locked = Arc::clone(&locked);
            let read_id = Arc::clone(&read_id);
            thread::spawn(move || {
                assert_eq!(locked.id(), "lock-id");
                read_id.store(true, Ordering::SeqCst);
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!read_id.load(Ordering::SeqCst));

        rendezvous.barrier.wait();
        writer.join().unwrap();
        reader.join().unwrap();
        assert!(read_id.load(Ordering::SeqCst));
    }

    #[test]
    fn test_writers_are_exclusive() {
        let inner = MemoryCache::<u32>::started(CacheConfig::with_id("lock-writers")).unwrap();
        let locked = Arc::new(ReadWriteLockCache::new(inner.clone() as SharedCache<u32>));

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let locked = Arc::clone(&locked);
                thread::spawn(move || {
                    for i in 0..100 {
                        locked.put(&format!("k{t}-{i}"), i).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(inner.len(), 400);
    }

    #[test]
    fn test_forwards_lifecycle() {
        let inner = MemoryCache::<u32>::started(CacheConfig::default()).unwrap();
        let locked = ReadWriteLockCache::new(inner.clone() as SharedCache<u32>);
        locked.stop().unwrap();
        assert!(!locked.is_started());
        locked.start().unwrap();
        assert!(inner.is_started());
    }
}
