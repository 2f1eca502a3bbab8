//! Key-hashing decorator

use std::borrow::Cow;
use std::collections::HashMap;

use ahash::{AHashMap, RandomState};
use layercache::{Cache, CasOperation, Result, SharedCache, Ttl};

/// Prefix for derived keys unless configured otherwise
pub const DEFAULT_PREFIX: &str = "hk:";

/// Maps key bytes to a fixed-width digest
pub trait KeyHasher: Send + Sync + 'static {
    /// Digest of `key`
    fn hash(&self, key: &[u8]) -> u64;
}

/// ahash with fixed seeds
///
/// Stable for a given build of the crate; a store that outlives upgrades of
/// the ahash dependency should supply its own [`KeyHasher`].
#[derive(Clone)]
pub struct AHashKeyHasher {
    state: RandomState,
}

impl AHashKeyHasher {
    /// Hasher seeded with `seed`
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: RandomState::with_seeds(
                seed,
                seed ^ 0x243f_6a88_85a3_08d3,
                seed ^ 0x1319_8a2e_0370_7344,
                seed ^ 0xa409_3822_299f_31d0,
            ),
        }
    }
}

impl Default for AHashKeyHasher {
    fn default() -> Self {
        Self::with_seed(0x6c61_7965_7263_6163)
    }
}

impl KeyHasher for AHashKeyHasher {
    fn hash(&self, key: &[u8]) -> u64 {
        self.state.hash_one(key)
    }
}

/// Replaces every key with `prefix + hex(hash(key))` before forwarding
///
/// Values are untouched. Batch reads are keyed by the caller's original
/// keys. Empty keys pass through so the delegate reports them as usual.
pub struct HashKeyCache<V, H = AHashKeyHasher> {
    delegate: SharedCache<V>,
    hasher: H,
    prefix: String,
}

impl<V> HashKeyCache<V, AHashKeyHasher>
where
    V: Send + 'static,
{
    /// Wrap `delegate` using the default hasher and prefix
    pub fn new(delegate: SharedCache<V>) -> Self {
        Self::with_hasher(delegate, AHashKeyHasher::default())
    }
}

impl<V, H> HashKeyCache<V, H>
where
    V: Send + 'static,
    H: KeyHasher,
{
    /// Wrap `delegate` with a custom hasher
    pub fn with_hasher(delegate: SharedCache<V>, hasher: H) -> Self {
        Self {
            delegate,
            hasher,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    /// Replace the derived-key prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Key the delegate sees for `key`
    pub fn derive<'k>(&self, key: &'k str) -> Cow<'k, str> {
        if key.is_empty() {
            return Cow::Borrowed(key);
        }
        let digest = self.hasher.hash(key.as_bytes());
        Cow::Owned(format!("{}{:016x}", self.prefix, digest))
    }
}

impl<V, H> Cache<V> for HashKeyCache<V, H>
where
    V: Send + 'static,
    H: KeyHasher,
{
    forward_lifecycle!();

    fn contains_key(&self, key: &str) -> Result<bool> {
        self.delegate.contains_key(&self.derive(key))
    }

    fn put_with(
        &self,
        key: &str,
        value: V,
        ttl: Ttl,
        cas: Option<&dyn CasOperation<V>>,
    ) -> Result<()> {
        self.delegate.put_with(&self.derive(key), value, ttl, cas)
    }

    fn get(&self, key: &str) -> Result<Option<V>> {
        self.delegate.get(&self.derive(key))
    }

    fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, V>> {
        let mut originals = AHashMap::with_capacity(keys.len());
        let derived: Vec<Cow<'_, str>> = keys
            .iter()
            .filter(|key| !key.is_empty())
            .map(|key| {
                let derived = self.derive(key);
                originals.insert(derived.to_string(), *key);
                derived
            })
            .collect();
        let derived: Vec<&str> = derived.iter().map(|key| key.as_ref()).collect();

        Ok(self
            .delegate
            .get_many(&derived)?
            .into_iter()
            .filter_map(|(derived, value)| {
                originals
                    .get(derived.as_str())
                    .map(|original| ((*original).to_string(), value))
            })
            .collect())
    }

    fn remove(&self, key: &str) -> Result<Option<V>> {
        self.delegate.remove(&self.derive(key))
    }

    fn remove_many(&self, keys: &[&str]) -> Result<Vec<Option<V>>> {
        let derived: Vec<Cow<'_, str>> = keys.iter().map(|key| self.derive(key)).collect();
        let derived: Vec<&str> = derived.iter().map(|key| key.as_ref()).collect();
        self.delegate.remove_many(&derived)
    }

    fn clear(&self) -> Result<bool> {
        self.delegate.clear()
    }

    fn get_counter(&self, key: &str) -> Result<i64> {
        self.delegate.get_counter(&self.derive(key))
    }

    fn set_counter(&self, key: &str, value: i64) -> Result<()> {
        self.delegate.set_counter(&self.derive(key), value)
    }

    fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        self.delegate.increment(&self.derive(key), delta)
    }

    fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
        self.delegate.decrement(&self.derive(key), delta)
    }
}
