//! Typed view over a byte-valued cache

use std::collections::HashMap;
use std::marker::PhantomData;

use layercache::{Cache, CasOperation, Error, Result, SharedCache, Ttl};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

const LAYER: &str = "serialize";

/// Converts values of `T` to and from bytes
pub trait Serializer<T>: Send + Sync + 'static {
    /// Encode `value`
    fn serialize(&self, value: &T) -> std::result::Result<Vec<u8>, CodecError>;

    /// Decode bytes produced by [`Serializer::serialize`]
    fn deserialize(&self, bytes: &[u8]) -> std::result::Result<T, CodecError>;
}

/// JSON via serde_json
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl<T> Serializer<T> for JsonSerializer
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T) -> std::result::Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Serialize(Box::new(e)))
    }

    fn deserialize(&self, bytes: &[u8]) -> std::result::Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Deserialize(Box::new(e)))
    }
}

/// Exposes a `Cache<Vec<u8>>` as a `Cache<T>`
///
/// Values are serialized on the way in and deserialized on the way out. CAS
/// operations see typed values. Counters pass through untouched.
pub struct SerializeCache<T, S = JsonSerializer> {
    delegate: SharedCache<Vec<u8>>,
    serializer: S,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerializeCache<T, JsonSerializer>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Wrap `delegate` with JSON encoding
    pub fn new(delegate: SharedCache<Vec<u8>>) -> Self {
        Self::with_serializer(delegate, JsonSerializer)
    }
}

impl<T, S> SerializeCache<T, S>
where
    T: Send + 'static,
    S: Serializer<T>,
{
    /// Wrap `delegate` with a custom serializer
    pub fn with_serializer(delegate: SharedCache<Vec<u8>>, serializer: S) -> Self {
        Self {
            delegate,
            serializer,
            _marker: PhantomData,
        }
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        self.serializer
            .serialize(value)
            .map_err(|e| Error::decoration(LAYER, e))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        self.serializer
            .deserialize(bytes)
            .map_err(|e| Error::decoration(LAYER, e))
    }

    fn decode_opt(&self, stored: Option<Vec<u8>>) -> Result<Option<T>> {
        stored.map(|bytes| self.decode(&bytes)).transpose()
    }
}

impl<T, S> Cache<T> for SerializeCache<T, S>
where
    T: Send + 'static,
    S: Serializer<T>,
{
    forward_lifecycle!();
    forward_counters!();

    fn contains_key(&self, key: &str) -> Result<bool> {
        self.delegate.contains_key(key)
    }

    fn put_with(
        &self,
        key: &str,
        value: T,
        ttl: Ttl,
        cas: Option<&dyn CasOperation<T>>,
    ) -> Result<()> {
        let bytes = self.encode(&value)?;
        match cas {
            None => self.delegate.put_with(key, bytes, ttl, None),
            Some(op) => {
                let adapter = TypedCas { op, cache: self };
                self.delegate.put_with(key, bytes, ttl, Some(&adapter))
            }
        }
    }

    fn get(&self, key: &str) -> Result<Option<T>> {
        let stored = self.delegate.get(key)?;
        self.decode_opt(stored)
    }

    fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, T>> {
        self.delegate
            .get_many(keys)?
            .into_iter()
            .map(|(key, bytes)| Ok((key, self.decode(&bytes)?)))
            .collect()
    }

    fn remove(&self, key: &str) -> Result<Option<T>> {
        let stored = self.delegate.remove(key)?;
        self.decode_opt(stored)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<Vec<Option<T>>> {
        self.delegate
            .remove_many(keys)?
            .into_iter()
            .map(|stored| self.decode_opt(stored))
            .collect()
    }

    fn clear(&self) -> Result<bool> {
        self.delegate.clear()
    }
}

/// Lifts a CAS operation over `T` to one over encoded bytes
struct TypedCas<'a, T, S> {
    op: &'a dyn CasOperation<T>,
    cache: &'a SerializeCache<T, S>,
}

impl<T, S> CasOperation<Vec<u8>> for TypedCas<'_, T, S>
where
    T: Send + 'static,
    S: Serializer<T>,
{
    fn max_tries(&self) -> u32 {
        self.op.max_tries()
    }

    fn compute_new_value(&self, current: &Vec<u8>) -> Result<Vec<u8>> {
        let typed = self.cache.decode(current)?;
        let next = self.op.compute_new_value(&typed)?;
        self.cache.encode(&next)
    }
}
