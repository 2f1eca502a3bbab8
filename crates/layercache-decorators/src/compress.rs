//! Byte-compressing decorator

use std::collections::HashMap;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use layercache::{Cache, CasOperation, Error, Result, SharedCache, Ttl};

use crate::error::CodecError;

const LAYER: &str = "compress";

/// Reversible byte transform
pub trait Codec: Send + Sync + 'static {
    /// Encode `input`
    fn compress(&self, input: &[u8]) -> std::result::Result<Vec<u8>, CodecError>;

    /// Decode bytes produced by [`Codec::compress`]
    fn decompress(&self, input: &[u8]) -> std::result::Result<Vec<u8>, CodecError>;
}

/// Gzip via flate2
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: Compression,
}

impl GzipCodec {
    /// Codec using compression `level` (0-9)
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Codec for GzipCodec {
    fn compress(&self, input: &[u8]) -> std::result::Result<Vec<u8>, CodecError> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(input.len() / 2 + 32), self.level);
        encoder.write_all(input).map_err(CodecError::Compress)?;
        encoder.finish().map_err(CodecError::Compress)
    }

    fn decompress(&self, input: &[u8]) -> std::result::Result<Vec<u8>, CodecError> {
        let mut output = Vec::with_capacity(input.len() * 2);
        GzDecoder::new(input)
            .read_to_end(&mut output)
            .map_err(CodecError::Decompress)?;
        Ok(output)
    }
}

/// Stores compressed bytes in the delegate, hands back the originals
pub struct CompressCache<C = GzipCodec> {
    delegate: SharedCache<Vec<u8>>,
    codec: C,
}

impl CompressCache<GzipCodec> {
    /// Wrap `delegate` with default gzip compression
    pub fn new(delegate: SharedCache<Vec<u8>>) -> Self {
        Self::with_codec(delegate, GzipCodec::default())
    }
}

impl<C: Codec> CompressCache<C> {
    /// Wrap `delegate` with a custom codec
    pub fn with_codec(delegate: SharedCache<Vec<u8>>, codec: C) -> Self {
        Self { delegate, codec }
    }

    fn encode(&self, value: &[u8]) -> Result<Vec<u8>> {
        self.codec
            .compress(value)
            .map_err(|e| Error::decoration(LAYER, e))
    }

    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>> {
        self.codec
            .decompress(stored)
            .map_err(|e| Error::decoration(LAYER, e))
    }

    fn decode_opt(&self, stored: Option<Vec<u8>>) -> Result<Option<Vec<u8>>> {
        stored.map(|bytes| self.decode(&bytes)).transpose()
    }
}

impl<C: Codec> Cache<Vec<u8>> for CompressCache<C> {
    forward_lifecycle!();
    forward_counters!();

    fn contains_key(&self, key: &str) -> Result<bool> {
        self.delegate.contains_key(key)
    }

    fn put_with(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Ttl,
        cas: Option<&dyn CasOperation<Vec<u8>>>,
    ) -> Result<()> {
        let stored = self.encode(&value)?;
        match cas {
            None => self.delegate.put_with(key, stored, ttl, None),
            Some(op) => {
                let adapter = CodecCas { op, cache: self };
                self.delegate.put_with(key, stored, ttl, Some(&adapter))
            }
        }
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let stored = self.delegate.get(key)?;
        self.decode_opt(stored)
    }

    fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, Vec<u8>>> {
        self.delegate
            .get_many(keys)?
            .into_iter()
            .map(|(key, stored)| Ok((key, self.decode(&stored)?)))
            .collect()
    }

    fn remove(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let stored = self.delegate.remove(key)?;
        self.decode_opt(stored)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
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

/// Lifts a CAS operation over plain bytes to one over compressed bytes
struct CodecCas<'a, C> {
    op: &'a dyn CasOperation<Vec<u8>>,
    cache: &'a CompressCache<C>,
}

impl<C: Codec> CasOperation<Vec<u8>> for CodecCas<'_, C> {
    fn max_tries(&self) -> u32 {
        self.op.max_tries()
    }

    fn compute_new_value(&self, current: &Vec<u8>) -> Result<Vec<u8>> {
        let plain = self.cache.decode(current)?;
        let next = self.op.compute_new_value(&plain)?;
        self.cache.encode(&next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use layercache::{CacheConfig, CasFn, MemoryCache};

    fn stack() -> (Arc<MemoryCache<Vec<u8>>>, CompressCache) {
        let memory = MemoryCache::started(CacheConfig::with_id("compress-test")).unwrap();
        let compress = CompressCache::new(memory.clone() as SharedCache<Vec<u8>>);
        (memory, compress)
    }

    #[test]
    fn test_stores_compressed_returns_original() {
        let (memory, compress) = stack();
        let payload = b"layercache ".repeat(200);
        compress.put("doc", payload.clone()).unwrap();

        let stored = memory.get("doc").unwrap().unwrap();
        assert!(stored.len() < payload.len());
        assert_ne!(stored, payload);
        assert_eq!(compress.get("doc").unwrap(), Some(payload));
    }

    #[test]
    fn test_absent_skips_decoding() {
        let (_memory, compress) = stack();
        assert_eq!(compress.get("missing").unwrap(), None);
        assert_eq!(compress.remove("missing").unwrap(), None);
    }

    #[test]
    fn test_corrupt_bytes_surface_as_decoration() {
        let (memory, compress) = stack();
        memory.put("bad", b"not gzip".to_vec()).unwrap();

        let err = compress.get("bad").unwrap_err();
        assert!(matches!(err, Error::Decoration { layer: "compress", .. }));
        assert!(compress.get_many(&["bad"]).is_err());
    }

    #[test]
    fn test_batches_decode_each_value() {
        let (_memory, compress) = stack();
        compress.put("a", b"alpha".to_vec()).unwrap();
        compress.put("b", b"beta".to_vec()).unwrap();

        let found = compress.get_many(&["a", "b", "c"]).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], b"beta".to_vec());

        let removed = compress.remove_many(&["c", "a"]).unwrap();
        assert_eq!(removed, vec![None, Some(b"alpha".to_vec())]);
    }

    #[test]
    fn test_cas_sees_plain_bytes() {
        let (memory, compress) = stack();
        let append = CasFn::new(2, |current: &Vec<u8>| {
            let mut next = current.clone();
            next.extend_from_slice(b"!");
            Ok(next)
        });
        compress.put("a", b"hi".to_vec()).unwrap();
        compress.put_cas("a", b"ignored".to_vec(), &append).unwrap();

        assert_eq!(compress.get("a").unwrap(), Some(b"hi!".to_vec()));
        let raw = memory.get("a").unwrap().unwrap();
        assert_eq!(GzipCodec::default().decompress(&raw).unwrap(), b"hi!".to_vec());
    }

    #[test]
    fn test_custom_level() {
        let codec = GzipCodec::new(9);
        let packed = codec.compress(b"aaaaaaaaaaaaaaaa").unwrap();
        assert_eq!(codec.decompress(&packed).unwrap(), b"aaaaaaaaaaaaaaaa".to_vec());
    }
}
