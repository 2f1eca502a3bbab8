//! Capability errors raised by transforming decorators

use std::io;

use layercache::BoxError;
use thiserror::Error;

/// Failure inside a codec, serializer or key hasher
///
/// Decorators surface these to callers as `layercache::Error::Decoration`.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Compression stream failed
    #[error("compression failed: {0}")]
    Compress(#[source] io::Error),

    /// Input was not a valid compressed stream
    #[error("decompression failed: {0}")]
    Decompress(#[source] io::Error),

    /// Value could not be encoded
    #[error("serialization failed: {0}")]
    Serialize(#[source] BoxError),

    /// Bytes could not be decoded into a value
    #[error("deserialization failed: {0}")]
    Deserialize(#[source] BoxError),
}
