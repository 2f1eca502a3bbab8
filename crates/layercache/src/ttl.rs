//! Entry expiry policy

use std::time::{Duration, Instant, SystemTime};

use crate::error::{Error, Result};

/// How long an entry stays visible after it is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Never expires on its own
    #[default]
    Unbounded,
    /// Expires once the duration has elapsed since the write
    After(Duration),
    /// Expires at a wall-clock instant
    At(SystemTime),
}

impl Ttl {
    /// Resolve to a monotonic deadline, `None` for unbounded entries.
    ///
    /// Fails with [`Error::InvalidArgument`] when the deadline is not in the future.
    pub fn deadline(&self, now: Instant) -> Result<Option<Instant>> {
        match *self {
            Ttl::Unbounded => Ok(None),
            Ttl::After(ttl) => {
                if ttl.is_zero() {
                    return Err(Error::InvalidArgument("ttl must be positive".to_string()));
                }
                Ok(Some(now + ttl))
            }
            Ttl::At(at) => match at.duration_since(SystemTime::now()) {
                Ok(remaining) if !remaining.is_zero() => Ok(Some(now + remaining)),
                _ => Err(Error::InvalidArgument(format!(
                    "expiry instant {:?} is in the past",
                    at
                ))),
            },
        }
    }
}

impl From<Duration> for Ttl {
    fn from(ttl: Duration) -> Self {
        Ttl::After(ttl)
    }
}
