//! Lifecycle core shared by cache engines
//!
//! [`CacheCore`] is what an engine embeds to get identity, idempotent
//! start/stop, the started-state guard and an owned worker pool. The
//! operation overloads and async variants live on the [`Cache`](crate::Cache)
//! trait itself as provided methods.

use std::fmt;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::pool::{Executor, WorkerPool};

/// Lifecycle state of a cache instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, never started
    Uninitialized,
    /// Accepting operations
    Started,
    /// Stopped; may be started again
    Stopped,
}

impl Lifecycle {
    /// Lowercase name used in error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Started => "started",
            Lifecycle::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Running {
    state: Lifecycle,
    pool: Option<WorkerPool>,
}

/// Identity, lifecycle guard and worker pool of one cache instance
pub struct CacheCore {
    id: String,
    workers: usize,
    running: Mutex<Running>,
}

impl CacheCore {
    /// Create an unstarted core from configuration
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            id: config.id.clone(),
            workers: config.workers,
            running: Mutex::new(Running {
                state: Lifecycle::Uninitialized,
                pool: None,
            }),
        }
    }

    /// Cache identity
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> Lifecycle {
        self.running.lock().state
    }

    /// Whether operations are currently accepted
    pub fn is_started(&self) -> bool {
        self.state() == Lifecycle::Started
    }

    /// Start the cache and create its worker pool; no-op if already started
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.state == Lifecycle::Started {
            debug!(id = %self.id, "start ignored, already started");
            return Ok(());
        }

        running.pool = Some(WorkerPool::new(&self.id, self.workers)?);
        running.state = Lifecycle::Started;
        info!(id = %self.id, workers = self.workers, "cache started");
        Ok(())
    }

    /// Stop the cache and dispose of its worker pool; no-op unless started
    pub fn stop(&self) -> Result<()> {
        let pool = {
            let mut running = self.running.lock();
            if running.state != Lifecycle::Started {
                debug!(id = %self.id, state = %running.state, "stop ignored, not started");
                return Ok(());
            }
            running.state = Lifecycle::Stopped;
            running.pool.take()
        };

        if let Some(pool) = pool {
            pool.shutdown();
        }
        info!(id = %self.id, "cache stopped");
        Ok(())
    }

    /// Fail with [`Error::IllegalState`] unless started
    pub fn ensure_started(&self) -> Result<()> {
        let state = self.state();
        if state == Lifecycle::Started {
            Ok(())
        } else {
            Err(self.illegal_state(state))
        }
    }

    /// Submission handle for the worker pool of a started cache
    pub fn executor(&self) -> Result<Executor> {
        let running = self.running.lock();
        match (&running.state, &running.pool) {
            (Lifecycle::Started, Some(pool)) => Ok(pool.executor()),
            (state, _) => Err(self.illegal_state(*state)),
        }
    }

    fn illegal_state(&self, state: Lifecycle) -> Error {
        Error::IllegalState {
            id: self.id.clone(),
            state: state.as_str(),
        }
    }
}

impl fmt::Debug for CacheCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheCore")
            .field("id", &self.id)
            .field("workers", &self.workers)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for CacheCore {
    fn drop(&mut self) {
        if let Some(pool) = self.running.get_mut().pool.take() {
            pool.shutdown();
        }
    }
}
