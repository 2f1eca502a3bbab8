//! Worker pool and async handles
//!
//! Every engine owns one [`WorkerPool`], a small tokio runtime whose blocking
//! pool runs the synchronous counterpart of each async call. Submission goes
//! through an unbounded queue, so callers never wait for a free worker. Only
//! the number of threads is bounded.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Bounded set of threads owned by a started cache
pub struct WorkerPool {
    runtime: Runtime,
}

impl WorkerPool {
    /// Build a pool with at most `workers` threads, named after the cache id
    pub fn new(id: &str, workers: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers.max(1))
            .thread_name(format!("{}-worker", id))
            .thread_keep_alive(Duration::from_secs(10))
            .enable_time()
            .build()?;
        Ok(Self { runtime })
    }

    /// Cheap handle used to submit work
    pub fn executor(&self) -> Executor {
        Executor {
            handle: self.runtime.handle().clone(),
        }
    }

    /// Stop accepting work and let running jobs finish in the background
    pub fn shutdown(self) {
        self.runtime.shutdown_background();
    }
}

/// Submission side of a [`WorkerPool`]
#[derive(Clone, Debug)]
pub struct Executor {
    handle: Handle,
}

impl Executor {
    /// Run `job` on a pool thread and return a handle to its result
    pub fn submit<T, F>(&self, job: F) -> AsyncHandle<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task = self.handle.spawn_blocking(move || {
            // Receiver may already be gone; the work still ran.
            let _ = tx.send(job());
        });
        AsyncHandle {
            state: State::Pending { rx, task },
        }
    }
}

enum State<T> {
    Ready(Option<Result<T>>),
    Pending {
        rx: oneshot::Receiver<Result<T>>,
        task: JoinHandle<()>,
    },
}

/// Cancellable, awaitable result of an operation scheduled on a worker pool
///
/// Await it from async code, or call [`AsyncHandle::wait`] from a plain thread.
/// Dropping a handle detaches the job; it is not cancelled.
#[must_use = "dropping the handle detaches the operation"]
pub struct AsyncHandle<T> {
    state: State<T>,
}

impl<T> AsyncHandle<T> {
    /// Handle that is already resolved
    pub fn ready(result: Result<T>) -> Self {
        Self {
            state: State::Ready(Some(result)),
        }
    }

    /// Handle that is already resolved with an error
    pub fn failed(err: Error) -> Self {
        Self::ready(Err(err))
    }

    /// Best-effort cancellation, only effective if the job has not started yet
    pub fn cancel(&self) {
        if let State::Pending { task, .. } = &self.state {
            task.abort();
        }
    }

    /// Whether the job has finished (or never needed to run)
    pub fn is_finished(&self) -> bool {
        match &self.state {
            State::Ready(_) => true,
            State::Pending { task, .. } => task.is_finished(),
        }
    }

    /// Block the current thread until the result is available.
    ///
    /// # Panics
    /// Panics when called from inside an async execution context; `.await` the
    /// handle there instead.
    pub fn wait(self) -> Result<T> {
        match self.state {
            State::Ready(result) => result.unwrap_or(Err(Error::Cancelled)),
            State::Pending { rx, .. } => rx.blocking_recv().unwrap_or(Err(Error::Cancelled)),
        }
    }
}

impl<T> Unpin for AsyncHandle<T> {}

impl<T> Future for AsyncHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            State::Ready(result) => Poll::Ready(result.take().unwrap_or(Err(Error::Cancelled))),
            State::Pending { rx, .. } => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(Error::Cancelled))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_submit_and_wait() {
        let pool = WorkerPool::new("test", 2).unwrap();
        let handle = pool.executor().submit(|| Ok(21 * 2));
        assert_eq!(handle.wait().unwrap(), 42);
        pool.shutdown();
    }

    #[test]
    fn test_errors_propagate() {
        let pool = WorkerPool::new("test", 1).unwrap();
        let handle = pool
            .executor()
            .submit::<(), _>(|| Err(Error::InvalidArgument("bad".into())));
        assert!(matches!(handle.wait(), Err(Error::InvalidArgument(_))));
        pool.shutdown();
    }

    #[test]
    fn test_panicking_job_reports_cancelled() {
        let pool = WorkerPool::new("test", 1).unwrap();
        let handle = pool.executor().submit::<(), _>(|| panic!("boom"));
        assert!(matches!(handle.wait(), Err(Error::Cancelled)));
        pool.shutdown();
    }

    #[test]
    fn test_cancel_before_start() {
        let pool = WorkerPool::new("test", 1).unwrap();
        let executor = pool.executor();
        let gate = Arc::new(Barrier::new(2));

        // Occupy the only worker so the second job sits in the queue.
        let blocker = {
            let gate = Arc::clone(&gate);
            executor.submit(move || {
                gate.wait();
                Ok(())
            })
        };

        let ran = Arc::new(AtomicBool::new(false));
        let queued = {
            let ran = Arc::clone(&ran);
            executor.submit(move || {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
        };
        queued.cancel();
        gate.wait();

        blocker.wait().unwrap();
        assert!(matches!(queued.wait(), Err(Error::Cancelled)));
        assert!(!ran.load(Ordering::SeqCst));
        pool.shutdown();
    }

    #[test]
    fn test_ready_handle() {
        assert_eq!(AsyncHandle::ready(Ok(5)).wait().unwrap(), 5);
        assert!(AsyncHandle::<i32>::failed(Error::Cancelled).is_finished());
    }

    #[tokio::test]
    async fn test_await_handle() {
        let pool = WorkerPool::new("test", 2).unwrap();
        let value = pool.executor().submit(|| Ok("done")).await.unwrap();
        assert_eq!(value, "done");
        pool.shutdown();
    }
}
