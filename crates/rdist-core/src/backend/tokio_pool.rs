//! Tokio runtime substrate.
//!
//! Each backend owns a multi-thread runtime. Mapper and reducer bodies run on
//! the runtime's blocking pool (bounded to the worker count); combined tasks
//! are async tasks awaiting the two operand join handles.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::{JoinError, JoinHandle};

use crate::error::{Error, Result};

use super::context::run_guarded;
use super::substrate::TaskSubstrate;

fn flatten<T>(joined: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(Error::TaskPanicked(e.to_string())),
        Err(e) => Err(Error::Execution(format!("task cancelled: {}", e))),
    }
}

/// Async worker threads per runtime. They only await join handles, so the
/// count does not grow with the blocking pool.
const ASYNC_WORKERS: usize = 2;

/// Substrate running tasks on a dedicated tokio runtime.
pub struct TokioPool {
    runtime: Option<Runtime>,
    workers: usize,
}

impl TokioPool {
    /// Build a runtime with `threads` blocking workers.
    ///
    /// Defaults to the host's available parallelism.
    pub fn new(threads: Option<usize>, label: Option<&str>) -> Result<Self> {
        let workers = match threads {
            Some(0) => {
                return Err(Error::Configuration(
                    "max_threads must be a positive integer".to_string(),
                ));
            }
            Some(n) => n,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(super::DEFAULT_NPARTITIONS),
        };

        let label = label.unwrap_or("rdist-worker").to_string();
        let next_id = AtomicUsize::new(0);
        let runtime = Builder::new_multi_thread()
            .worker_threads(ASYNC_WORKERS.min(workers))
            .max_blocking_threads(workers)
            .thread_name_fn(move || format!("{}-{}", label, next_id.fetch_add(1, Ordering::Relaxed)))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build tokio runtime: {}", e)))?;

        tracing::debug!("Started tokio runtime with {} blocking workers", workers);
        Ok(Self {
            runtime: Some(runtime),
            workers,
        })
    }

    fn runtime(&self) -> Result<&Runtime> {
        self.runtime
            .as_ref()
            .ok_or_else(|| Error::Execution("tokio runtime has been shut down".to_string()))
    }

    /// Shut the runtime down without waiting for running tasks.
    pub fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl TaskSubstrate for TokioPool {
    type Future<T: Send + 'static> = Result<JoinHandle<Result<T>>>;

    fn name(&self) -> &'static str {
        "tokio"
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.workers)
    }

    fn submit<T, F>(&self, task: F) -> Result<JoinHandle<Result<T>>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Ok(self.runtime()?.spawn_blocking(move || run_guarded(task)))
    }

    fn combine<T, F>(
        &self,
        left: Result<JoinHandle<Result<T>>>,
        right: Result<JoinHandle<Result<T>>>,
        task: F,
    ) -> Result<JoinHandle<Result<T>>>
    where
        T: Send + 'static,
        F: FnOnce(T, T) -> Result<T> + Send + 'static,
    {
        let (left, right) = (left?, right?);
        Ok(self.runtime()?.spawn(async move {
            let l = flatten(left.await)?;
            let r = flatten(right.await)?;
            flatten(tokio::task::spawn_blocking(move || run_guarded(|| task(l, r))).await)
        }))
    }

    fn wait<T: Send + 'static>(&self, future: Result<JoinHandle<Result<T>>>) -> Result<T> {
        if Handle::try_current().is_ok() {
            return Err(Error::Execution(
                "cannot block on a distributed computation from inside an async runtime".to_string(),
            ));
        }
        let handle = future?;
        flatten(self.runtime()?.block_on(handle))
    }
}

impl Drop for TokioPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
