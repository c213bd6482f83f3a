//! Task context and per-worker bookkeeping.
//!
//! Provides the context handed to every mapper invocation, the once-per-worker
//! initialization guard, and panic capture for task bodies.

use std::any::Any;
use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::registry::InitializationTask;

thread_local! {
    /// Generation of the initialization task this thread has run (0 = none).
    static INITIALIZED: Cell<u64> = const { Cell::new(0) };
}

/// Record that the current thread has run `task`.
pub(crate) fn mark_initialized(task: &InitializationTask) {
    INITIALIZED.with(|g| g.set(task.generation()));
}

/// Run `task` on the current worker unless it already ran this generation.
pub(crate) fn ensure_initialized(task: Option<&InitializationTask>) -> Result<()> {
    let Some(task) = task else {
        return Ok(());
    };
    if INITIALIZED.with(Cell::get) == task.generation() {
        return Ok(());
    }

    tracing::debug!(
        "Running initialization {} on worker {}",
        task.name(),
        current_worker_name()
    );
    task.run()?;
    mark_initialized(task);
    Ok(())
}

/// Run a task body, converting a panic into [`Error::TaskPanicked`].
pub(crate) fn run_guarded<T>(body: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => Err(Error::TaskPanicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn current_worker_name() -> String {
    let thread = std::thread::current();
    thread
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", thread.id()))
}

/// Context for one mapper invocation.
#[derive(Debug, Clone)]
pub struct TaskContext {
    partition: usize,
    worker: String,
    staging_dir: Option<PathBuf>,
}

impl TaskContext {
    /// Context for a task running on a distributed worker.
    pub fn worker(partition: usize, staging_dir: PathBuf) -> Self {
        Self {
            partition,
            worker: current_worker_name(),
            staging_dir: Some(staging_dir),
        }
    }

    /// Context for a task running in the driver process.
    pub fn driver() -> Self {
        Self {
            partition: 0,
            worker: current_worker_name(),
            staging_dir: None,
        }
    }

    /// Index of the range being processed.
    pub fn partition(&self) -> usize {
        self.partition
    }

    /// Name of the worker thread running the task.
    pub fn worker_name(&self) -> &str {
        &self.worker
    }

    /// Directory distributed artifacts are staged in, if any.
    pub fn staging_dir(&self) -> Option<&Path> {
        self.staging_dir.as_deref()
    }

    /// Local path of a distributed file.
    ///
    /// In the driver there is no staging directory and `name` is returned
    /// as given.
    pub fn staged_file(&self, name: &str) -> Option<PathBuf> {
        match &self.staging_dir {
            Some(dir) => {
                let path = dir.join(name);
                path.exists().then_some(path)
            }
            None => Some(PathBuf::from(name)),
        }
    }
}
