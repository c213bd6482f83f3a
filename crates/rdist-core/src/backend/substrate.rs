//! Task substrates for distributed backends.
//!
//! A substrate is the only part that differs between distributed backends:
//! it knows how to submit a task, how to chain a task onto two earlier
//! futures, and how to block on a future.

use crate::error::Result;

/// Task-parallel runtime a distributed backend submits work to.
pub trait TaskSubstrate: Send + Sync {
    /// Handle to the eventual result of a submitted task.
    type Future<T: Send + 'static>: Send + 'static;

    /// Short name used in logs and backend names.
    fn name(&self) -> &'static str;

    /// Number of tasks that can run at once, if known.
    fn capacity(&self) -> Option<usize>;

    /// Submit `task` for asynchronous execution.
    fn submit<T, F>(&self, task: F) -> Self::Future<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static;

    /// Submit `task` to run once both `left` and `right` have resolved.
    ///
    /// If either operand fails, the returned future fails with that error
    /// and `task` never runs.
    fn combine<T, F>(&self, left: Self::Future<T>, right: Self::Future<T>, task: F) -> Self::Future<T>
    where
        T: Send + 'static,
        F: FnOnce(T, T) -> Result<T> + Send + 'static;

    /// Block the calling thread until `future` resolves.
    fn wait<T: Send + 'static>(&self, future: Self::Future<T>) -> Result<T>;
}
