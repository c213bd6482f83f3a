//! Rayon thread-pool substrate.
//!
//! Each backend owns a dedicated `rayon::ThreadPool`. Futures are completion
//! slots: a finished task stores its result or hands it to a registered
//! continuation. A combined task is only spawned on the pool once both of its
//! operands have completed, so no pool thread ever blocks on another task.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{Error, Result};

use super::context::run_guarded;
use super::substrate::TaskSubstrate;

type Continuation<T> = Box<dyn FnOnce(Result<T>) + Send>;

enum SlotState<T> {
    Pending,
    Waiting(Continuation<T>),
    Ready(Result<T>),
    Consumed,
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            ready: Condvar::new(),
        }
    }

    // User code never runs while the lock is held, so a poisoned lock still
    // guards a consistent state.
    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, value: Result<T>) {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, SlotState::Consumed) {
            SlotState::Waiting(continuation) => {
                drop(state);
                continuation(value);
            }
            SlotState::Pending => {
                *state = SlotState::Ready(value);
                self.ready.notify_all();
            }
            other => {
                *state = other;
                tracing::error!("Task future completed twice; dropping second result");
            }
        }
    }

    fn on_complete(&self, continuation: Continuation<T>) {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, SlotState::Consumed) {
            SlotState::Ready(value) => {
                drop(state);
                continuation(value);
            }
            SlotState::Pending => *state = SlotState::Waiting(continuation),
            other => {
                *state = other;
                drop(state);
                continuation(Err(Error::Execution(
                    "task future already consumed".to_string(),
                )));
            }
        }
    }

    fn wait(&self) -> Result<T> {
        let mut state = self.lock();
        loop {
            match std::mem::replace(&mut *state, SlotState::Consumed) {
                SlotState::Ready(value) => return value,
                SlotState::Pending => {
                    *state = SlotState::Pending;
                    state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                other => {
                    *state = other;
                    return Err(Error::Execution(
                        "task future already consumed".to_string(),
                    ));
                }
            }
        }
    }
}

/// Eventual result of a task on a [`RayonPool`].
pub struct PoolFuture<T> {
    slot: Arc<Slot<T>>,
}

impl<T> PoolFuture<T> {
    fn pending() -> Self {
        Self {
            slot: Arc::new(Slot::new()),
        }
    }
}

/// Substrate running tasks on a dedicated rayon thread pool.
pub struct RayonPool {
    pool: Arc<ThreadPool>,
}

impl RayonPool {
    /// Build a pool with `threads` workers (rayon's default when `None`).
    pub fn new(threads: Option<usize>, label: Option<&str>) -> Result<Self> {
        let label = label.unwrap_or("rdist-worker").to_string();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.unwrap_or(0))
            .thread_name(move |i| format!("{}-{}", label, i))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build thread pool: {}", e)))?;

        tracing::debug!("Started rayon pool with {} threads", pool.current_num_threads());
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl TaskSubstrate for RayonPool {
    type Future<T: Send + 'static> = PoolFuture<T>;

    fn name(&self) -> &'static str {
        "rayon"
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.threads())
    }

    fn submit<T, F>(&self, task: F) -> PoolFuture<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let future = PoolFuture::pending();
        let slot = future.slot.clone();
        self.pool.spawn(move || slot.complete(run_guarded(task)));
        future
    }

    fn combine<T, F>(&self, left: PoolFuture<T>, right: PoolFuture<T>, task: F) -> PoolFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(T, T) -> Result<T> + Send + 'static,
    {
        let future = PoolFuture::pending();
        let slot = future.slot.clone();
        let pool = self.pool.clone();

        left.slot.on_complete(Box::new(move |left_value| {
            right.slot.on_complete(Box::new(move |right_value| {
                match (left_value, right_value) {
                    (Ok(l), Ok(r)) => {
                        pool.spawn(move || slot.complete(run_guarded(|| task(l, r))));
                    }
                    (Err(e), _) | (_, Err(e)) => slot.complete(Err(e)),
                }
            }));
        }));

        future
    }

    fn wait<T: Send + 'static>(&self, future: PoolFuture<T>) -> Result<T> {
        future.slot.wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_submit_and_wait() {
        let pool = RayonPool::new(Some(2), None).unwrap();
        assert_eq!(pool.capacity(), Some(2));

        let future = pool.submit(|| Ok(21 * 2));
        assert_eq!(pool.wait(future).unwrap(), 42);
    }

    #[test]
    fn test_combine_keeps_operand_order() {
        let pool = RayonPool::new(Some(2), None).unwrap();

        // Left finishes last.
        let left = pool.submit(|| {
            std::thread::sleep(Duration::from_millis(30));
            Ok("left".to_string())
        });
        let right = pool.submit(|| Ok("right".to_string()));
        let joined = pool.combine(left, right, |l, r| Ok(format!("{}+{}", l, r)));

        assert_eq!(pool.wait(joined).unwrap(), "left+right");
    }

    #[test]
    fn test_combine_propagates_error() {
        let pool = RayonPool::new(Some(2), None).unwrap();

        let left = pool.submit(|| Ok(1));
        let right: PoolFuture<i32> = pool.submit(|| Err(Error::Execution("bad range".to_string())));
        let joined = pool.combine(left, right, |_, _| panic!("must not run"));

        assert!(matches!(pool.wait(joined), Err(Error::Execution(msg)) if msg == "bad range"));
    }

    #[test]
    fn test_panic_becomes_error() {
        let pool = RayonPool::new(Some(1), None).unwrap();
        let future: PoolFuture<()> = pool.submit(|| panic!("mapper exploded"));
        assert!(matches!(pool.wait(future), Err(Error::TaskPanicked(_))));
    }

    #[test]
    fn test_single_thread_deep_chain() {
        let pool = RayonPool::new(Some(1), Some("chain")).unwrap();
        let mut acc = pool.submit(|| Ok(0u64));
        for i in 1..=50u64 {
            let next = pool.submit(move || Ok(i));
            acc = pool.combine(acc, next, |a, b| Ok(a + b));
        }
        assert_eq!(pool.wait(acc).unwrap(), 1275);
    }

    #[test]
    fn test_thread_names_use_label() {
        let pool = RayonPool::new(Some(1), Some("calo")).unwrap();
        let future = pool.submit(|| {
            Ok(std::thread::current().name().map(str::to_string))
        });
        assert_eq!(pool.wait(future).unwrap().as_deref(), Some("calo-0"));
    }
}
