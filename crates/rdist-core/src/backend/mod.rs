//! Execution backends.
//!
//! A backend runs a [`Computation`] over a [`DataSource`]. The local backend
//! runs the mapper once in the calling thread; distributed backends split the
//! input into ranges, map every range on a worker and merge the partial
//! results with the reducer.
//!
//! # Backends
//!
//! - **`LocalBackend`** - Single-worker execution in the driver thread.
//! - **`Distributed<RayonPool>`** - Workers are threads of a dedicated rayon pool.
//! - **`Distributed<TokioPool>`** - Workers are blocking threads of a dedicated
//!   tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! Session::execute(source, computation)
//!     │
//!     └── AnyBackend
//!             │
//!             ├── LocalBackend
//!             │       └── computation.map(whole input) → result
//!             │
//!             └── Distributed<S: TaskSubstrate>
//!                     │
//!                     ├── stage registered artifacts (FileStager)
//!                     ├── partition source → ranges
//!                     ├── S::submit(map range) per range, in range order
//!                     ├── worklist fold: S::combine(left, right, reduce)
//!                     └── S::wait(final future) → result
//! ```
//!
//! # Module Structure
//!
//! - `computation` - The `Computation` trait and the `MapReduce` adapter
//! - `config` - Backend names and configuration
//! - `context` - Task context and per-worker initialization
//! - `distributed` - Generic map/merge-reduce backend
//! - `local` - Single-process backend
//! - `rayon_pool` - Rayon thread-pool substrate
//! - `substrate` - The `TaskSubstrate` trait
//! - `tokio_pool` - Tokio runtime substrate

mod computation;
mod config;
mod context;
mod distributed;
mod local;
mod rayon_pool;
mod substrate;
mod tokio_pool;

use std::path::Path;

pub use computation::{Computation, MapReduce};
pub use config::{BackendConfig, BackendName, ExecutorKind, ExecutorParameters};
pub use context::TaskContext;
pub use distributed::Distributed;
pub use local::LocalBackend;
pub use rayon_pool::{PoolFuture, RayonPool};
pub use substrate::TaskSubstrate;
pub use tokio_pool::TokioPool;

use crate::error::{Error, Result};
use crate::ops::{ExecutionMode, OperationClassifier, OperationKind};
use crate::range::{self, DataSource, Range};
use crate::registry::{Artifact, ArtifactRegistry, InitializationTask};

/// Partition count used when neither the configuration nor the substrate
/// provides one.
pub const DEFAULT_NPARTITIONS: usize = 2;

/// Capabilities shared by every backend.
pub trait Backend {
    /// Name used in logs and messages.
    fn name(&self) -> String;

    /// Registry of artifacts and the initialization task.
    fn registry(&self) -> &ArtifactRegistry;

    fn execution_mode(&self) -> ExecutionMode;

    /// Classify `operation` and check it can run in this backend's mode.
    fn check_supported(&self, operation: &str) -> Result<OperationKind> {
        OperationClassifier::standard().check_supported(operation, self.execution_mode())
    }

    /// Run `function(&args)` in the driver now and on every worker before
    /// its first mapper invocation.
    ///
    /// If the driver run fails the error is returned and nothing is
    /// registered. A later registration replaces this one.
    fn submit_initialization<F, A>(&self, function: F, args: A) -> Result<()>
    where
        F: Fn(&A) -> Result<()> + Send + Sync + 'static,
        A: Send + Sync + 'static,
        Self: Sized,
    {
        let task = InitializationTask::new(function, args);
        task.run()?;
        context::mark_initialized(&task);
        self.registry().set_initialization(task)
    }

    /// Check every operation `computation` declares.
    fn check_computation<C: Computation>(&self, computation: &C) -> Result<()>
    where
        Self: Sized,
    {
        for operation in computation.operations() {
            self.check_supported(operation)?;
        }
        Ok(())
    }

    /// Make `artifacts` available to every worker. No-op by default.
    fn distribute_files(&self, artifacts: &[Artifact]) -> Result<()> {
        let _ = artifacts;
        Ok(())
    }

    /// Run `computation` over `source` and return the final result.
    fn execute<C: Computation>(&self, source: &DataSource, computation: C) -> Result<C::Output>
    where
        Self: Sized;
}

/// A backend that partitions its input across workers.
pub trait DistributedBackend: Backend {
    /// Number of ranges the input is split into.
    fn npartitions(&self) -> usize;

    /// Directory workers read distributed artifacts from.
    fn staging_dir(&self) -> &Path;

    /// Split `source` into ranges.
    fn partition(&self, source: &DataSource) -> Result<Vec<Range>> {
        match source {
            DataSource::Entries(total) => range::partition(*total, self.npartitions()),
            DataSource::Files(files) => range::partition_files(files, self.npartitions()),
        }
    }

    /// Map every range on a worker and fold the partial results in range
    /// order.
    fn execute_and_merge<C: Computation>(
        &self,
        source: &DataSource,
        computation: C,
    ) -> Result<C::Output>
    where
        Self: Sized;
}

/// The backend selected for a session.
pub enum AnyBackend {
    Local(LocalBackend),
    Rayon(Distributed<RayonPool>),
    Tokio(Distributed<TokioPool>),
}

impl AnyBackend {
    /// Create the backend `name` sharing `registry`.
    pub fn select(
        name: BackendName,
        config: &BackendConfig,
        registry: ArtifactRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let params = &config.parameters;

        match name {
            BackendName::Local => Ok(AnyBackend::Local(LocalBackend::new(registry))),
            BackendName::Threads => match config.require_executor()? {
                ExecutorKind::Rayon => {
                    let pool = RayonPool::new(params.max_threads, params.label.as_deref())?;
                    Ok(AnyBackend::Rayon(Distributed::new(pool, registry, config)?))
                }
                ExecutorKind::Tokio => {
                    let pool = TokioPool::new(params.max_threads, params.label.as_deref())?;
                    Ok(AnyBackend::Tokio(Distributed::new(pool, registry, config)?))
                }
            },
            BackendName::Spark | BackendName::Dask => Err(Error::NotImplemented(name.to_string())),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, AnyBackend::Local(_))
    }

    /// Partition count, for distributed backends.
    pub fn npartitions(&self) -> Option<usize> {
        match self {
            AnyBackend::Local(_) => None,
            AnyBackend::Rayon(b) => Some(b.npartitions()),
            AnyBackend::Tokio(b) => Some(b.npartitions()),
        }
    }

    /// Staging directory, for distributed backends.
    pub fn staging_dir(&self) -> Option<&Path> {
        match self {
            AnyBackend::Local(_) => None,
            AnyBackend::Rayon(b) => Some(b.staging_dir()),
            AnyBackend::Tokio(b) => Some(b.staging_dir()),
        }
    }
}

impl Backend for AnyBackend {
    fn name(&self) -> String {
        match self {
            AnyBackend::Local(b) => b.name(),
            AnyBackend::Rayon(b) => b.name(),
            AnyBackend::Tokio(b) => b.name(),
        }
    }

    fn registry(&self) -> &ArtifactRegistry {
        match self {
            AnyBackend::Local(b) => b.registry(),
            AnyBackend::Rayon(b) => b.registry(),
            AnyBackend::Tokio(b) => b.registry(),
        }
    }

    fn execution_mode(&self) -> ExecutionMode {
        match self {
            AnyBackend::Local(b) => b.execution_mode(),
            AnyBackend::Rayon(b) => b.execution_mode(),
            AnyBackend::Tokio(b) => b.execution_mode(),
        }
    }

    fn distribute_files(&self, artifacts: &[Artifact]) -> Result<()> {
        match self {
            AnyBackend::Local(b) => b.distribute_files(artifacts),
            AnyBackend::Rayon(b) => b.distribute_files(artifacts),
            AnyBackend::Tokio(b) => b.distribute_files(artifacts),
        }
    }

    fn execute<C: Computation>(&self, source: &DataSource, computation: C) -> Result<C::Output> {
        match self {
            AnyBackend::Local(b) => b.execute(source, computation),
            AnyBackend::Rayon(b) => b.execute(source, computation),
            AnyBackend::Tokio(b) => b.execute(source, computation),
        }
    }
}

impl std::fmt::Debug for AnyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyBackend")
            .field("name", &self.name())
            .field("mode", &self.execution_mode())
            .finish()
    }
}
