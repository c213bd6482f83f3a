//! Single-process backend.

use crate::error::{Error, Result};
use crate::ops::ExecutionMode;
use crate::range::DataSource;
use crate::registry::ArtifactRegistry;

use super::Backend;
use super::computation::Computation;
use super::context::{TaskContext, run_guarded};

/// Runs the mapper once over the whole input in the calling thread.
///
/// Nothing is partitioned or staged: artifacts are already visible to the
/// driver, and the initialization task has run here at registration.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    registry: ArtifactRegistry,
}

impl LocalBackend {
    pub fn new(registry: ArtifactRegistry) -> Self {
        Self { registry }
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> String {
        "local".to_string()
    }

    fn registry(&self) -> &ArtifactRegistry {
        &self.registry
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::SingleWorker
    }

    fn execute<C: Computation>(&self, source: &DataSource, computation: C) -> Result<C::Output> {
        self.check_computation(&computation)?;
        if source.total_entries()? == 0 {
            tracing::debug!("Empty source on local backend");
            return computation.identity().ok_or(Error::EmptyComputation);
        }

        let whole = source.whole()?;
        tracing::info!("Running {} entries on local backend", whole.len());
        run_guarded(|| computation.map(&whole, &TaskContext::driver()))
    }
}
