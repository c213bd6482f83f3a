//! Map/merge-reduce over a task substrate.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use crate::distribute::FileStager;
use crate::error::{Error, Result};
use crate::ops::ExecutionMode;
use crate::range::DataSource;
use crate::registry::{Artifact, ArtifactRegistry};

use super::computation::Computation;
use super::config::BackendConfig;
use super::context::{TaskContext, ensure_initialized};
use super::substrate::TaskSubstrate;
use super::{Backend, DEFAULT_NPARTITIONS, DistributedBackend};

/// Distributed backend generic over its task substrate.
pub struct Distributed<S: TaskSubstrate> {
    substrate: S,
    registry: ArtifactRegistry,
    stager: FileStager,
    npartitions: usize,
}

impl<S: TaskSubstrate> Distributed<S> {
    /// Create a backend over `substrate`.
    ///
    /// The partition count is the configured `npartitions`, else the
    /// substrate's capacity, else [`DEFAULT_NPARTITIONS`].
    pub fn new(substrate: S, registry: ArtifactRegistry, config: &BackendConfig) -> Result<Self> {
        config.validate()?;
        let npartitions = config
            .npartitions
            .or_else(|| substrate.capacity())
            .unwrap_or(DEFAULT_NPARTITIONS);

        let stager = match &config.staging_dir {
            Some(dir) => FileStager::new(dir)?,
            None => FileStager::temporary()?,
        };

        tracing::debug!(
            "Created {} backend: {} partitions, staging in {}",
            substrate.name(),
            npartitions,
            stager.dir().display()
        );

        Ok(Self {
            substrate,
            registry,
            stager,
            npartitions,
        })
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    /// Stage every registered artifact the workers do not have yet.
    fn sync_registry(&self) -> Result<()> {
        let artifacts = self.registry.artifacts()?;
        let copied = self.stager.push(&artifacts)?;
        if copied > 0 {
            tracing::debug!("Staged {} registered artifacts before execution", copied);
        }
        Ok(())
    }
}

impl<S: TaskSubstrate> Backend for Distributed<S> {
    fn name(&self) -> String {
        format!("threads[{}]", self.substrate.name())
    }

    fn registry(&self) -> &ArtifactRegistry {
        &self.registry
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::for_partitions(self.npartitions)
    }

    fn distribute_files(&self, artifacts: &[Artifact]) -> Result<()> {
        self.stager.push(artifacts)?;
        Ok(())
    }

    fn execute<C: Computation>(&self, source: &DataSource, computation: C) -> Result<C::Output> {
        self.execute_and_merge(source, computation)
    }
}

impl<S: TaskSubstrate> DistributedBackend for Distributed<S> {
    fn npartitions(&self) -> usize {
        self.npartitions
    }

    fn staging_dir(&self) -> &Path {
        self.stager.dir()
    }

    fn execute_and_merge<C: Computation>(
        &self,
        source: &DataSource,
        computation: C,
    ) -> Result<C::Output> {
        self.check_computation(&computation)?;
        let total = source.total_entries()?;
        if total == 0 {
            tracing::debug!("Empty source on {} backend", self.name());
            return computation.identity().ok_or(Error::EmptyComputation);
        }

        self.sync_registry()?;
        let ranges = self.partition(source)?;
        let initialization = self.registry.initialization()?;
        let computation = Arc::new(computation);
        let staging_dir = self.stager.dir().to_path_buf();

        tracing::info!(
            "Running {} entries in {} ranges on {} backend",
            total,
            ranges.len(),
            self.name()
        );

        let mut worklist: VecDeque<S::Future<C::Output>> = ranges
            .into_iter()
            .map(|range| {
                let computation = computation.clone();
                let initialization = initialization.clone();
                let staging_dir = staging_dir.clone();
                tracing::debug!("Submitting range {} [{}, {})", range.id, range.start, range.end);
                self.substrate.submit(move || {
                    ensure_initialized(initialization.as_ref())?;
                    let ctx = TaskContext::worker(range.id, staging_dir);
                    computation.map(&range, &ctx)
                })
            })
            .collect();

        // Each pass combines adjacent pairs front to back. A leftover element
        // at the end of a pass moves behind the pass's results, so the left
        // operand always covers earlier ranges.
        let mut remaining = worklist.len();
        while worklist.len() > 1 {
            if remaining == 0 {
                remaining = worklist.len();
            }
            if remaining == 1 {
                if let Some(carried) = worklist.pop_front() {
                    worklist.push_back(carried);
                }
                remaining = 0;
                continue;
            }

            let (Some(left), Some(right)) = (worklist.pop_front(), worklist.pop_front()) else {
                break;
            };
            remaining -= 2;

            let computation = computation.clone();
            worklist.push_back(
                self.substrate
                    .combine(left, right, move |l, r| computation.reduce(l, r)),
            );
        }

        let last = worklist
            .pop_front()
            .ok_or_else(|| Error::Execution("no partial results to merge".to_string()))?;
        self.substrate.wait(last)
    }
}
