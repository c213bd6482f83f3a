//! User-facing session.
//!
//! A [`Session`] owns the artifact registry, the driver-side execution
//! environment and the active backend. Registered artifacts survive backend
//! switches: a newly selected backend stages them before its first run.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::{AnyBackend, Backend, BackendConfig, BackendName, Computation};
use crate::environment::{ExecutionEnvironment, NativeEnvironment};
use crate::error::Result;
use crate::ops::OperationKind;
use crate::paths::{IntoPathList, resolve_paths, split_shared_libraries};
use crate::range::DataSource;
use crate::registry::{Artifact, ArtifactKind, ArtifactRegistry};

/// Entry point for selecting a backend, registering artifacts and running
/// computations.
#[derive(Debug)]
pub struct Session {
    registry: ArtifactRegistry,
    environment: Arc<dyn ExecutionEnvironment>,
    backend: AnyBackend,
}

impl Session {
    /// Session on the local backend with a [`NativeEnvironment`].
    pub fn new() -> Self {
        Self::with_environment(Arc::new(NativeEnvironment::new()))
    }

    /// Session on the local backend with a custom environment.
    pub fn with_environment(environment: Arc<dyn ExecutionEnvironment>) -> Self {
        let registry = ArtifactRegistry::new();
        let backend = AnyBackend::Local(crate::backend::LocalBackend::new(registry.clone()));
        Self {
            registry,
            environment,
            backend,
        }
    }

    /// Replace the active backend.
    ///
    /// On error the previous backend stays active.
    pub fn use_backend(&mut self, name: &str, config: &BackendConfig) -> Result<()> {
        let name: BackendName = name.parse()?;
        let backend = AnyBackend::select(name, config, self.registry.clone())?;
        tracing::info!("Using {} backend", backend.name());
        self.backend = backend;
        Ok(())
    }

    pub fn backend(&self) -> &AnyBackend {
        &self.backend
    }

    pub fn registry(&self) -> &ArtifactRegistry {
        &self.registry
    }

    /// Distribute header files and declare them in the driver.
    ///
    /// Returns the artifacts that were not registered before. A file whose
    /// name is already taken by another registered file is rejected on every
    /// backend, before anything is staged or registered.
    pub fn include_headers(&self, paths: impl IntoPathList) -> Result<Vec<Artifact>> {
        let files: Vec<PathBuf> = resolve_paths(paths)?.into_iter().collect();
        let artifacts = Artifact::many(ArtifactKind::Header, &files);

        self.registry.check_names(&artifacts)?;
        self.backend.distribute_files(&artifacts)?;
        self.environment.declare_headers(&files)?;
        self.registry.register(artifacts)
    }

    /// Distribute shared libraries and load them in the driver.
    ///
    /// Compiled module metadata (`.pcm`) found among the paths is shipped
    /// along with the libraries. Other files are ignored.
    pub fn include_shared_libraries(&self, paths: impl IntoPathList) -> Result<Vec<Artifact>> {
        let (libraries, metadata) = split_shared_libraries(resolve_paths(paths)?);
        let libraries: Vec<PathBuf> = libraries.into_iter().collect();

        let mut artifacts = Artifact::many(ArtifactKind::SharedLibrary, &libraries);
        artifacts.extend(Artifact::many(ArtifactKind::CompiledModuleMetadata, &metadata));

        self.registry.check_names(&artifacts)?;
        self.backend.distribute_files(&artifacts)?;
        self.environment.load_shared_libraries(&libraries)?;
        self.registry.register(artifacts)
    }

    /// Distribute arbitrary files to the workers.
    pub fn send_generic_files(&self, paths: impl IntoPathList) -> Result<Vec<Artifact>> {
        let files: BTreeSet<PathBuf> = resolve_paths(paths)?;
        let artifacts = Artifact::many(ArtifactKind::GenericFile, &files);

        self.registry.check_names(&artifacts)?;
        self.backend.distribute_files(&artifacts)?;
        self.registry.register(artifacts)
    }

    /// Register a procedure every worker runs before its first task.
    ///
    /// It also runs once in the driver, immediately.
    pub fn initialize<F, A>(&self, function: F, args: A) -> Result<()>
    where
        F: Fn(&A) -> Result<()> + Send + Sync + 'static,
        A: Send + Sync + 'static,
    {
        self.backend.submit_initialization(function, args)
    }

    /// Check that `operation` can run on the active backend.
    pub fn check_supported(&self, operation: &str) -> Result<OperationKind> {
        self.backend.check_supported(operation)
    }

    /// Run `computation` over `source` on the active backend.
    pub fn execute<C: Computation>(&self, source: &DataSource, computation: C) -> Result<C::Output> {
        self.backend.execute(source, computation)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
