//! Process-wide registry of distributable artifacts and the initialization task.
//!
//! The registry is append-only for the lifetime of a session: artifacts are
//! kept with set semantics and never removed. It is a cheap clonable handle,
//! shared by the session and every backend it creates.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};

/// What an artifact is used for on the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    /// Analysis header, also declared in the driver.
    Header,
    /// Shared library, also loaded in the driver.
    SharedLibrary,
    /// Compiled module metadata found next to a shared library.
    CompiledModuleMetadata,
    /// Any other file a worker needs.
    GenericFile,
}

/// A file that must exist on every worker before user code references it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// File name the artifact is staged under, with the path it resolves to.
    ///
    /// Falls back to the path as given when it cannot be resolved.
    pub fn staging_key(&self) -> Option<(String, PathBuf)> {
        let source = self.path.canonicalize().unwrap_or_else(|_| self.path.clone());
        let name = source.file_name()?.to_str()?.to_string();
        Some((name, source))
    }

    /// Build one artifact of `kind` per path.
    pub fn many<'a>(kind: ArtifactKind, paths: impl IntoIterator<Item = &'a PathBuf>) -> Vec<Self> {
        paths.into_iter().map(|p| Self::new(kind, p.clone())).collect()
    }
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

type InitFn = dyn Fn() -> Result<()> + Send + Sync;

/// A procedure every worker runs once before its first mapper invocation.
///
/// The function and its arguments are bound together; each registration
/// gets a process-unique generation so workers can tell a replacement apart
/// from the task they already ran.
#[derive(Clone)]
pub struct InitializationTask {
    name: &'static str,
    generation: u64,
    run: Arc<InitFn>,
}

impl InitializationTask {
    /// Bind `function` to `args`.
    pub fn new<F, A>(function: F, args: A) -> Self
    where
        F: Fn(&A) -> Result<()> + Send + Sync + 'static,
        A: Send + Sync + 'static,
    {
        Self {
            name: std::any::type_name::<F>(),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            run: Arc::new(move || function(&args)),
        }
    }

    /// Type name of the bound function, for logging.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Run the task, mapping any failure to [`Error::Initialization`].
    pub fn run(&self) -> Result<()> {
        (self.run)().map_err(|e| match e {
            Error::Initialization(_) => e,
            other => Error::Initialization(other.to_string()),
        })
    }
}

impl fmt::Debug for InitializationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializationTask")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    artifacts: BTreeSet<Artifact>,
    /// Staging name -> resolved source of every registered artifact.
    names: BTreeMap<String, PathBuf>,
    initialization: Option<InitializationTask>,
}

impl RegistryState {
    /// Staging names `artifacts` would add, or the first name clash with
    /// the registry or within the batch.
    fn new_names(&self, artifacts: &[Artifact]) -> Result<BTreeMap<String, PathBuf>> {
        let mut incoming: BTreeMap<String, PathBuf> = BTreeMap::new();
        for (name, source) in artifacts.iter().filter_map(Artifact::staging_key) {
            let existing = self
                .names
                .get(&name)
                .or_else(|| incoming.get(&name))
                .cloned();
            match existing {
                Some(existing) if existing == source => {}
                Some(existing) => {
                    return Err(Error::ArtifactConflict {
                        name,
                        existing,
                        incoming: source,
                    });
                }
                None => {
                    incoming.insert(name, source);
                }
            }
        }
        Ok(incoming)
    }
}

/// Helper to convert PoisonError to our Error type.
fn lock_error<T>(e: PoisonError<T>) -> Error {
    Error::Execution(format!("Registry lock poisoned (thread panicked): {}", e))
}

/// Shared, append-only registry of artifacts plus the initialization task.
#[derive(Debug, Clone, Default)]
pub struct ArtifactRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

impl ArtifactRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>> {
        self.inner.lock().map_err(lock_error)
    }

    /// Fail with [`Error::ArtifactConflict`] if any of `artifacts` would be
    /// staged under a name already taken by a different file.
    pub fn check_names(&self, artifacts: &[Artifact]) -> Result<()> {
        self.lock()?.new_names(artifacts).map(|_| ())
    }

    /// Record artifacts, returning the ones that were not registered yet.
    ///
    /// A staging name clash rejects the whole batch.
    pub fn register(&self, artifacts: impl IntoIterator<Item = Artifact>) -> Result<Vec<Artifact>> {
        let artifacts: Vec<Artifact> = artifacts.into_iter().collect();
        let mut state = self.lock()?;
        let names = state.new_names(&artifacts)?;
        state.names.extend(names);

        let added: Vec<Artifact> = artifacts
            .into_iter()
            .filter(|a| state.artifacts.insert(a.clone()))
            .collect();

        if !added.is_empty() {
            tracing::debug!("Registered {} new artifacts", added.len());
        }
        Ok(added)
    }

    /// Whether `path` is registered as `kind`.
    pub fn contains(&self, kind: ArtifactKind, path: &Path) -> Result<bool> {
        let state = self.lock()?;
        Ok(state.artifacts.contains(&Artifact::new(kind, path)))
    }

    /// All artifacts, ordered by kind then path.
    pub fn artifacts(&self) -> Result<Vec<Artifact>> {
        Ok(self.lock()?.artifacts.iter().cloned().collect())
    }

    /// Paths registered as `kind`, in sorted order.
    pub fn paths(&self, kind: ArtifactKind) -> Result<Vec<PathBuf>> {
        Ok(self
            .lock()?
            .artifacts
            .iter()
            .filter(|a| a.kind == kind)
            .map(|a| a.path.clone())
            .collect())
    }

    pub fn headers(&self) -> Result<Vec<PathBuf>> {
        self.paths(ArtifactKind::Header)
    }

    pub fn shared_libraries(&self) -> Result<Vec<PathBuf>> {
        self.paths(ArtifactKind::SharedLibrary)
    }

    pub fn files(&self) -> Result<Vec<PathBuf>> {
        self.paths(ArtifactKind::GenericFile)
    }

    /// Number of registered artifacts.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.artifacts.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.artifacts.is_empty())
    }

    /// Replace the initialization task.
    pub fn set_initialization(&self, task: InitializationTask) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(previous) = state.initialization.replace(task) {
            tracing::debug!(
                "Replacing initialization task {} (generation {})",
                previous.name(),
                previous.generation()
            );
        }
        Ok(())
    }

    /// The current initialization task, if any.
    pub fn initialization(&self) -> Result<Option<InitializationTask>> {
        Ok(self.lock()?.initialization.clone())
    }
}
