//! Driver-side execution environment.
//!
//! Headers and shared libraries are declared in the driver process as well as
//! shipped to the workers, so symbols used while building the computation
//! plan resolve locally.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use libloading::Library;

use crate::error::{Error, Result};

/// Hook into the process that builds the computation plan.
pub trait ExecutionEnvironment: Send + Sync {
    /// Make `headers` available to code declared in this process.
    fn declare_headers(&self, headers: &[PathBuf]) -> Result<()>;

    /// Load `libraries` into this process.
    fn load_shared_libraries(&self, libraries: &[PathBuf]) -> Result<()>;
}

impl std::fmt::Debug for dyn ExecutionEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExecutionEnvironment")
    }
}

fn lock_error<T>(e: PoisonError<T>) -> Error {
    Error::Execution(format!("Environment lock poisoned (thread panicked): {}", e))
}

/// Environment backed by the current process.
///
/// Shared libraries are opened with `libloading` and kept loaded until the
/// environment is dropped. Headers are checked for readability and their
/// directories are recorded as include paths.
#[derive(Default)]
pub struct NativeEnvironment {
    headers: Mutex<BTreeSet<PathBuf>>,
    libraries: Mutex<Vec<(PathBuf, Library)>>,
}

impl NativeEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers declared so far.
    pub fn headers(&self) -> Result<Vec<PathBuf>> {
        Ok(self.headers.lock().map_err(lock_error)?.iter().cloned().collect())
    }

    /// Directories containing declared headers.
    pub fn include_dirs(&self) -> Result<BTreeSet<PathBuf>> {
        Ok(self
            .headers
            .lock()
            .map_err(lock_error)?
            .iter()
            .filter_map(|h| h.parent().map(Path::to_path_buf))
            .collect())
    }

    /// Paths of the libraries currently loaded.
    pub fn loaded_libraries(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .libraries
            .lock()
            .map_err(lock_error)?
            .iter()
            .map(|(path, _)| path.clone())
            .collect())
    }

    fn libraries(&self) -> Result<MutexGuard<'_, Vec<(PathBuf, Library)>>> {
        self.libraries.lock().map_err(lock_error)
    }
}

impl ExecutionEnvironment for NativeEnvironment {
    fn declare_headers(&self, headers: &[PathBuf]) -> Result<()> {
        for header in headers {
            File::open(header).map_err(|e| Error::distribution_io(header, e))?;
        }

        let mut declared = self.headers.lock().map_err(lock_error)?;
        for header in headers {
            if declared.insert(header.clone()) {
                tracing::debug!("Declared header {}", header.display());
            }
        }
        Ok(())
    }

    fn load_shared_libraries(&self, libraries: &[PathBuf]) -> Result<()> {
        let mut loaded = self.libraries()?;
        for path in libraries {
            if loaded.iter().any(|(p, _)| p == path) {
                continue;
            }

            // SAFETY: loading runs the library's initializers. Libraries come
            // from the user's own registration calls.
            let library = unsafe { Library::new(path) }?;
            tracing::info!("Loaded shared library {}", path.display());
            loaded.push((path.clone(), library));
        }
        Ok(())
    }
}
