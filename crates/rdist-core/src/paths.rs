//! Path resolution for artifact registration.
//!
//! Registration entry points accept a single path or a collection of paths.
//! Directories are walked recursively and replaced by the files they contain.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Extensions recognised as shared libraries.
pub const SHARED_LIBRARY_EXTENSIONS: &[&str] = &["so", "dll", "dylib"];

/// Extension of compiled module metadata files shipped next to libraries.
pub const MODULE_METADATA_EXTENSION: &str = "pcm";

/// One path or a collection of paths.
///
/// Implemented for single paths (`&str`, `String`, `&Path`, `PathBuf`) and
/// for slices, arrays and vectors of them.
pub trait IntoPathList {
    fn into_path_list(self) -> Vec<PathBuf>;
}

impl IntoPathList for &str {
    fn into_path_list(self) -> Vec<PathBuf> {
        vec![PathBuf::from(self)]
    }
}

impl IntoPathList for String {
    fn into_path_list(self) -> Vec<PathBuf> {
        vec![PathBuf::from(self)]
    }
}

impl IntoPathList for &Path {
    fn into_path_list(self) -> Vec<PathBuf> {
        vec![self.to_path_buf()]
    }
}

impl IntoPathList for PathBuf {
    fn into_path_list(self) -> Vec<PathBuf> {
        vec![self]
    }
}

impl IntoPathList for &PathBuf {
    fn into_path_list(self) -> Vec<PathBuf> {
        vec![self.clone()]
    }
}

impl<P: AsRef<Path>> IntoPathList for Vec<P> {
    fn into_path_list(self) -> Vec<PathBuf> {
        self.iter().map(|p| p.as_ref().to_path_buf()).collect()
    }
}

impl<P: AsRef<Path>> IntoPathList for &[P] {
    fn into_path_list(self) -> Vec<PathBuf> {
        self.iter().map(|p| p.as_ref().to_path_buf()).collect()
    }
}

impl<P: AsRef<Path>, const N: usize> IntoPathList for [P; N] {
    fn into_path_list(self) -> Vec<PathBuf> {
        self.iter().map(|p| p.as_ref().to_path_buf()).collect()
    }
}

/// Resolve one path to the set of files it denotes.
///
/// A file resolves to itself; a directory resolves to every file beneath it.
pub fn resolve_path(path: &Path) -> Result<BTreeSet<PathBuf>> {
    let metadata = path
        .metadata()
        .map_err(|e| Error::distribution_io(path, e))?;

    if metadata.is_file() {
        tracing::debug!("File path retrieved: {}", path.display());
        return Ok(BTreeSet::from([path.to_path_buf()]));
    }

    let mut files = BTreeSet::new();
    for entry in WalkDir::new(path).follow_links(true) {
        let entry = entry.map_err(|e| {
            let failed = e.path().unwrap_or(path).to_path_buf();
            Error::distribution_io(failed, e.into())
        })?;
        if entry.file_type().is_file() {
            files.insert(entry.into_path());
        }
    }

    tracing::debug!("Retrieved {} files from {}", files.len(), path.display());
    Ok(files)
}

/// Resolve every path of a list and merge the results.
pub fn resolve_paths(paths: impl IntoPathList) -> Result<BTreeSet<PathBuf>> {
    let mut files = BTreeSet::new();
    for path in paths.into_path_list() {
        files.extend(resolve_path(&path)?);
    }
    Ok(files)
}

/// Split resolved files into `(shared libraries, module metadata)`.
///
/// Files with any other extension are dropped.
pub fn split_shared_libraries(
    files: BTreeSet<PathBuf>,
) -> (BTreeSet<PathBuf>, BTreeSet<PathBuf>) {
    let mut libraries = BTreeSet::new();
    let mut metadata = BTreeSet::new();

    for file in files {
        match file.extension().and_then(|e| e.to_str()) {
            Some(ext) if SHARED_LIBRARY_EXTENSIONS.contains(&ext) => {
                libraries.insert(file);
            }
            Some(MODULE_METADATA_EXTENSION) => {
                metadata.insert(file);
            }
            _ => {}
        }
    }

    (libraries, metadata)
}
