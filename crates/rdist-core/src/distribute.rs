//! Artifact staging for distributed backends.
//!
//! Every distributed backend owns a staging directory that its workers read
//! distributed files from. Each artifact is copied there exactly once, under
//! its file name.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::registry::Artifact;

fn lock_error<T>(e: PoisonError<T>) -> Error {
    Error::Execution(format!("Stager lock poisoned (thread panicked): {}", e))
}

#[derive(Debug, Default)]
struct StagerState {
    /// Staged file name -> canonical source path.
    staged: BTreeMap<String, PathBuf>,
    /// Artifact paths as registered, once their file is staged.
    pushed: BTreeSet<PathBuf>,
}

/// Copies artifacts into a worker staging directory.
#[derive(Debug)]
pub struct FileStager {
    dir: PathBuf,
    /// Remove `dir` on drop (only when we created it).
    owned: bool,
    state: Mutex<StagerState>,
}

impl FileStager {
    /// Stage into `dir`, creating it if needed. The directory is kept on drop.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            owned: false,
            state: Mutex::new(StagerState::default()),
        })
    }

    /// Stage into a fresh directory under the system temp dir, removed on drop.
    pub fn temporary() -> Result<Self> {
        let dir = std::env::temp_dir().join(format!("rdist-{}", uuid::Uuid::new_v4()));
        let mut stager = Self::new(dir)?;
        stager.owned = true;
        Ok(stager)
    }

    /// The staging directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy every artifact that is not staged yet.
    ///
    /// Returns how many files were copied. Artifacts pushed before are
    /// skipped without touching their source, so a source removed after
    /// staging stays available to workers. A different source with the same
    /// file name is an [`Error::ArtifactConflict`], and then nothing from
    /// the batch is copied.
    pub fn push(&self, artifacts: &[Artifact]) -> Result<usize> {
        let mut state = self.state.lock().map_err(lock_error)?;

        let mut pending: BTreeMap<String, (PathBuf, &Artifact)> = BTreeMap::new();
        let mut accepted: Vec<&Path> = Vec::new();
        for artifact in artifacts {
            if state.pushed.contains(&artifact.path) {
                continue;
            }
            let source = artifact
                .path
                .canonicalize()
                .map_err(|e| Error::distribution_io(&artifact.path, e))?;
            let name = source
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::distribution_io(
                        &artifact.path,
                        io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
                    )
                })?;

            let existing = state
                .staged
                .get(&name)
                .or_else(|| pending.get(&name).map(|(s, _)| s))
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
                    pending.insert(name, (source, artifact));
                }
            }
            accepted.push(&artifact.path);
        }

        let mut copied = 0;
        for (name, (source, artifact)) in pending {
            let target = self.dir.join(&name);
            fs::copy(&source, &target).map_err(|e| Error::distribution_io(&source, e))?;
            tracing::debug!(
                "Staged {:?} {} -> {}",
                artifact.kind,
                source.display(),
                target.display()
            );
            state.staged.insert(name, source);
            copied += 1;
        }
        state.pushed.extend(accepted.into_iter().map(Path::to_path_buf));

        Ok(copied)
    }

    /// Whether `path` has been staged.
    pub fn is_staged(&self, path: &Path) -> Result<bool> {
        let Ok(source) = path.canonicalize() else {
            return Ok(false);
        };
        Ok(self
            .state
            .lock()
            .map_err(lock_error)?
            .staged
            .values()
            .any(|s| *s == source))
    }

    /// Number of staged files.
    pub fn len(&self) -> Result<usize> {
        Ok(self.state.lock().map_err(lock_error)?.staged.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Drop for FileStager {
    fn drop(&mut self) {
        if self.owned && self.dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.dir) {
                tracing::warn!("Failed to remove staging dir {}: {}", self.dir.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ArtifactKind;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_push_copies_once() {
        let src = TempDir::new().unwrap();
        let stage = TempDir::new().unwrap();
        let file = write(src.path(), "calib.txt", "42");

        let stager = FileStager::new(stage.path()).unwrap();
        let artifact = Artifact::new(ArtifactKind::GenericFile, &file);

        assert_eq!(stager.push(&[artifact.clone()]).unwrap(), 1);
        assert_eq!(stager.push(&[artifact]).unwrap(), 0);
        assert_eq!(stager.len().unwrap(), 1);
        assert_eq!(fs::read_to_string(stage.path().join("calib.txt")).unwrap(), "42");
        assert!(stager.is_staged(&file).unwrap());
    }

    #[test]
    fn test_name_conflict() {
        let src = TempDir::new().unwrap();
        let stage = TempDir::new().unwrap();
        let a = write(src.path(), "one/data.txt", "a");
        let b = write(src.path(), "two/data.txt", "b");

        let stager = FileStager::new(stage.path()).unwrap();
        stager
            .push(&[Artifact::new(ArtifactKind::GenericFile, &a)])
            .unwrap();
        let result = stager.push(&[Artifact::new(ArtifactKind::GenericFile, &b)]);

        assert!(matches!(result, Err(Error::ArtifactConflict { name, .. }) if name == "data.txt"));
        assert_eq!(fs::read_to_string(stage.path().join("data.txt")).unwrap(), "a");
    }

    #[test]
    fn test_staged_artifact_outlives_its_source() {
        let src = TempDir::new().unwrap();
        let stage = TempDir::new().unwrap();
        let file = write(src.path(), "calib.txt", "42");
        let artifact = Artifact::new(ArtifactKind::GenericFile, &file);

        let stager = FileStager::new(stage.path()).unwrap();
        assert_eq!(stager.push(&[artifact.clone()]).unwrap(), 1);

        fs::remove_file(&file).unwrap();
        assert_eq!(stager.push(&[artifact]).unwrap(), 0);
        assert_eq!(fs::read_to_string(stage.path().join("calib.txt")).unwrap(), "42");
    }

    #[test]
    fn test_conflict_within_batch_copies_nothing() {
        let src = TempDir::new().unwrap();
        let stage = TempDir::new().unwrap();
        let a = write(src.path(), "a/config.h", "a");
        let b = write(src.path(), "b/config.h", "b");

        let stager = FileStager::new(stage.path()).unwrap();
        let result = stager.push(&[
            Artifact::new(ArtifactKind::Header, &a),
            Artifact::new(ArtifactKind::Header, &b),
        ]);

        assert!(matches!(result, Err(Error::ArtifactConflict { name, .. }) if name == "config.h"));
        assert!(stager.is_empty().unwrap());
        assert!(!stage.path().join("config.h").exists());
    }

    #[test]
    fn test_missing_source() {
        let stage = TempDir::new().unwrap();
        let stager = FileStager::new(stage.path()).unwrap();
        let result = stager.push(&[Artifact::new(ArtifactKind::Header, "/nonexistent/rdist/x.h")]);
        assert!(matches!(result, Err(Error::DistributionIo { .. })));
    }

    #[test]
    fn test_temporary_removed_on_drop() {
        let stager = FileStager::temporary().unwrap();
        let dir = stager.dir().to_path_buf();
        assert!(dir.exists());
        drop(stager);
        assert!(!dir.exists());
    }
}
