//! Error types for rdist-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::ops::ExecutionMode;

/// Result type for rdist-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in rdist-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid backend selection or backend configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Backend name reserved for future support.
    #[error("backend '{0}' is not implemented yet")]
    NotImplemented(String),

    /// Operation is known but cannot run in the current execution mode.
    #[error("operation '{operation}' is not supported in {mode} mode")]
    UnsupportedOperation {
        operation: String,
        mode: ExecutionMode,
    },

    /// Operation name is not in the classifier table.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Nothing to compute and the computation defines no neutral result.
    #[error("empty computation: the input has no entries and no identity result is defined")]
    EmptyComputation,

    /// An artifact could not be resolved, read or staged.
    #[error("cannot distribute '{}': {source}", path.display())]
    DistributionIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two different artifacts would be staged under the same file name.
    #[error(
        "artifact name '{name}' already staged from {} (refusing {})",
        existing.display(),
        incoming.display()
    )]
    ArtifactConflict {
        name: String,
        existing: PathBuf,
        incoming: PathBuf,
    },

    /// Failed to load a shared library into the driver process.
    #[error("failed to load library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// The registered initialization task failed.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// A mapper or reducer reported a failure.
    #[error("execution error: {0}")]
    Execution(String),

    /// A mapper or reducer panicked.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// Configuration could not be parsed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short recovery hint for the user, if one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::Configuration(_) => Some(
                "valid backends are 'local' and 'threads'; 'threads' needs an \"executor\" of \"rayon\" or \"tokio\"",
            ),
            Error::NotImplemented(_) => Some("use the 'threads' backend instead"),
            Error::UnsupportedOperation { .. } => {
                Some("run on the local backend or set npartitions to 1")
            }
            Error::UnknownOperation(_) => Some("operation names are case-sensitive, e.g. 'Histo1D'"),
            Error::EmptyComputation => {
                Some("check the input entry count or give the computation an identity value")
            }
            Error::DistributionIo { .. } => Some("check that the path exists and is readable"),
            Error::ArtifactConflict { .. } => Some("rename one of the files before distributing it"),
            _ => None,
        }
    }

    /// Render the error followed by its hint.
    pub fn with_hint(&self) -> String {
        match self.hint() {
            Some(hint) => format!("{}\n  hint: {}", self, hint),
            None => self.to_string(),
        }
    }

    pub(crate) fn distribution_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::DistributionIo {
            path: path.into(),
            source,
        }
    }
}
