//! Distributed execution core for rdist.
//!
//! This crate provides:
//! - Range partitioning of entry counts and file collections
//! - Local and distributed backends with an ordered map/merge-reduce
//! - Operation classification per execution mode
//! - Artifact registration, driver-side loading and worker staging
//! - The `Session` entry point tying them together

pub mod backend;
pub mod distribute;
pub mod environment;
pub mod error;
pub mod ops;
pub mod paths;
pub mod range;
pub mod registry;
pub mod session;

pub use backend::{
    AnyBackend, Backend, BackendConfig, BackendName, Computation, DEFAULT_NPARTITIONS,
    Distributed, DistributedBackend, ExecutorKind, ExecutorParameters, LocalBackend, MapReduce,
    PoolFuture, RayonPool, TaskContext, TaskSubstrate, TokioPool,
};
pub use distribute::FileStager;
pub use environment::{ExecutionEnvironment, NativeEnvironment};
pub use error::{Error, Result};
pub use ops::{ExecutionMode, OperationClassifier, OperationKind, OperationSpec};
pub use paths::IntoPathList;
pub use range::{DataSource, FileEntries, FileSpan, Range};
pub use registry::{Artifact, ArtifactKind, ArtifactRegistry, InitializationTask};
pub use session::Session;
