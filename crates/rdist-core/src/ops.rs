//! Operation classification.
//!
//! Every analysis operation is either an [`OperationKind::Action`] (triggers
//! computation and yields a value) or an [`OperationKind::Transformation`]
//! (lazily extends the plan). Some operations only make sense against the
//! whole, unpartitioned input and are rejected when more than one worker is
//! active.

use std::fmt;
use std::sync::LazyLock;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// Kind of an analysis operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Action,
    Transformation,
}

/// Whether a backend runs the plan on one worker or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    SingleWorker,
    MultiWorker,
}

impl ExecutionMode {
    /// Mode implied by a partition count.
    pub fn for_partitions(npartitions: usize) -> Self {
        if npartitions > 1 {
            ExecutionMode::MultiWorker
        } else {
            ExecutionMode::SingleWorker
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::SingleWorker => f.pad("single-worker"),
            ExecutionMode::MultiWorker => f.pad("multi-worker"),
        }
    }
}

/// Classification of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub kind: OperationKind,
    /// Safe to run when the input is split across workers.
    pub distributable: bool,
}

impl OperationSpec {
    pub const fn action(distributable: bool) -> Self {
        Self {
            kind: OperationKind::Action,
            distributable,
        }
    }

    pub const fn transformation(distributable: bool) -> Self {
        Self {
            kind: OperationKind::Transformation,
            distributable,
        }
    }
}

const STANDARD_OPERATIONS: &[(&str, OperationSpec)] = &[
    ("Define", OperationSpec::transformation(true)),
    ("Filter", OperationSpec::transformation(true)),
    ("Alias", OperationSpec::transformation(true)),
    // An explicit entry sub-range refers to the whole input.
    ("Range", OperationSpec::transformation(false)),
    ("Histo1D", OperationSpec::action(true)),
    ("Histo2D", OperationSpec::action(true)),
    ("Histo3D", OperationSpec::action(true)),
    ("Profile1D", OperationSpec::action(true)),
    ("Profile2D", OperationSpec::action(true)),
    ("Profile3D", OperationSpec::action(true)),
    ("Count", OperationSpec::action(true)),
    ("Sum", OperationSpec::action(true)),
    ("Min", OperationSpec::action(true)),
    ("Max", OperationSpec::action(true)),
    ("Mean", OperationSpec::action(true)),
    ("StdDev", OperationSpec::action(true)),
    ("Stats", OperationSpec::action(true)),
    ("AsNumpy", OperationSpec::action(true)),
    ("Graph", OperationSpec::action(true)),
    // Ordering across workers is undefined.
    ("Take", OperationSpec::action(false)),
    // Concurrent writers would clobber one output file.
    ("Snapshot", OperationSpec::action(false)),
    ("Foreach", OperationSpec::action(false)),
    ("ForeachSlot", OperationSpec::action(false)),
    ("Reduce", OperationSpec::action(false)),
    ("Aggregate", OperationSpec::action(false)),
];

static STANDARD: LazyLock<OperationClassifier> =
    LazyLock::new(|| OperationClassifier::from_table(STANDARD_OPERATIONS));

/// Table of known operations and their distribution support.
#[derive(Debug, Clone, Default)]
pub struct OperationClassifier {
    table: FxHashMap<String, OperationSpec>,
}

impl OperationClassifier {
    /// Create an empty classifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in operation table shared by all backends.
    pub fn standard() -> &'static OperationClassifier {
        &STANDARD
    }

    fn from_table(table: &[(&str, OperationSpec)]) -> Self {
        Self {
            table: table
                .iter()
                .map(|(name, spec)| (name.to_string(), *spec))
                .collect(),
        }
    }

    /// Add or replace an operation.
    pub fn with_operation(mut self, name: impl Into<String>, spec: OperationSpec) -> Self {
        self.table.insert(name.into(), spec);
        self
    }

    /// Look up an operation without checking the mode.
    pub fn get(&self, operation: &str) -> Option<OperationSpec> {
        self.table.get(operation).copied()
    }

    /// Classify `operation`, rejecting it if it cannot run in `mode`.
    pub fn check_supported(&self, operation: &str, mode: ExecutionMode) -> Result<OperationKind> {
        let spec = self
            .get(operation)
            .ok_or_else(|| Error::UnknownOperation(operation.to_string()))?;

        if mode == ExecutionMode::MultiWorker && !spec.distributable {
            return Err(Error::UnsupportedOperation {
                operation: operation.to_string(),
                mode,
            });
        }

        Ok(spec.kind)
    }

    /// Operation names in sorted order.
    pub fn operations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
