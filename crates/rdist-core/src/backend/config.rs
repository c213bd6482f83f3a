//! Backend selection and configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Closed set of backend names accepted by [`crate::Session::use_backend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendName {
    Local,
    Threads,
    /// Reserved.
    Spark,
    /// Reserved.
    Dask,
}

impl BackendName {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendName::Local => "local",
            BackendName::Threads => "threads",
            BackendName::Spark => "spark",
            BackendName::Dask => "dask",
        }
    }
}

impl FromStr for BackendName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(BackendName::Local),
            "threads" => Ok(BackendName::Threads),
            "spark" => Ok(BackendName::Spark),
            "dask" => Ok(BackendName::Dask),
            other => Err(Error::Configuration(format!(
                "Incorrect backend environment \"{}\"",
                other
            ))),
        }
    }
}

impl fmt::Display for BackendName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task substrate used by the `threads` backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    Rayon,
    Tokio,
}

impl FromStr for ExecutorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rayon" => Ok(ExecutorKind::Rayon),
            "tokio" => Ok(ExecutorKind::Tokio),
            other => Err(Error::Configuration(format!(
                "unknown executor \"{}\" (expected \"rayon\" or \"tokio\")",
                other
            ))),
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorKind::Rayon => f.write_str("rayon"),
            ExecutorKind::Tokio => f.write_str("tokio"),
        }
    }
}

/// Parameters forwarded to the executor when it is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorParameters {
    /// Worker thread count.
    pub max_threads: Option<usize>,
    /// Prefix for worker thread names.
    pub label: Option<String>,
}

/// Backend configuration mapping.
///
/// ```json
/// {
///   "npartitions": 8,
///   "executor": "rayon",
///   "parameters": { "max_threads": 4 },
///   "staging_dir": "/tmp/rdist-staging"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Explicit partition count, overriding auto-detection.
    pub npartitions: Option<usize>,
    /// Required by the `threads` backend.
    pub executor: Option<ExecutorKind>,
    pub parameters: ExecutorParameters,
    /// Directory artifacts are staged into; a temporary one when unset.
    pub staging_dir: Option<PathBuf>,
    /// Keys that are not recognized. Kept and reported.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BackendConfig {
    /// Empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON mapping.
    pub fn from_json(value: Value) -> Result<Self> {
        if !value.is_object() && !value.is_null() {
            return Err(Error::Configuration(
                "backend configuration must be a mapping".to_string(),
            ));
        }
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        for key in config.extra.keys() {
            tracing::warn!("Ignoring unknown backend configuration key \"{}\"", key);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(s).map_err(|e| Error::Serialization(e.to_string()))?;
        Self::from_json(value)
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn with_npartitions(mut self, npartitions: usize) -> Self {
        self.npartitions = Some(npartitions);
        self
    }

    pub fn with_executor(mut self, executor: ExecutorKind) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.parameters.max_threads = Some(max_threads);
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.npartitions == Some(0) {
            return Err(Error::Configuration(
                "npartitions must be a positive integer".to_string(),
            ));
        }
        if self.parameters.max_threads == Some(0) {
            return Err(Error::Configuration(
                "max_threads must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    /// The executor, required by the `threads` backend.
    pub fn require_executor(&self) -> Result<ExecutorKind> {
        self.executor.ok_or_else(|| {
            Error::Configuration(
                "missing required executor key: the threads backend needs \"executor\"".to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_names() {
        assert_eq!("local".parse::<BackendName>().unwrap(), BackendName::Local);
        assert_eq!("threads".parse::<BackendName>().unwrap(), BackendName::Threads);
        assert_eq!("dask".parse::<BackendName>().unwrap(), BackendName::Dask);

        let err = "Local".parse::<BackendName>().unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("\"Local\"")));
    }

    #[test]
    fn test_from_json() {
        let config = BackendConfig::from_json(json!({
            "npartitions": 8,
            "executor": "tokio",
            "parameters": { "max_threads": 3, "label": "calo" }
        }))
        .unwrap();

        assert_eq!(config.npartitions, Some(8));
        assert_eq!(config.executor, Some(ExecutorKind::Tokio));
        assert_eq!(config.parameters.max_threads, Some(3));
        assert_eq!(config.parameters.label.as_deref(), Some("calo"));
        assert!(config.extra.is_empty());
    }

    #[test]
    fn test_unknown_keys_kept() {
        let config = BackendConfig::from_json(json!({ "scheduler": "tcp://x:8786" })).unwrap();
        assert_eq!(config.extra.get("scheduler"), Some(&json!("tcp://x:8786")));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            BackendConfig::from_json(json!({ "npartitions": 0 })),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            BackendConfig::from_json(json!({ "executor": "mpi" })),
            Err(Error::Serialization(_))
        ));
        assert!(matches!(
            BackendConfig::from_json(json!([1, 2])),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            BackendConfig::from_json_str("{ npartitions"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_null_is_default() {
        assert_eq!(BackendConfig::from_json(Value::Null).unwrap(), BackendConfig::default());
    }

    #[test]
    fn test_require_executor() {
        assert!(matches!(
            BackendConfig::new().require_executor(),
            Err(Error::Configuration(_))
        ));
        assert_eq!(
            BackendConfig::new()
                .with_executor(ExecutorKind::Rayon)
                .require_executor()
                .unwrap(),
            ExecutorKind::Rayon
        );
    }

    #[test]
    fn test_from_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("backend.json");
        std::fs::write(&path, r#"{"executor": "rayon", "npartitions": 2}"#).unwrap();

        let config = BackendConfig::from_file(&path).unwrap();
        assert_eq!(config.npartitions, Some(2));
        assert!(matches!(
            BackendConfig::from_file(temp.path().join("missing.json")),
            Err(Error::Configuration(_))
        ));
    }
}
