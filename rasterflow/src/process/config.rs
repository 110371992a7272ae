//! Configuration for process managers.

use crate::errors::RasterflowError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding [`ProcessManagerConfig::dot_path`].
/// An empty value disables the dump.
pub const ENV_DOT_PATH: &str = "RASTERFLOW_DOT_PATH";
/// Environment variable overriding [`ProcessManagerConfig::timeout_ms`].
pub const ENV_TIMEOUT_MS: &str = "RASTERFLOW_TIMEOUT_MS";
/// Environment variable overriding [`ProcessManagerConfig::max_parallel_tasks`].
pub const ENV_MAX_PARALLEL: &str = "RASTERFLOW_MAX_PARALLEL";

/// Configuration for a [`RasterProcessManager`](super::RasterProcessManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessManagerConfig {
    /// Name of the task graph.
    #[serde(default = "default_name")]
    pub name: String,
    /// Where `init` writes the dot dump. `None` disables it.
    #[serde(default = "default_dot_path")]
    pub dot_path: Option<PathBuf>,
    /// Run budget; on expiry the run is cancelled.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Upper bound on task bodies running at once.
    #[serde(default)]
    pub max_parallel_tasks: Option<usize>,
}

fn default_name() -> String {
    "raster_process_manager".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_dot_path() -> Option<PathBuf> {
    Some(PathBuf::from("raster_process_manager.dot"))
}

impl Default for ProcessManagerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            dot_path: default_dot_path(),
            timeout_ms: None,
            max_parallel_tasks: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, RasterflowError> {
    value
        .trim()
        .parse()
        .map_err(|_| RasterflowError::Config(format!("{key}: cannot parse '{value}'")))
}

impl ProcessManagerConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, RasterflowError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads defaults overlaid with the `RASTERFLOW_*` environment variables.
    pub fn from_env() -> Result<Self, RasterflowError> {
        Self::default().overlay_env_with(|key| std::env::var(key).ok())
    }

    /// Overlays values found through `lookup` onto this configuration.
    pub fn overlay_env_with<F>(mut self, lookup: F) -> Result<Self, RasterflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DOT_PATH) {
            self.dot_path = if path.trim().is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = Some(parse_var(ENV_TIMEOUT_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_MAX_PARALLEL) {
            self.max_parallel_tasks = Some(parse_var(ENV_MAX_PARALLEL, &value)?);
        }
        self.validate()?;
        Ok(self)
    }

    /// Sets the graph name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the dot dump path.
    #[must_use]
    pub fn with_dot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dot_path = Some(path.into());
        self
    }

    /// Disables the dot dump.
    #[must_use]
    pub fn without_dot_dump(mut self) -> Self {
        self.dot_path = None;
        self
    }

    /// Sets the run budget in milliseconds.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Bounds the number of task bodies running at once.
    #[must_use]
    pub const fn with_max_parallel_tasks(mut self, max: usize) -> Self {
        self.max_parallel_tasks = Some(max);
        self
    }

    /// Gets the run budget as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Checks the configuration for values that can never run.
    pub fn validate(&self) -> Result<(), RasterflowError> {
        if self.max_parallel_tasks == Some(0) {
            return Err(RasterflowError::Config(
                "max_parallel_tasks must be at least 1".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(RasterflowError::Config(
                "timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ProcessManagerConfig::default();
        assert_eq!(config.name, "raster_process_manager");
        assert_eq!(config.dot_path, Some(PathBuf::from("raster_process_manager.dot")));
        assert_eq!(config.timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = ProcessManagerConfig::from_json_str(r#"{"timeout_ms": 250}"#).unwrap();
        assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.name, "raster_process_manager");

        let config = ProcessManagerConfig::from_json_str(r#"{"dot_path": null}"#).unwrap();
        assert_eq!(config.dot_path, None);
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        assert!(matches!(
            ProcessManagerConfig::from_json_str("{not json"),
            Err(RasterflowError::Serialization(_))
        ));
        assert!(matches!(
            ProcessManagerConfig::from_json_str(r#"{"max_parallel_tasks": 0}"#),
            Err(RasterflowError::Config(_))
        ));
    }

    #[test]
    fn test_env_overlay() {
        let config = ProcessManagerConfig::default()
            .overlay_env_with(lookup(&[
                (ENV_DOT_PATH, "/tmp/graph.dot"),
                (ENV_TIMEOUT_MS, "1500"),
                (ENV_MAX_PARALLEL, " 4 "),
            ]))
            .unwrap();
        assert_eq!(config.dot_path, Some(PathBuf::from("/tmp/graph.dot")));
        assert_eq!(config.timeout_ms, Some(1500));
        assert_eq!(config.max_parallel_tasks, Some(4));

        let config = ProcessManagerConfig::default()
            .overlay_env_with(lookup(&[(ENV_DOT_PATH, "")]))
            .unwrap();
        assert_eq!(config.dot_path, None);
    }

    #[test]
    fn test_env_overlay_rejects_garbage() {
        let err = ProcessManagerConfig::default()
            .overlay_env_with(lookup(&[(ENV_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_TIMEOUT_MS));
    }

    #[test]
    fn test_builder_setters() {
        let config = ProcessManagerConfig::new()
            .with_name("cell_7")
            .without_dot_dump()
            .with_timeout_ms(10)
            .with_max_parallel_tasks(2);
        assert_eq!(config.name, "cell_7");
        assert_eq!(config.dot_path, None);
        assert_eq!(config.max_parallel_tasks, Some(2));
    }
}
