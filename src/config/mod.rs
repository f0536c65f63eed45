//! Configuration management for the bundle framework
//!
//! Handles configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Framework configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// Bundle content storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Start level assigned to newly installed bundles
    #[serde(default = "default_start_level")]
    pub initial_bundle_start_level: u32,

    /// Start level the framework runs at
    #[serde(default = "default_start_level")]
    pub framework_start_level: u32,

    /// Logging configuration
    pub logging: Option<LoggingConfig>,

    /// Default bound for waits on state transitions (seconds)
    #[serde(default = "default_transition_timeout_secs")]
    pub transition_timeout_secs: u64,

    /// Bundles installed (and optionally started) by `Framework::bootstrap`
    #[serde(default)]
    pub bootstrap: Vec<BootstrapBundle>,

    /// Framework properties visible to bundles
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

fn default_start_level() -> u32 {
    1
}

fn default_transition_timeout_secs() -> u64 {
    5
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            initial_bundle_start_level: 1,
            framework_start_level: 1,
            logging: None,
            transition_timeout_secs: 5,
            bootstrap: Vec::new(),
            properties: HashMap::new(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend selection
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,

    /// Root directory for the directory backend
    #[serde(default = "default_storage_path")]
    pub data_dir: String,
}

/// Storage backend configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Keep bundle content in memory (default)
    Memory,
    /// One directory per revision under `data_dir`
    Directory,
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Memory
}

fn default_storage_path() -> String {
    "data/bundles".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: "data/bundles".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "bllvm_framework=debug"); RUST_LOG wins
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Bundle installed at bootstrap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapBundle {
    /// Location the bundle is registered under
    pub location: String,

    /// Manifest file or bundle directory; defaults to the location
    pub path: Option<PathBuf>,

    /// Start the bundle after installing it
    #[serde(default)]
    pub start: bool,
}

impl FrameworkConfig {
    /// Load config from JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FrameworkConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn transition_timeout(&self) -> Duration {
        Duration::from_secs(self.transition_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.initial_bundle_start_level == 0 {
            return Err(anyhow::anyhow!(
                "initial_bundle_start_level must be greater than 0 (level 0 is reserved for the framework)"
            ));
        }

        if self.transition_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "transition_timeout_secs must be greater than 0"
            ));
        }

        if self.storage.backend == StorageBackend::Directory && self.storage.data_dir.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "storage.data_dir is required for the directory backend"
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for bundle in &self.bootstrap {
            if bundle.location.trim().is_empty() {
                return Err(anyhow::anyhow!("bootstrap bundle location cannot be empty"));
            }
            if !seen.insert(bundle.location.as_str()) {
                return Err(anyhow::anyhow!(
                    "bootstrap bundle {} listed more than once",
                    bundle.location
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: FrameworkConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.initial_bundle_start_level, 1);
        assert_eq!(config.framework_start_level, 1);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.transition_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("framework.json");

        let mut config = FrameworkConfig::default();
        config.storage.backend = StorageBackend::Directory;
        config.properties.insert("org.example.mode".to_string(), "test".to_string());
        config.bootstrap.push(BootstrapBundle {
            location: "file:bundles/api".to_string(),
            path: None,
            start: true,
        });
        config.to_json_file(&path).unwrap();

        let loaded = FrameworkConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded.storage.backend, StorageBackend::Directory);
        assert_eq!(loaded.bootstrap.len(), 1);
        assert!(loaded.bootstrap[0].start);
        assert_eq!(loaded.properties["org.example.mode"], "test");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = FrameworkConfig::default();
        config.initial_bundle_start_level = 0;
        assert!(config.validate().is_err());

        let mut config = FrameworkConfig::default();
        let bundle = BootstrapBundle {
            location: "a".to_string(),
            path: None,
            start: false,
        };
        config.bootstrap = vec![bundle.clone(), bundle];
        assert!(config.validate().is_err());
    }
}
