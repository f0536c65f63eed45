//! Bundle storage
//!
//! Persists the content of each revision under its own key
//! `<bundle-id>-<revision>`. The framework only talks to the abstract
//! `BundleStorage` interface; two backends are provided.

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{StorageBackend, StorageConfig};
use crate::framework::traits::{BundleId, FrameworkError};
use crate::utils::result_to_option;

/// Name of the content file inside a revision directory
const CONTENT_FILE: &str = "content";
/// Name of the state file inside a revision directory
const STATE_FILE: &str = "state.json";

/// Materialised storage of one revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageState {
    pub bundle: BundleId,
    /// Per-bundle revision sequence number
    pub revision: u32,
    pub location: String,
    pub start_level: u32,
    /// Revision directory (directory backend only)
    #[serde(skip)]
    pub root: Option<PathBuf>,
}

impl StorageState {
    /// Storage key `<bundle-id>-<revision>`
    pub fn key(&self) -> String {
        storage_key(self.bundle, self.revision)
    }
}

pub fn storage_key(bundle: BundleId, revision: u32) -> String {
    format!("{}-{}", bundle, revision)
}

/// Abstract storage interface
pub trait BundleStorage: Send + Sync {
    fn create_storage_state(
        &self,
        bundle: BundleId,
        revision: u32,
        location: &str,
        start_level: u32,
        content: &Bytes,
    ) -> Result<StorageState, FrameworkError>;

    fn delete_storage_state(&self, state: &StorageState) -> Result<(), FrameworkError>;

    /// Read back the content stored for a revision
    fn content(&self, state: &StorageState) -> Result<Bytes, FrameworkError>;

    /// Keys of every stored revision, sorted
    fn keys(&self) -> Vec<String>;
}

/// Build the storage backend selected in config
pub fn create_storage(config: &StorageConfig) -> Result<Box<dyn BundleStorage>, FrameworkError> {
    match config.backend {
        StorageBackend::Memory => Ok(Box::new(InMemoryBundleStorage::new())),
        StorageBackend::Directory => {
            Ok(Box::new(DirectoryBundleStorage::new(&config.data_dir)?))
        }
    }
}

/// Volatile storage; content lives as long as the framework
#[derive(Default)]
pub struct InMemoryBundleStorage {
    entries: Mutex<HashMap<String, (StorageState, Bytes)>>,
}

impl InMemoryBundleStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl BundleStorage for InMemoryBundleStorage {
    fn create_storage_state(
        &self,
        bundle: BundleId,
        revision: u32,
        location: &str,
        start_level: u32,
        content: &Bytes,
    ) -> Result<StorageState, FrameworkError> {
        let state = StorageState {
            bundle,
            revision,
            location: location.to_string(),
            start_level,
            root: None,
        };
        self.entries
            .lock()
            .insert(state.key(), (state.clone(), content.clone()));
        Ok(state)
    }

    fn delete_storage_state(&self, state: &StorageState) -> Result<(), FrameworkError> {
        self.entries.lock().remove(&state.key());
        Ok(())
    }

    fn content(&self, state: &StorageState) -> Result<Bytes, FrameworkError> {
        self.entries
            .lock()
            .get(&state.key())
            .map(|(_, content)| content.clone())
            .ok_or_else(|| {
                FrameworkError::storage(
                    format!("No stored content for {}", state.key()),
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                )
            })
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// One directory per revision under a data directory
pub struct DirectoryBundleStorage {
    data_dir: PathBuf,
}

impl DirectoryBundleStorage {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self, FrameworkError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir).map_err(|e| {
            FrameworkError::storage(format!("Cannot create data directory {:?}", data_dir), e)
        })?;
        info!("Bundle storage at {:?}", data_dir);
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn write_state(&self, root: &Path, state: &StorageState, content: &Bytes) -> std::io::Result<()> {
        std::fs::create_dir_all(root)?;
        std::fs::write(root.join(CONTENT_FILE), content)?;
        let json = serde_json::to_vec_pretty(state)?;
        std::fs::write(root.join(STATE_FILE), json)
    }
}

impl BundleStorage for DirectoryBundleStorage {
    fn create_storage_state(
        &self,
        bundle: BundleId,
        revision: u32,
        location: &str,
        start_level: u32,
        content: &Bytes,
    ) -> Result<StorageState, FrameworkError> {
        let key = storage_key(bundle, revision);
        let root = self.data_dir.join(&key);
        let state = StorageState {
            bundle,
            revision,
            location: location.to_string(),
            start_level,
            root: Some(root.clone()),
        };

        if let Err(e) = self.write_state(&root, &state, content) {
            // Best effort; the original error is what matters
            let _ = std::fs::remove_dir_all(&root);
            return Err(FrameworkError::storage(
                format!("Cannot materialise revision {}", key),
                e,
            ));
        }
        debug!("Created storage state {} at {:?}", key, root);
        Ok(state)
    }

    fn delete_storage_state(&self, state: &StorageState) -> Result<(), FrameworkError> {
        let root = state
            .root
            .clone()
            .unwrap_or_else(|| self.data_dir.join(state.key()));
        match std::fs::remove_dir_all(&root) {
            Ok(()) => {
                debug!("Deleted storage state {}", state.key());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FrameworkError::storage(
                format!("Cannot delete revision {}", state.key()),
                e,
            )),
        }
    }

    fn content(&self, state: &StorageState) -> Result<Bytes, FrameworkError> {
        let path = self.data_dir.join(state.key()).join(CONTENT_FILE);
        std::fs::read(&path)
            .map(Bytes::from)
            .map_err(|e| FrameworkError::storage(format!("Cannot read {:?}", path), e))
    }

    fn keys(&self) -> Vec<String> {
        let listing = result_to_option(std::fs::read_dir(&self.data_dir), "Cannot list bundle storage");
        let mut keys: Vec<String> = listing
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.path().join(STATE_FILE).is_file())
                    .filter_map(|entry| entry.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }
}
