//! Deployment provider
//!
//! Turns an install/update request (location plus optional content) into a
//! `Deployment` and extracts its metadata.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::manifest::{BundleManifest, MANIFEST_FILE};
use super::{BundleMetadata, Deployment};
use crate::framework::traits::FrameworkError;

/// Abstract deployment/content provider
pub trait DeploymentProvider: Send + Sync {
    /// Build a deployment; `content == None` means fetch from `location`
    fn create_deployment(
        &self,
        location: &str,
        content: Option<Bytes>,
    ) -> Result<Deployment, FrameworkError>;

    /// Extract resolver metadata from a deployment
    fn create_metadata(&self, deployment: &Deployment) -> Result<BundleMetadata, FrameworkError>;
}

/// Default provider: bundle content is a TOML manifest
///
/// Content published under a location wins; otherwise the location is read
/// as a path (`file:` prefix optional). A directory location reads its
/// `bundle.toml`.
#[derive(Default)]
pub struct ManifestDeploymentProvider {
    repository: RwLock<HashMap<String, Bytes>>,
}

impl ManifestDeploymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make content available under `location` for later re-fetches
    pub fn publish(&self, location: impl Into<String>, content: impl Into<Bytes>) {
        self.repository.write().insert(location.into(), content.into());
    }

    pub fn unpublish(&self, location: &str) -> bool {
        self.repository.write().remove(location).is_some()
    }

    fn fetch(&self, location: &str) -> Result<Bytes, FrameworkError> {
        if let Some(content) = self.repository.read().get(location) {
            return Ok(content.clone());
        }

        let path = PathBuf::from(location.strip_prefix("file:").unwrap_or(location));
        let path = if path.is_dir() {
            path.join(MANIFEST_FILE)
        } else {
            path
        };
        debug!("Fetching bundle content for {} from {:?}", location, path);
        read_content(&path)
    }
}

fn read_content(path: &Path) -> Result<Bytes, FrameworkError> {
    std::fs::read(path)
        .map(Bytes::from)
        .map_err(|e| FrameworkError::storage(format!("Cannot read bundle content {:?}", path), e))
}

impl DeploymentProvider for ManifestDeploymentProvider {
    fn create_deployment(
        &self,
        location: &str,
        content: Option<Bytes>,
    ) -> Result<Deployment, FrameworkError> {
        let content = match content {
            Some(content) => content,
            None => self.fetch(location)?,
        };
        Ok(Deployment::new(location, content))
    }

    fn create_metadata(&self, deployment: &Deployment) -> Result<BundleMetadata, FrameworkError> {
        BundleManifest::from_bytes(&deployment.content)?.to_metadata()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_published_content_is_fetched() {
        let provider = ManifestDeploymentProvider::new();
        provider.publish("mem:api", "symbolic_name = \"org.example.api\"\nversion = \"1.0\"");

        let deployment = provider.create_deployment("mem:api", None).unwrap();
        let metadata = provider.create_metadata(&deployment).unwrap();
        assert_eq!(metadata.symbolic_name, "org.example.api");
    }

    #[test]
    fn test_explicit_content_wins() {
        let provider = ManifestDeploymentProvider::new();
        provider.publish("mem:api", "symbolic_name = \"old\"");

        let deployment = provider
            .create_deployment("mem:api", Some(Bytes::from_static(b"symbolic_name = \"new\"")))
            .unwrap();
        let metadata = provider.create_metadata(&deployment).unwrap();
        assert_eq!(metadata.symbolic_name, "new");
    }

    #[test]
    fn test_directory_location_reads_manifest() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            "symbolic_name = \"org.example.disk\"",
        )
        .unwrap();

        let provider = ManifestDeploymentProvider::new();
        let location = format!("file:{}", dir.path().display());
        let deployment = provider.create_deployment(&location, None).unwrap();
        let metadata = provider.create_metadata(&deployment).unwrap();
        assert_eq!(metadata.symbolic_name, "org.example.disk");
    }

    #[test]
    fn test_missing_location_is_storage_error() {
        let provider = ManifestDeploymentProvider::new();
        let err = provider
            .create_deployment("/definitely/not/here/bundle", None)
            .unwrap_err();
        assert!(matches!(err, FrameworkError::Storage { .. }));
    }
}
