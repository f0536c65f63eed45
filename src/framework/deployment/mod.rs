//! Deployments and bundle metadata
//!
//! A `Deployment` is the transient descriptor an install or update request
//! produces; it is consumed once to build a revision.

pub mod manifest;
pub mod provider;
pub mod validator;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::framework::resolver::{Capability, Requirement, Version};

pub use manifest::BundleManifest;
pub use provider::{DeploymentProvider, ManifestDeploymentProvider};
pub use validator::{MetadataValidator, ValidationResult};

/// Transient install/update descriptor
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Location the bundle was installed from
    pub location: String,
    /// Root content handle
    pub content: Bytes,
    /// Start level requested by the installer, if any
    pub start_level: Option<u32>,
}

impl Deployment {
    pub fn new(location: impl Into<String>, content: Bytes) -> Self {
        Self {
            location: location.into(),
            content,
            start_level: None,
        }
    }
}

/// Which activation protocol a bundle exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivatorKind {
    /// A `BundleActivator` loaded from the bundle's own content
    Bundle,
    /// A native `ModuleActivator` driven through the bridge
    Module,
}

/// Activation hook declared by a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivatorDecl {
    #[serde(default = "default_activator_kind")]
    pub kind: ActivatorKind,
    pub name: String,
}

fn default_activator_kind() -> ActivatorKind {
    ActivatorKind::Bundle
}

/// Resolver-facing description of one revision's content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMetadata {
    pub symbolic_name: String,
    pub version: Version,
    pub description: Option<String>,
    pub activator: Option<ActivatorDecl>,
    pub start_level: Option<u32>,
    pub exports: Vec<Capability>,
    pub imports: Vec<Requirement>,
    pub headers: BTreeMap<String, String>,
}

impl BundleMetadata {
    pub fn new(symbolic_name: impl Into<String>, version: Version) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            version,
            description: None,
            activator: None,
            start_level: None,
            exports: Vec::new(),
            imports: Vec::new(),
            headers: BTreeMap::new(),
        }
    }

    /// Exported capabilities plus the bundle identity capability
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::with_capacity(self.exports.len() + 1);
        caps.push(Capability::bundle(
            self.symbolic_name.clone(),
            self.version.clone(),
        ));
        caps.extend(self.exports.iter().cloned());
        caps
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.imports
    }

    /// `name:version`, used in log and error messages
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.symbolic_name, self.version)
    }
}
