//! Bundle manifest (bundle.toml structure)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::{ActivatorDecl, BundleMetadata};
use crate::framework::resolver::{Capability, Requirement};
use crate::framework::traits::FrameworkError;

/// Name of the manifest file inside a bundle directory
pub const MANIFEST_FILE: &str = "bundle.toml";

/// Bundle manifest as written by bundle authors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub symbolic_name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub description: Option<String>,
    pub start_level: Option<u32>,
    pub activator: Option<ActivatorDecl>,
    #[serde(default, rename = "export")]
    pub exports: Vec<Capability>,
    #[serde(default, rename = "import")]
    pub imports: Vec<Requirement>,
    /// Free-form headers, carried but not interpreted
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

impl BundleManifest {
    pub fn new(symbolic_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            version: version.into(),
            description: None,
            activator: None,
            start_level: None,
            exports: Vec::new(),
            imports: Vec::new(),
            headers: BTreeMap::new(),
        }
    }

    /// Parse a manifest from raw bundle content
    pub fn from_bytes(content: &[u8]) -> Result<Self, FrameworkError> {
        let text = std::str::from_utf8(content).map_err(|e| {
            FrameworkError::InvalidMetadata(format!("Manifest is not valid UTF-8: {}", e))
        })?;
        let manifest: BundleManifest = toml::from_str(text).map_err(|e| {
            FrameworkError::InvalidMetadata(format!("Failed to parse manifest TOML: {}", e))
        })?;

        if manifest.symbolic_name.trim().is_empty() {
            return Err(FrameworkError::InvalidMetadata(
                "Bundle symbolic name cannot be empty".to_string(),
            ));
        }

        Ok(manifest)
    }

    /// Load manifest from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FrameworkError> {
        let contents = std::fs::read(path.as_ref())
            .map_err(|e| FrameworkError::storage("Failed to read manifest file", e))?;
        Self::from_bytes(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, FrameworkError> {
        toml::to_string_pretty(self).map_err(|e| {
            FrameworkError::InvalidMetadata(format!("Failed to serialize manifest: {}", e))
        })
    }

    /// Convert to resolver metadata
    pub fn to_metadata(&self) -> Result<BundleMetadata, FrameworkError> {
        Ok(BundleMetadata {
            symbolic_name: self.symbolic_name.trim().to_string(),
            version: self.version.parse()?,
            description: self.description.clone(),
            activator: self.activator.clone(),
            start_level: self.start_level,
            exports: self.exports.clone(),
            imports: self.imports.clone(),
            headers: self.headers.clone(),
        })
    }
}

impl TryFrom<BundleManifest> for BundleMetadata {
    type Error = FrameworkError;

    fn try_from(manifest: BundleManifest) -> Result<Self, Self::Error> {
        manifest.to_metadata()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::deployment::ActivatorKind;
    use crate::framework::resolver::Version;

    const MANIFEST: &str = r#"
symbolic_name = "org.example.client"
version = "1.2.0"

[activator]
kind = "module"
name = "client-main"

[[export]]
name = "org.example.client.api"
version = "1.2.0"

[[import]]
name = "org.example.api"
version = "[1.0,2.0)"

[[import]]
name = "org.example.tracing"
optional = true
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = BundleManifest::from_bytes(MANIFEST.as_bytes()).unwrap();
        let metadata = manifest.to_metadata().unwrap();

        assert_eq!(metadata.symbolic_name, "org.example.client");
        assert_eq!(metadata.version, Version::new(1, 2, 0));
        let activator = metadata.activator.as_ref().unwrap();
        assert_eq!(activator.kind, ActivatorKind::Module);
        assert_eq!(activator.name, "client-main");

        assert_eq!(metadata.exports.len(), 1);
        assert_eq!(metadata.exports[0].namespace, "package");
        assert_eq!(metadata.imports.len(), 2);
        assert!(metadata.imports[1].optional);
        assert!(metadata.imports[0].range.includes(&Version::new(1, 5, 0)));
        assert!(!metadata.imports[0].range.includes(&Version::new(2, 0, 0)));
    }

    #[test]
    fn test_manifest_roundtrip_through_toml() {
        let mut manifest = BundleManifest::new("org.example.api", "1.0.0");
        manifest
            .exports
            .push(Capability::package("org.example.api", Version::new(1, 0, 0)));
        let text = manifest.to_toml_string().unwrap();
        let parsed = BundleManifest::from_bytes(text.as_bytes()).unwrap();
        assert_eq!(parsed.symbolic_name, "org.example.api");
        assert_eq!(parsed.exports, manifest.exports);
    }

    #[test]
    fn test_rejects_empty_name_and_bad_toml() {
        assert!(BundleManifest::from_bytes(b"symbolic_name = \"  \"").is_err());
        assert!(BundleManifest::from_bytes(b"not toml at all [").is_err());
    }
}
