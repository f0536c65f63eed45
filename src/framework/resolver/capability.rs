//! Capabilities a revision provides and requirements it declares

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::version::{Version, VersionRange};

/// Namespace for exported packages (the default)
pub const PACKAGE_NAMESPACE: &str = "package";
/// Namespace of the identity capability every revision provides
pub const BUNDLE_NAMESPACE: &str = "bundle";

fn default_namespace() -> String {
    PACKAGE_NAMESPACE.to_string()
}

/// A named, versioned thing a revision exports
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub version: Version,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Capability {
    pub fn package(name: impl Into<String>, version: Version) -> Self {
        Self {
            namespace: PACKAGE_NAMESPACE.to_string(),
            name: name.into(),
            version,
            attributes: BTreeMap::new(),
        }
    }

    pub fn bundle(symbolic_name: impl Into<String>, version: Version) -> Self {
        Self {
            namespace: BUNDLE_NAMESPACE.to_string(),
            name: symbolic_name.into(),
            version,
            attributes: BTreeMap::new(),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{};version={}", self.namespace, self.name, self.version)
    }
}

/// A dependency on some capability
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    #[serde(default, rename = "version")]
    pub range: VersionRange,
    /// Optional requirements wire when possible and never fail resolution
    #[serde(default)]
    pub optional: bool,
    /// Attributes the provider must carry with equal values
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Requirement {
    pub fn package(name: impl Into<String>, range: VersionRange) -> Self {
        Self {
            namespace: PACKAGE_NAMESPACE.to_string(),
            name: name.into(),
            range,
            optional: false,
            attributes: BTreeMap::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn matches(&self, capability: &Capability) -> bool {
        self.namespace == capability.namespace
            && self.name == capability.name
            && self.range.includes(&capability.version)
            && self
                .attributes
                .iter()
                .all(|(k, v)| capability.attributes.get(k) == Some(v))
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{};version={}", self.namespace, self.name, self.range)?;
        if self.optional {
            f.write_str(";optional")?;
        }
        Ok(())
    }
}
