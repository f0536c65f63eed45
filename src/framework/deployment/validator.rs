//! Bundle metadata validation
//!
//! Checks structure and naming before a revision is built from metadata.

use std::collections::HashSet;
use tracing::{debug, warn};

use super::BundleMetadata;
use crate::framework::traits::FrameworkError;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Metadata is valid
    Valid,
    /// Metadata is invalid with specific errors
    Invalid(Vec<String>),
}

impl ValidationResult {
    pub fn into_result(self, bundle: &str) -> Result<(), FrameworkError> {
        match self {
            ValidationResult::Valid => Ok(()),
            ValidationResult::Invalid(errors) => Err(FrameworkError::InvalidMetadata(format!(
                "{}: {}",
                bundle,
                errors.join("; ")
            ))),
        }
    }
}

/// Metadata validator
pub struct MetadataValidator {
    /// Maximum symbolic name length
    max_name_len: usize,
}

impl MetadataValidator {
    pub fn new() -> Self {
        Self { max_name_len: 255 }
    }

    pub fn validate(&self, metadata: &BundleMetadata) -> ValidationResult {
        let mut errors = Vec::new();

        if !self.is_valid_name(&metadata.symbolic_name) {
            errors.push(format!(
                "Invalid symbolic name: {:?} (must be alphanumeric with dots/dashes/underscores)",
                metadata.symbolic_name
            ));
        }

        if let Some(activator) = &metadata.activator {
            if activator.name.trim().is_empty() {
                errors.push("Activator name cannot be empty".to_string());
            }
        }

        let mut exported = HashSet::new();
        for cap in &metadata.exports {
            if cap.name.trim().is_empty() || cap.namespace.trim().is_empty() {
                errors.push("Exported capability needs a namespace and a name".to_string());
            } else if !exported.insert((&cap.namespace, &cap.name, &cap.version)) {
                errors.push(format!("Duplicate export: {}", cap));
            }
        }

        for req in &metadata.imports {
            if req.name.trim().is_empty() || req.namespace.trim().is_empty() {
                errors.push("Requirement needs a namespace and a name".to_string());
            }
        }

        if errors.is_empty() {
            debug!("Metadata validation passed for bundle: {}", metadata.identifier());
            ValidationResult::Valid
        } else {
            warn!(
                "Metadata validation failed for bundle {}: {:?}",
                metadata.identifier(),
                errors
            );
            ValidationResult::Invalid(errors)
        }
    }

    #[inline]
    fn is_valid_name(&self, name: &str) -> bool {
        if name.is_empty() || name.len() > self.max_name_len {
            return false;
        }

        if !name.chars().next().map_or(false, |c| c.is_alphanumeric()) {
            return false;
        }

        name.chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == '_')
    }
}

impl Default for MetadataValidator {
    fn default() -> Self {
        Self::new()
    }
}
