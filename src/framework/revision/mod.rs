//! Revisions
//!
//! A revision is an immutable snapshot of one bundle's content and
//! metadata. Revisions live in an arena indexed by `RevisionId`; bundles
//! refer to them by id only.

pub mod store;

use bytes::Bytes;
use std::fmt;

use crate::framework::deployment::BundleMetadata;
use crate::framework::resolver::{Capability, Requirement, Version};
use crate::framework::storage::StorageState;
use crate::framework::traits::{BundleId, RevisionId};

/// Immutable content and metadata snapshot
#[derive(Debug)]
pub struct Revision {
    id: RevisionId,
    bundle: BundleId,
    /// Sequence within the owning bundle, 0 for the install revision
    sequence: u32,
    metadata: BundleMetadata,
    capabilities: Vec<Capability>,
    storage: StorageState,
    content: Bytes,
}

impl Revision {
    pub(crate) fn new(
        id: RevisionId,
        bundle: BundleId,
        sequence: u32,
        metadata: BundleMetadata,
        storage: StorageState,
        content: Bytes,
    ) -> Self {
        let capabilities = metadata.capabilities();
        Self {
            id,
            bundle,
            sequence,
            metadata,
            capabilities,
            storage,
            content,
        }
    }

    pub fn id(&self) -> RevisionId {
        self.id
    }

    pub fn bundle(&self) -> BundleId {
        self.bundle
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn metadata(&self) -> &BundleMetadata {
        &self.metadata
    }

    pub fn symbolic_name(&self) -> &str {
        &self.metadata.symbolic_name
    }

    pub fn version(&self) -> &Version {
        &self.metadata.version
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn requirements(&self) -> &[Requirement] {
        self.metadata.requirements()
    }

    pub fn storage(&self) -> &StorageState {
        &self.storage
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Capabilities matching a requirement, in declaration order
    pub fn matching<'a>(
        &'a self,
        requirement: &'a Requirement,
    ) -> impl Iterator<Item = &'a Capability> + 'a {
        self.capabilities
            .iter()
            .filter(move |cap| requirement.matches(cap))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] ({})",
            self.metadata.identifier(),
            self.bundle,
            self.id
        )
    }
}

pub use store::RevisionStore;
