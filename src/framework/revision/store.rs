//! Revision arena

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::Revision;
use crate::framework::deployment::BundleMetadata;
use crate::framework::storage::StorageState;
use crate::framework::traits::{BundleId, RevisionId};

/// Arena of immutable revisions
///
/// Revision ids come from one counter and are never reused. Each bundle
/// also gets its own sequence counter, used for storage keys.
pub struct RevisionStore {
    next_id: AtomicU64,
    revisions: RwLock<BTreeMap<RevisionId, Arc<Revision>>>,
    sequences: Mutex<HashMap<BundleId, u32>>,
}

impl RevisionStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            revisions: RwLock::new(BTreeMap::new()),
            sequences: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve the next sequence number for a bundle
    ///
    /// A reserved number is consumed even if the revision is never built.
    pub fn next_sequence(&self, bundle: BundleId) -> u32 {
        let mut sequences = self.sequences.lock();
        let next = sequences.entry(bundle).or_insert(0);
        let sequence = *next;
        *next += 1;
        sequence
    }

    pub fn create(
        &self,
        bundle: BundleId,
        sequence: u32,
        metadata: BundleMetadata,
        storage: StorageState,
        content: Bytes,
    ) -> Arc<Revision> {
        let id = RevisionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let revision = Arc::new(Revision::new(id, bundle, sequence, metadata, storage, content));
        self.revisions.write().insert(id, Arc::clone(&revision));
        debug!("Created revision {}", revision);
        revision
    }

    pub fn get(&self, id: RevisionId) -> Option<Arc<Revision>> {
        self.revisions.read().get(&id).cloned()
    }

    pub fn remove(&self, id: RevisionId) -> Option<Arc<Revision>> {
        let removed = self.revisions.write().remove(&id);
        if let Some(revision) = &removed {
            debug!("Removed revision {}", revision);
        }
        removed
    }

    /// Every stored revision of a bundle, oldest first
    pub fn revisions_of(&self, bundle: BundleId) -> Vec<Arc<Revision>> {
        self.revisions
            .read()
            .values()
            .filter(|r| r.bundle() == bundle)
            .cloned()
            .collect()
    }

    /// Forget a bundle's sequence counter (bundle ids are never reused)
    pub fn forget_bundle(&self, bundle: BundleId) {
        self.sequences.lock().remove(&bundle);
    }

    pub fn len(&self) -> usize {
        self.revisions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.read().is_empty()
    }
}

impl Default for RevisionStore {
    fn default() -> Self {
        Self::new()
    }
}
