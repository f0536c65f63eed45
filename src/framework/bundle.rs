//! Bundle records
//!
//! A bundle refers to its revisions by id only. All transitions of one
//! bundle are serialized by its reentrant transition lock; the data lock
//! is only held for short reads and writes, never across user code.

use parking_lot::{Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::debug;

use crate::framework::activator::Activator;
use crate::framework::context::BundleContext;
use crate::framework::resolver::Version;
use crate::framework::revision::Revision;
use crate::framework::traits::{BundleId, BundleState, LifecycleError, RevisionId};

pub(crate) struct BundleInner {
    pub symbolic_name: String,
    pub version: Version,
    pub state: BundleState,
    pub current: RevisionId,
    pub latest: RevisionId,
    /// Former current revisions still held open by importers
    pub retired: Vec<RevisionId>,
    pub persistent_start: bool,
    pub start_level: u32,
    pub context: Option<Arc<BundleContext>>,
    /// Chosen at start, reused for the matching stop
    pub activator: Option<Arc<Activator>>,
    pub last_modified: u64,
}

pub struct Bundle {
    id: BundleId,
    location: String,
    transition: ReentrantMutex<()>,
    inner: Mutex<BundleInner>,
    state_tx: watch::Sender<BundleState>,
}

impl Bundle {
    pub(crate) fn new(id: BundleId, location: &str, revision: &Revision, start_level: u32) -> Self {
        let (state_tx, _) = watch::channel(BundleState::Installed);
        Self {
            id,
            location: location.to_string(),
            transition: ReentrantMutex::new(()),
            inner: Mutex::new(BundleInner {
                symbolic_name: revision.symbolic_name().to_string(),
                version: revision.version().clone(),
                state: BundleState::Installed,
                current: revision.id(),
                latest: revision.id(),
                retired: Vec::new(),
                persistent_start: false,
                start_level,
                context: None,
                activator: None,
                last_modified: now(),
            }),
            state_tx,
        }
    }

    pub fn id(&self) -> BundleId {
        self.id
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Per-bundle transition lock, held across hook invocation
    pub(crate) fn lock_transition(&self) -> ReentrantMutexGuard<'_, ()> {
        self.transition.lock()
    }

    pub(crate) fn data(&self) -> MutexGuard<'_, BundleInner> {
        self.inner.lock()
    }

    pub fn state(&self) -> BundleState {
        self.inner.lock().state
    }

    pub fn symbolic_name(&self) -> String {
        self.inner.lock().symbolic_name.clone()
    }

    pub fn current_revision(&self) -> RevisionId {
        self.inner.lock().current
    }

    pub fn latest_revision(&self) -> RevisionId {
        self.inner.lock().latest
    }

    /// Current, latest and retired revision ids, ascending
    pub fn revision_ids(&self) -> Vec<RevisionId> {
        let inner = self.inner.lock();
        let mut ids = inner.retired.clone();
        ids.push(inner.current);
        ids.push(inner.latest);
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn context(&self) -> Option<Arc<BundleContext>> {
        self.inner.lock().context.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BundleState> {
        self.state_tx.subscribe()
    }

    /// Move to `to`; returns the previous state
    pub(crate) fn set_state(&self, to: BundleState) -> Result<BundleState, LifecycleError> {
        let mut inner = self.inner.lock();
        let from = inner.state;
        if !from.can_transition_to(to) {
            return Err(LifecycleError::InvalidTransition {
                bundle: inner.symbolic_name.clone(),
                from,
                to,
            });
        }
        inner.state = to;
        drop(inner);
        self.state_tx.send_replace(to);
        debug!("Bundle {} {} -> {}", self.id, from, to);
        Ok(from)
    }

    /// Move to `to` only if the bundle is currently in `expected`
    pub(crate) fn compare_and_set_state(&self, expected: BundleState, to: BundleState) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != expected || !expected.can_transition_to(to) {
            return false;
        }
        inner.state = to;
        drop(inner);
        self.state_tx.send_replace(to);
        debug!("Bundle {} {} -> {}", self.id, expected, to);
        true
    }

    pub(crate) fn touch(&self) {
        self.inner.lock().last_modified = now();
    }

    pub fn info(&self) -> BundleInfo {
        let inner = self.inner.lock();
        BundleInfo {
            id: self.id,
            location: self.location.clone(),
            symbolic_name: inner.symbolic_name.clone(),
            version: inner.version.to_string(),
            state: inner.state,
            current_revision: inner.current,
            latest_revision: inner.latest,
            persistent_start: inner.persistent_start,
            start_level: inner.start_level,
            last_modified: inner.last_modified,
        }
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Point-in-time copy of a bundle's public state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleInfo {
    pub id: BundleId,
    pub location: String,
    pub symbolic_name: String,
    pub version: String,
    pub state: BundleState,
    pub current_revision: RevisionId,
    pub latest_revision: RevisionId,
    pub persistent_start: bool,
    pub start_level: u32,
    /// Seconds since the epoch of the last install/update
    pub last_modified: u64,
}

/// One revision of a bundle as seen from outside
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionInfo {
    pub id: RevisionId,
    pub sequence: u32,
    pub symbolic_name: String,
    pub version: String,
    pub storage_key: String,
    pub current: bool,
    pub latest: bool,
}
