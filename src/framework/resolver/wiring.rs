//! Wire graph
//!
//! Wires are created atomically per resolution and never mutated; a
//! revision's outgoing wires are only dropped when it is unresolved or
//! torn down.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::capability::{Capability, Requirement};
use crate::framework::traits::RevisionId;

/// Directed edge from an importer to the exporter satisfying one requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wire {
    pub importer: RevisionId,
    pub exporter: RevisionId,
    pub requirement: Requirement,
    pub capability: Capability,
}

/// Resolved revisions and the wires between them
#[derive(Debug, Default)]
pub struct WireGraph {
    resolved: BTreeSet<RevisionId>,
    outgoing: BTreeMap<RevisionId, Vec<Wire>>,
    /// exporter -> importers
    incoming: BTreeMap<RevisionId, BTreeSet<RevisionId>>,
}

impl WireGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self, revision: RevisionId) -> bool {
        self.resolved.contains(&revision)
    }

    pub fn resolved(&self) -> impl Iterator<Item = RevisionId> + '_ {
        self.resolved.iter().copied()
    }

    /// Mark `importer` resolved with the given wires
    pub fn commit(&mut self, importer: RevisionId, wires: Vec<Wire>) {
        for wire in &wires {
            self.incoming
                .entry(wire.exporter)
                .or_default()
                .insert(importer);
        }
        self.outgoing.insert(importer, wires);
        self.resolved.insert(importer);
    }

    /// Drop the outgoing wires of `importer` and mark it unresolved
    ///
    /// Incoming wires are untouched: whoever imports from this revision
    /// keeps doing so until they are unresolved themselves.
    pub fn unresolve(&mut self, importer: RevisionId) -> Vec<Wire> {
        self.resolved.remove(&importer);
        let wires = self.outgoing.remove(&importer).unwrap_or_default();
        for wire in &wires {
            if let Some(importers) = self.incoming.get_mut(&wire.exporter) {
                importers.remove(&importer);
                if importers.is_empty() {
                    self.incoming.remove(&wire.exporter);
                }
            }
        }
        wires
    }

    /// Remove every trace of a revision
    ///
    /// Revisions still importing from it lose their wires too and become
    /// unresolved; their ids are returned.
    pub fn remove(&mut self, revision: RevisionId) -> Vec<RevisionId> {
        self.unresolve(revision);
        let importers: Vec<RevisionId> = self
            .incoming
            .remove(&revision)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for importer in &importers {
            self.unresolve(*importer);
        }
        importers
    }

    pub fn wires_from(&self, importer: RevisionId) -> Vec<Wire> {
        self.outgoing.get(&importer).cloned().unwrap_or_default()
    }

    pub fn importers_of(&self, exporter: RevisionId) -> Vec<RevisionId> {
        self.incoming
            .get(&exporter)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn wire_count(&self) -> usize {
        self.outgoing.values().map(Vec::len).sum()
    }
}
