//! Candidate pool and resolution
//!
//! All admission decisions happen under a single resolution lock, so two
//! overlapping resolutions can never make conflicting wiring choices.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

use super::capability::{Capability, Requirement};
use super::wiring::{Wire, WireGraph};
use crate::framework::revision::Revision;
use crate::framework::traits::{ResolutionError, RevisionId, UnsatisfiedRequirement};

/// Outcome of one resolution pass
#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
    /// Newly admitted revisions; providers come in the same or an earlier batch
    pub batches: Vec<Vec<RevisionId>>,
    /// Wires created by this pass
    pub wires: Vec<Wire>,
    /// Revisions that could not be admitted, with the requirement that failed
    pub failed: Vec<UnsatisfiedRequirement>,
}

impl ResolutionReport {
    pub fn resolved(&self) -> impl Iterator<Item = RevisionId> + '_ {
        self.batches.iter().flatten().copied()
    }

    pub fn contains(&self, revision: RevisionId) -> bool {
        self.resolved().any(|id| id == revision)
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty() && self.failed.is_empty()
    }
}

#[derive(Default)]
struct ResolverState {
    /// Every revision the resolver knows, including retired ones
    revisions: BTreeMap<RevisionId, Arc<Revision>>,
    /// Revisions new wires may be created from or to
    candidates: BTreeSet<RevisionId>,
    graph: WireGraph,
}

impl ResolverState {
    /// Revisions that may provide capabilities in this pass
    fn providers<'a>(
        &'a self,
        admitted: &'a BTreeSet<RevisionId>,
    ) -> impl Iterator<Item = &'a Arc<Revision>> + 'a {
        self.candidates
            .iter()
            .filter(move |id| admitted.contains(*id) || self.graph.is_resolved(**id))
            .filter_map(move |id| self.revisions.get(id))
    }

    fn has_provider(&self, requirement: &Requirement, admitted: &BTreeSet<RevisionId>) -> bool {
        self.providers(admitted)
            .any(|rev| rev.matching(requirement).next().is_some())
    }

    /// Highest capability version wins, then the lowest revision id
    fn select_provider(
        &self,
        requirement: &Requirement,
        admitted: &BTreeSet<RevisionId>,
    ) -> Option<(RevisionId, Capability)> {
        let mut best: Option<(RevisionId, &Capability)> = None;
        for rev in self.providers(admitted) {
            for cap in rev.matching(requirement) {
                let better = match best {
                    None => true,
                    Some((best_id, best_cap)) => {
                        cap.version > best_cap.version
                            || (cap.version == best_cap.version && rev.id() < best_id)
                    }
                };
                if better {
                    best = Some((rev.id(), cap));
                }
            }
        }
        best.map(|(id, cap)| (id, cap.clone()))
    }

    /// Unresolved candidates reachable from `roots` through any requirement
    fn work_set(&self, roots: &[RevisionId]) -> BTreeSet<RevisionId> {
        let mut work = BTreeSet::new();
        let mut queue: VecDeque<RevisionId> = roots
            .iter()
            .copied()
            .filter(|id| self.candidates.contains(id) && !self.graph.is_resolved(*id))
            .collect();

        while let Some(id) = queue.pop_front() {
            if !work.insert(id) {
                continue;
            }
            let Some(rev) = self.revisions.get(&id) else {
                continue;
            };
            for requirement in rev.requirements() {
                for candidate in &self.candidates {
                    if work.contains(candidate) || self.graph.is_resolved(*candidate) {
                        continue;
                    }
                    let provides = self
                        .revisions
                        .get(candidate)
                        .map_or(false, |c| c.matching(requirement).next().is_some());
                    if provides {
                        queue.push_back(*candidate);
                    }
                }
            }
        }
        work
    }

    fn resolve(&mut self, roots: &[RevisionId]) -> ResolutionReport {
        let mut admitted = self.work_set(roots);
        if admitted.is_empty() {
            return ResolutionReport::default();
        }
        debug!("Resolving {} candidate revision(s)", admitted.len());

        // Drop revisions with an unsatisfiable mandatory requirement until
        // nothing else changes; each removal can strand its importers.
        let mut failed = Vec::new();
        loop {
            let mut eliminated = Vec::new();
            for id in &admitted {
                let Some(rev) = self.revisions.get(id) else {
                    continue;
                };
                let missing = rev
                    .requirements()
                    .iter()
                    .filter(|req| !req.optional)
                    .find(|req| !self.has_provider(req, &admitted));
                if let Some(requirement) = missing {
                    eliminated.push(UnsatisfiedRequirement {
                        revision: *id,
                        bundle: rev.metadata().identifier(),
                        requirement: requirement.to_string(),
                    });
                }
            }
            if eliminated.is_empty() {
                break;
            }
            for unsatisfied in eliminated {
                debug!(
                    "Excluding {} ({}): missing {}",
                    unsatisfied.bundle, unsatisfied.revision, unsatisfied.requirement
                );
                admitted.remove(&unsatisfied.revision);
                failed.push(unsatisfied);
            }
        }

        // Pick one provider per requirement
        let mut selected: BTreeMap<RevisionId, Vec<Wire>> = BTreeMap::new();
        for id in &admitted {
            let Some(rev) = self.revisions.get(id) else {
                continue;
            };
            let mut wires = Vec::new();
            for requirement in rev.requirements() {
                match self.select_provider(requirement, &admitted) {
                    Some((exporter, capability)) => {
                        debug!("Wiring {} -> {} for {}", id, exporter, requirement);
                        wires.push(Wire {
                            importer: *id,
                            exporter,
                            requirement: requirement.clone(),
                            capability,
                        });
                    }
                    // Only optional requirements survive elimination unmatched
                    None => debug!("Optional requirement {} of {} left unwired", requirement, id),
                }
            }
            selected.insert(*id, wires);
        }

        let batches = admission_batches(&selected);

        let mut report = ResolutionReport {
            batches,
            wires: Vec::new(),
            failed,
        };
        for (importer, wires) in selected {
            report.wires.extend(wires.iter().cloned());
            self.graph.commit(importer, wires);
        }

        info!(
            "Resolution admitted {} revision(s) with {} wire(s), {} failed",
            report.resolved().count(),
            report.wires.len(),
            report.failed.len()
        );
        report
    }
}

/// Kahn's algorithm, one batch per level; a cycle lands in one final batch
fn admission_batches(selected: &BTreeMap<RevisionId, Vec<Wire>>) -> Vec<Vec<RevisionId>> {
    let mut remaining: BTreeMap<RevisionId, BTreeSet<RevisionId>> = selected
        .iter()
        .map(|(importer, wires)| {
            let deps = wires
                .iter()
                .map(|w| w.exporter)
                .filter(|exporter| exporter != importer && selected.contains_key(exporter))
                .collect();
            (*importer, deps)
        })
        .collect();

    let mut batches = Vec::new();
    while !remaining.is_empty() {
        let ready: Vec<RevisionId> = remaining
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| *id)
            .collect();

        if ready.is_empty() {
            debug!("Wiring cycle among {} revision(s)", remaining.len());
            batches.push(remaining.keys().copied().collect());
            break;
        }

        for id in &ready {
            remaining.remove(id);
        }
        for deps in remaining.values_mut() {
            for id in &ready {
                deps.remove(id);
            }
        }
        batches.push(ready);
    }
    batches
}

/// Candidate pool plus wire graph, behind one resolution lock
#[derive(Default)]
pub struct Resolver {
    state: Mutex<ResolverState>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_candidate(&self, revision: Arc<Revision>) {
        let mut state = self.state.lock();
        let id = revision.id();
        state.revisions.insert(id, revision);
        state.candidates.insert(id);
    }

    /// Stop offering a revision to new resolutions; existing wires stay
    pub fn remove_candidate(&self, revision: RevisionId) -> bool {
        self.state.lock().candidates.remove(&revision)
    }

    /// Forget a revision entirely, including wires into it
    ///
    /// Returns the importers that were unresolved because they still
    /// imported from it.
    pub fn remove(&self, revision: RevisionId) -> Vec<RevisionId> {
        let mut state = self.state.lock();
        state.candidates.remove(&revision);
        state.revisions.remove(&revision);
        let stranded = state.graph.remove(revision);
        if !stranded.is_empty() {
            debug!("Removing {} unresolved importer(s) {:?}", revision, stranded);
        }
        stranded
    }

    /// Drop a revision's outgoing wires
    pub fn unresolve(&self, revision: RevisionId) -> Vec<Wire> {
        self.state.lock().graph.unresolve(revision)
    }

    pub fn is_resolved(&self, revision: RevisionId) -> bool {
        self.state.lock().graph.is_resolved(revision)
    }

    pub fn wires(&self, revision: RevisionId) -> Vec<Wire> {
        self.state.lock().graph.wires_from(revision)
    }

    pub fn importers_of(&self, revision: RevisionId) -> Vec<RevisionId> {
        self.state.lock().graph.importers_of(revision)
    }

    /// Importers belonging to a different bundle than the exporter
    pub fn external_importers(&self, revision: RevisionId) -> Vec<RevisionId> {
        let state = self.state.lock();
        let Some(owner) = state.revisions.get(&revision).map(|r| r.bundle()) else {
            return Vec::new();
        };
        state
            .graph
            .importers_of(revision)
            .into_iter()
            .filter(|importer| {
                state
                    .revisions
                    .get(importer)
                    .map_or(true, |r| r.bundle() != owner)
            })
            .collect()
    }

    pub fn wire_count(&self) -> usize {
        self.state.lock().graph.wire_count()
    }

    /// Resolve `roots` and everything they transitively need
    pub fn resolve(&self, roots: &[RevisionId]) -> ResolutionReport {
        self.state.lock().resolve(roots)
    }

    /// Resolve one revision, failing if it could not be admitted
    ///
    /// Already resolved revisions succeed with an empty report.
    pub fn resolve_revision(&self, root: RevisionId) -> Result<ResolutionReport, ResolutionError> {
        let mut state = self.state.lock();
        if state.graph.is_resolved(root) {
            return Ok(ResolutionReport::default());
        }
        if !state.candidates.contains(&root) {
            let bundle = state
                .revisions
                .get(&root)
                .map(|r| r.metadata().identifier())
                .unwrap_or_else(|| root.to_string());
            let unsatisfied = UnsatisfiedRequirement {
                revision: root,
                bundle,
                requirement: format!("revision {} is not a resolution candidate", root),
            };
            return Err(ResolutionError::new(unsatisfied.clone(), vec![unsatisfied]));
        }

        let report = state.resolve(&[root]);
        if report.contains(root) {
            return Ok(report);
        }
        let first = report
            .failed
            .iter()
            .find(|u| u.revision == root)
            .or_else(|| report.failed.first())
            .cloned()
            .unwrap_or_else(|| UnsatisfiedRequirement {
                revision: root,
                bundle: root.to_string(),
                requirement: "unknown".to_string(),
            });
        let admitted = report.resolved().collect();
        let mut err = ResolutionError::new(first, report.failed);
        err.admitted = admitted;
        Err(err)
    }

    /// Resolve every unresolved candidate
    pub fn resolve_all(&self) -> ResolutionReport {
        let mut state = self.state.lock();
        let roots: Vec<RevisionId> = state.candidates.iter().copied().collect();
        state.resolve(&roots)
    }
}
