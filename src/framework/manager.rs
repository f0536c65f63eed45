//! Framework (bundle manager)
//!
//! Owns the bundle registry, the revision arena, the resolver and the
//! event notifier. Handles install, lookups, refresh of bundle sets,
//! start levels and shutdown; per-bundle transitions live in `lifecycle`.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::FrameworkConfig;
use crate::framework::activator::{ActivatorLoader, ActivatorRegistry};
use crate::framework::api::{
    BundleEventKind, BundleListener, FrameworkEventKind, FrameworkEvents, FrameworkListener,
    ListenerId, ServiceRegistry,
};
use crate::framework::bundle::{Bundle, BundleInfo, RevisionInfo};
use crate::framework::context::BundleContext;
use crate::framework::deployment::manifest::MANIFEST_FILE;
use crate::framework::deployment::{
    Deployment, DeploymentProvider, ManifestDeploymentProvider, MetadataValidator,
};
use crate::framework::resolver::{ResolutionReport, Resolver, Wire};
use crate::framework::revision::{Revision, RevisionStore};
use crate::framework::storage::{create_storage, BundleStorage};
use crate::framework::traits::{
    BundleId, BundleState, FrameworkError, RevisionId, StartOptions,
};
use crate::framework::weaving::{WeavingHooks, WovenClass};
use crate::utils::log_error;

#[derive(Default)]
pub(crate) struct Registry {
    pub by_id: BTreeMap<BundleId, Arc<Bundle>>,
    pub by_location: HashMap<String, BundleId>,
}

pub(crate) struct FrameworkInner {
    pub uuid: Uuid,
    pub config: FrameworkConfig,
    pub registry: RwLock<Registry>,
    /// Uninstalled bundles whose revisions are still wired to
    pub removed: Mutex<BTreeMap<BundleId, Arc<Bundle>>>,
    pub next_bundle_id: AtomicU64,
    pub install_lock: Mutex<()>,
    pub revisions: RevisionStore,
    pub resolver: Resolver,
    pub events: FrameworkEvents,
    pub services: Arc<ServiceRegistry>,
    pub weaving: WeavingHooks,
    pub storage: Arc<dyn BundleStorage>,
    pub provider: Arc<dyn DeploymentProvider>,
    pub activators: Arc<dyn ActivatorLoader>,
    pub validator: MetadataValidator,
    pub start_level: AtomicU32,
    pub shut_down: AtomicBool,
    pub system_context: Arc<BundleContext>,
}

/// Builder for `Framework`
pub struct FrameworkBuilder {
    config: FrameworkConfig,
    storage: Option<Arc<dyn BundleStorage>>,
    provider: Option<Arc<dyn DeploymentProvider>>,
    activators: Option<Arc<dyn ActivatorLoader>>,
}

impl FrameworkBuilder {
    pub fn new(config: FrameworkConfig) -> Self {
        Self {
            config,
            storage: None,
            provider: None,
            activators: None,
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn BundleStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn DeploymentProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_activator_loader(mut self, activators: Arc<dyn ActivatorLoader>) -> Self {
        self.activators = Some(activators);
        self
    }

    pub fn build(self) -> Result<Framework, FrameworkError> {
        self.config
            .validate()
            .map_err(|e| FrameworkError::Config(e.to_string()))?;

        let storage = match self.storage {
            Some(storage) => storage,
            None => Arc::from(create_storage(&self.config.storage)?),
        };
        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(ManifestDeploymentProvider::new()));
        let activators = self
            .activators
            .unwrap_or_else(|| Arc::new(ActivatorRegistry::new()));
        let start_level = self.config.framework_start_level;
        let config = self.config;

        let inner = Arc::new_cyclic(|weak| FrameworkInner {
            uuid: Uuid::new_v4(),
            config,
            registry: RwLock::new(Registry::default()),
            removed: Mutex::new(BTreeMap::new()),
            next_bundle_id: AtomicU64::new(1),
            install_lock: Mutex::new(()),
            revisions: RevisionStore::new(),
            resolver: Resolver::new(),
            events: FrameworkEvents::new(),
            services: Arc::new(ServiceRegistry::new()),
            weaving: WeavingHooks::new(),
            storage,
            provider,
            activators,
            validator: MetadataValidator::new(),
            start_level: AtomicU32::new(start_level),
            shut_down: AtomicBool::new(false),
            system_context: Arc::new(BundleContext::new(BundleId::SYSTEM, weak.clone())),
        });
        info!("Framework {} created (start level {})", inner.uuid, start_level);
        Ok(Framework { inner })
    }
}

/// Handle to a running framework; cheap to clone
#[derive(Clone)]
pub struct Framework {
    pub(crate) inner: Arc<FrameworkInner>,
}

impl Framework {
    pub fn new(config: FrameworkConfig) -> Result<Self, FrameworkError> {
        FrameworkBuilder::new(config).build()
    }

    pub fn builder(config: FrameworkConfig) -> FrameworkBuilder {
        FrameworkBuilder::new(config)
    }

    pub(crate) fn from_inner(inner: Arc<FrameworkInner>) -> Self {
        Self { inner }
    }

    pub fn uuid(&self) -> Uuid {
        self.inner.uuid
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.inner.config
    }

    /// Context of the system bundle; valid until shutdown
    pub fn system_context(&self) -> Arc<BundleContext> {
        Arc::clone(&self.inner.system_context)
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.inner.services
    }

    pub fn storage(&self) -> &dyn BundleStorage {
        self.inner.storage.as_ref()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    pub fn add_bundle_listener(&self, listener: Arc<dyn BundleListener>) -> ListenerId {
        self.inner.events.add_bundle_listener(BundleId::SYSTEM, listener)
    }

    pub fn add_framework_listener(&self, listener: Arc<dyn FrameworkListener>) -> ListenerId {
        self.inner
            .events
            .add_framework_listener(BundleId::SYSTEM, listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.events.remove_listener(id)
    }

    // ---- install ----

    /// Install a bundle; `content == None` fetches it from `location`
    ///
    /// Installing an already installed location returns the existing bundle.
    pub fn install(&self, location: &str, content: Option<Bytes>) -> Result<BundleId, FrameworkError> {
        if self.is_shut_down() {
            return Err(FrameworkError::Shutdown);
        }
        // Listeners may install in turn, so the event fires after the lock drops
        let (id, revision) = {
            let _install = self.inner.install_lock.lock();

            if let Some(id) = self.inner.registry.read().by_location.get(location) {
                debug!("Location {} already installed as bundle {}", location, id);
                return Ok(*id);
            }

            let deployment = self.inner.provider.create_deployment(location, content)?;
            let id = BundleId(self.inner.next_bundle_id.fetch_add(1, Ordering::SeqCst));
            let revision = self.build_revision(id, deployment, None)?;
            let start_level = revision.storage().start_level;

            let bundle = Arc::new(Bundle::new(id, location, &revision, start_level));
            self.inner.resolver.add_candidate(Arc::clone(&revision));
            let mut registry = self.inner.registry.write();
            registry.by_location.insert(location.to_string(), id);
            registry.by_id.insert(id, bundle);
            (id, revision)
        };

        self.inner.events.fire_bundle_event(
            BundleEventKind::Installed,
            id,
            revision.symbolic_name(),
            Some(revision.id()),
        );
        info!("Installed bundle {} as {} from {}", revision.metadata().identifier(), id, location);
        Ok(id)
    }

    /// Build, validate and store a new revision; not yet a resolver candidate
    pub(crate) fn build_revision(
        &self,
        bundle: BundleId,
        deployment: Deployment,
        start_level: Option<u32>,
    ) -> Result<Arc<Revision>, FrameworkError> {
        let metadata = self.inner.provider.create_metadata(&deployment)?;
        self.inner
            .validator
            .validate(&metadata)
            .into_result(&deployment.location)?;

        let start_level = start_level
            .or(deployment.start_level)
            .or(metadata.start_level)
            .unwrap_or(self.inner.config.initial_bundle_start_level);
        let sequence = self.inner.revisions.next_sequence(bundle);
        let storage = self.inner.storage.create_storage_state(
            bundle,
            sequence,
            &deployment.location,
            start_level,
            &deployment.content,
        )?;
        Ok(self
            .inner
            .revisions
            .create(bundle, sequence, metadata, storage, deployment.content))
    }

    /// Remove a revision from the resolver, the arena and storage
    pub(crate) fn teardown_revision(&self, revision: RevisionId) {
        for importer in self.inner.resolver.remove(revision) {
            self.strand_importer(importer, revision);
        }
        if let Some(revision) = self.inner.revisions.remove(revision) {
            log_error(
                || self.inner.storage.delete_storage_state(revision.storage()),
                "Failed to delete storage state",
            );
        }
    }

    /// An importer lost its wires to a torn-down exporter; a RESOLVED
    /// owner falls back to INSTALLED
    fn strand_importer(&self, importer: RevisionId, exporter: RevisionId) {
        let Some(bundle) = self
            .inner
            .revisions
            .get(importer)
            .and_then(|rev| self.lookup(rev.bundle()).ok())
        else {
            return;
        };
        if bundle.current_revision() != importer {
            return;
        }
        if bundle.compare_and_set_state(BundleState::Resolved, BundleState::Installed) {
            self.inner.events.fire_bundle_event(
                BundleEventKind::Unresolved,
                bundle.id(),
                &bundle.symbolic_name(),
                Some(importer),
            );
        } else if bundle.state().is_running() {
            warn!(
                "Bundle {} is {} but lost its wires to revision {}",
                bundle.id(),
                bundle.state(),
                exporter
            );
        }
    }

    // ---- lookups ----

    pub(crate) fn lookup(&self, id: BundleId) -> Result<Arc<Bundle>, FrameworkError> {
        self.inner
            .registry
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| FrameworkError::NotInstalled(id.to_string()))
    }

    /// Like `lookup`, also finding uninstalled bundles still held open
    pub(crate) fn lookup_any(&self, id: BundleId) -> Result<Arc<Bundle>, FrameworkError> {
        self.lookup(id).or_else(|err| {
            self.inner
                .removed
                .lock()
                .get(&id)
                .cloned()
                .ok_or(err)
        })
    }

    fn snapshot(&self) -> Vec<Arc<Bundle>> {
        self.inner.registry.read().by_id.values().cloned().collect()
    }

    pub fn bundle(&self, id: BundleId) -> Option<BundleInfo> {
        self.lookup(id).ok().map(|b| b.info())
    }

    /// Installed bundles by ascending id
    pub fn bundles(&self) -> Vec<BundleInfo> {
        self.snapshot().iter().map(|b| b.info()).collect()
    }

    pub fn bundle_by_location(&self, location: &str) -> Option<BundleInfo> {
        let id = *self.inner.registry.read().by_location.get(location)?;
        self.bundle(id)
    }

    pub fn bundles_by_name(&self, symbolic_name: &str) -> Vec<BundleInfo> {
        self.snapshot()
            .iter()
            .map(|b| b.info())
            .filter(|info| info.symbolic_name == symbolic_name)
            .collect()
    }

    pub fn state(&self, id: BundleId) -> Option<BundleState> {
        self.lookup_any(id).ok().map(|b| b.state())
    }

    /// Context of a STARTING or ACTIVE bundle; the system bundle always has one
    pub fn bundle_context(&self, id: BundleId) -> Option<Arc<BundleContext>> {
        if id == BundleId::SYSTEM {
            return Some(self.system_context());
        }
        self.lookup(id).ok().and_then(|b| b.context())
    }

    pub fn revisions(&self, id: BundleId) -> Result<Vec<RevisionInfo>, FrameworkError> {
        let bundle = self.lookup_any(id)?;
        let (current, latest) = {
            let data = bundle.data();
            (data.current, data.latest)
        };
        Ok(self
            .inner
            .revisions
            .revisions_of(bundle.id())
            .into_iter()
            .map(|rev| RevisionInfo {
                id: rev.id(),
                sequence: rev.sequence(),
                symbolic_name: rev.symbolic_name().to_string(),
                version: rev.version().to_string(),
                storage_key: rev.storage().key(),
                current: rev.id() == current,
                latest: rev.id() == latest,
            })
            .collect())
    }

    /// Outgoing wires of the current revision
    pub fn wiring(&self, id: BundleId) -> Result<Vec<Wire>, FrameworkError> {
        let bundle = self.lookup_any(id)?;
        Ok(self.inner.resolver.wires(bundle.current_revision()))
    }

    /// Other bundles wired to any revision of `id`
    pub fn dependents(&self, id: BundleId) -> Result<Vec<BundleId>, FrameworkError> {
        let bundle = self.lookup_any(id)?;
        Ok(self.dependents_of(&bundle).into_iter().collect())
    }

    fn dependents_of(&self, bundle: &Bundle) -> BTreeSet<BundleId> {
        bundle
            .revision_ids()
            .into_iter()
            .flat_map(|rev| self.inner.resolver.importers_of(rev))
            .filter_map(|importer| self.inner.revisions.get(importer))
            .map(|rev| rev.bundle())
            .filter(|owner| *owner != bundle.id())
            .collect()
    }

    // ---- resolution ----

    /// Resolve the given bundles (all unresolved bundles when `None`)
    pub fn resolve_bundles(&self, ids: Option<&[BundleId]>) -> Result<ResolutionReport, FrameworkError> {
        let report = match ids {
            None => self.inner.resolver.resolve_all(),
            Some(ids) => {
                let roots = ids
                    .iter()
                    .map(|id| self.lookup(*id).map(|b| b.current_revision()))
                    .collect::<Result<Vec<_>, _>>()?;
                self.inner.resolver.resolve(&roots)
            }
        };
        self.apply_resolution(report.resolved());
        Ok(report)
    }

    /// Move bundles whose current revision was just admitted to RESOLVED
    pub(crate) fn apply_resolution(&self, admitted: impl Iterator<Item = RevisionId>) {
        for rev in admitted {
            let Some(revision) = self.inner.revisions.get(rev) else {
                continue;
            };
            let Ok(bundle) = self.lookup(revision.bundle()) else {
                continue;
            };
            if bundle.current_revision() == rev
                && bundle.compare_and_set_state(BundleState::Installed, BundleState::Resolved)
            {
                self.inner.events.fire_bundle_event(
                    BundleEventKind::Resolved,
                    bundle.id(),
                    revision.symbolic_name(),
                    Some(rev),
                );
            }
        }
    }

    // ---- refresh ----

    /// Refresh one bundle and everything wired to it
    pub fn refresh(&self, id: BundleId) -> Result<(), FrameworkError> {
        self.refresh_bundles(Some(&[id]))
    }

    /// Promote pending revisions and drop stale ones
    ///
    /// With `None`, targets every bundle whose latest revision is not
    /// current or that holds retired revisions, plus uninstalled bundles
    /// still held open.
    pub fn refresh_bundles(&self, ids: Option<&[BundleId]>) -> Result<(), FrameworkError> {
        let targets: BTreeSet<BundleId> = match ids {
            Some(ids) => {
                for id in ids {
                    self.lookup_any(*id)?;
                }
                ids.iter().copied().collect()
            }
            None => {
                let mut targets: BTreeSet<BundleId> = self
                    .snapshot()
                    .iter()
                    .filter(|b| {
                        let data = b.data();
                        data.current != data.latest || !data.retired.is_empty()
                    })
                    .map(|b| b.id())
                    .collect();
                targets.extend(self.inner.removed.lock().keys().copied());
                targets
            }
        };

        // Everything wired to a target, transitively
        let mut closure = targets.clone();
        let mut queue: VecDeque<BundleId> = targets.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            let Ok(bundle) = self.lookup_any(id) else {
                continue;
            };
            for dependent in self.dependents_of(&bundle) {
                if closure.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }
        let members: Vec<Arc<Bundle>> = closure
            .iter()
            .filter_map(|id| self.lookup(*id).ok())
            .collect();
        debug!(
            "Refreshing {} target(s), {} bundle(s) affected",
            targets.len(),
            members.len()
        );

        let mut restart = Vec::new();
        for bundle in members.iter().rev() {
            let _guard = bundle.lock_transition();
            if matches!(bundle.state(), BundleState::Active | BundleState::Starting) {
                restart.push(Arc::clone(bundle));
                if let Err(e) = self.stop_locked(bundle) {
                    self.report_error(bundle.id(), "Stop during refresh failed", e);
                }
            }
        }

        for bundle in &members {
            let _guard = bundle.lock_transition();
            self.unresolve_locked(bundle);
        }

        for id in &targets {
            match self.lookup(*id) {
                Ok(bundle) => {
                    let _guard = bundle.lock_transition();
                    self.refresh_locked(&bundle);
                }
                Err(_) => self.purge_removed(*id),
            }
        }
        for bundle in &members {
            let _guard = bundle.lock_transition();
            self.teardown_retired(bundle);
        }

        restart.reverse();
        for bundle in restart {
            let _guard = bundle.lock_transition();
            if let Err(e) = self.start_locked(&bundle) {
                self.report_error(bundle.id(), "Restart after refresh failed", e);
            }
        }

        self.inner.events.fire_framework_event(
            FrameworkEventKind::PackagesRefreshed,
            BundleId::SYSTEM,
            format!("Refreshed {} bundle(s)", targets.len()),
            None,
        );
        info!("Refreshed bundles {:?}", targets);
        Ok(())
    }

    /// Drop retired revisions nobody outside the bundle wires to any more
    pub(crate) fn teardown_retired(&self, bundle: &Bundle) {
        let retired = std::mem::take(&mut bundle.data().retired);
        let mut kept = Vec::new();
        for rev in retired {
            if self.inner.resolver.external_importers(rev).is_empty() {
                debug!("Tearing down retired revision {} of bundle {}", rev, bundle.id());
                self.teardown_revision(rev);
            } else {
                kept.push(rev);
            }
        }
        bundle.data().retired.extend(kept);
    }

    /// Forget an uninstalled bundle once nothing wires to it
    pub(crate) fn purge_removed(&self, id: BundleId) {
        let Some(bundle) = self.inner.removed.lock().remove(&id) else {
            return;
        };
        let mut held = false;
        for rev in bundle.revision_ids() {
            if self.inner.resolver.external_importers(rev).is_empty() {
                self.teardown_revision(rev);
            } else {
                held = true;
            }
        }
        if held {
            warn!("Uninstalled bundle {} is still wired to; keeping it", id);
            self.inner.removed.lock().insert(id, bundle);
        } else {
            self.inner.revisions.forget_bundle(id);
            debug!("Purged uninstalled bundle {}", id);
        }
    }

    /// Report a side-effect failure as an ERROR framework event
    pub(crate) fn report_error(&self, bundle: BundleId, message: &str, error: FrameworkError) {
        self.inner.events.fire_framework_event(
            FrameworkEventKind::Error,
            bundle,
            message,
            Some(error),
        );
    }

    // ---- start levels ----

    pub fn start_level(&self) -> u32 {
        self.inner.start_level.load(Ordering::SeqCst)
    }

    /// Change the framework start level, starting or stopping bundles
    pub fn set_start_level(&self, level: u32) {
        let old = self.inner.start_level.swap(level, Ordering::SeqCst);
        info!("Framework start level {} -> {}", old, level);

        let mut bundles: Vec<(u32, Arc<Bundle>)> = self
            .snapshot()
            .into_iter()
            .map(|b| {
                let level = b.data().start_level;
                (level, b)
            })
            .collect();
        bundles.sort_by_key(|(bundle_level, b)| (*bundle_level, b.id()));

        if level > old {
            for (bundle_level, bundle) in &bundles {
                if *bundle_level > level {
                    continue;
                }
                let _guard = bundle.lock_transition();
                let eligible = bundle.data().persistent_start
                    && matches!(bundle.state(), BundleState::Installed | BundleState::Resolved);
                if eligible {
                    if let Err(e) = self.start_locked(bundle) {
                        self.report_error(bundle.id(), "Start on start level change failed", e);
                    }
                }
            }
        } else if level < old {
            for (bundle_level, bundle) in bundles.iter().rev() {
                if *bundle_level <= level {
                    continue;
                }
                let _guard = bundle.lock_transition();
                if let Err(e) = self.stop_locked(bundle) {
                    self.report_error(bundle.id(), "Stop on start level change failed", e);
                }
            }
        }

        self.inner.events.fire_framework_event(
            FrameworkEventKind::StartlevelChanged,
            BundleId::SYSTEM,
            format!("Start level changed from {} to {}", old, level),
            None,
        );
    }

    pub fn set_bundle_start_level(&self, id: BundleId, level: u32) -> Result<(), FrameworkError> {
        let bundle = self.lookup(id)?;
        let _guard = bundle.lock_transition();
        bundle.data().start_level = level;
        debug!("Bundle {} start level set to {}", id, level);

        let framework_level = self.start_level();
        let state = bundle.state();
        if level > framework_level && state.is_running() {
            self.stop_locked(&bundle)
        } else if level <= framework_level
            && bundle.data().persistent_start
            && matches!(state, BundleState::Installed | BundleState::Resolved)
        {
            self.start_locked(&bundle)
        } else {
            Ok(())
        }
    }

    // ---- bootstrap, weaving, waits ----

    /// Install configured bootstrap bundles and start those flagged
    pub fn bootstrap(&self) -> Result<Vec<BundleId>, FrameworkError> {
        let mut installed = Vec::new();
        for entry in &self.inner.config.bootstrap {
            let content = match &entry.path {
                Some(path) => {
                    let path = if path.is_dir() {
                        path.join(MANIFEST_FILE)
                    } else {
                        path.clone()
                    };
                    let bytes = std::fs::read(&path).map_err(|e| {
                        FrameworkError::storage(format!("Cannot read bootstrap bundle {:?}", path), e)
                    })?;
                    Some(Bytes::from(bytes))
                }
                None => None,
            };
            let id = self.install(&entry.location, content)?;
            installed.push((id, entry.start));
        }

        for (id, start) in &installed {
            if *start {
                if let Err(e) = self.start(*id, StartOptions::default()) {
                    self.report_error(*id, "Bootstrap start failed", e);
                }
            }
        }
        info!("Bootstrapped {} bundle(s)", installed.len());
        Ok(installed.into_iter().map(|(id, _)| id).collect())
    }

    /// Run the registered weaving hooks over a class defined by `bundle`
    pub fn weave(&self, bundle: BundleId, class_name: &str, bytes: Vec<u8>) -> Result<WovenClass, FrameworkError> {
        self.lookup(bundle)?;
        self.inner.weaving.context(bundle).weave(class_name, bytes)
    }

    /// Wait until a bundle reaches `expected`
    ///
    /// Fails with `NotInstalled` if the bundle is uninstalled first.
    pub async fn await_state(
        &self,
        id: BundleId,
        expected: BundleState,
        timeout: Duration,
    ) -> Result<BundleState, FrameworkError> {
        let bundle = self.lookup_any(id)?;
        let mut rx = bundle.subscribe();
        let wait = async {
            rx.wait_for(|s| *s == expected || *s == BundleState::Uninstalled)
                .await
                .map(|state| *state)
        };
        match crate::utils::with_timeout(wait, timeout).await {
            Ok(Ok(state)) if state == expected => Ok(state),
            Ok(_) => Err(FrameworkError::NotInstalled(id.to_string())),
            Err(_) => Err(FrameworkError::Timeout(format!(
                "bundle {} to reach {}",
                id, expected
            ))),
        }
    }

    // ---- shutdown ----

    /// Stop every running bundle (highest id first) and refuse new installs
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Framework {} shutting down", self.inner.uuid);

        for bundle in self.snapshot().iter().rev() {
            let _guard = bundle.lock_transition();
            if bundle.state().is_running() {
                if let Err(e) = self.stop_locked(bundle) {
                    self.report_error(bundle.id(), "Stop during shutdown failed", e);
                }
            }
        }

        self.inner.events.fire_framework_event(
            FrameworkEventKind::Info,
            BundleId::SYSTEM,
            "Framework stopped",
            None,
        );
        self.inner.system_context.invalidate();
    }
}
