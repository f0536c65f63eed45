//! Bundle lifecycle transitions
//!
//! Every public operation takes the bundle's transition lock for its whole
//! duration, activation hooks included. The `*_locked` variants assume the
//! caller already holds it and are shared by refresh, start levels and
//! shutdown in `manager`.

use bytes::Bytes;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::framework::api::BundleEventKind;
use crate::framework::bundle::Bundle;
use crate::framework::context::BundleContext;
use crate::framework::manager::Framework;
use crate::framework::traits::{
    BundleId, BundleState, FrameworkError, HookError, LifecycleError, RevisionId, StartOptions,
    StopOptions,
};

/// Run user code, turning errors and panics into a `HookError`
fn invoke_hook(hook: impl FnOnce() -> anyhow::Result<()>) -> Result<(), HookError> {
    match catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err("activation hook panicked".into()),
    }
}

fn invalid_transition(bundle: &Bundle, from: BundleState, to: BundleState) -> FrameworkError {
    LifecycleError::InvalidTransition {
        bundle: bundle.symbolic_name(),
        from,
        to,
    }
    .into()
}

impl Framework {
    fn fire(&self, kind: BundleEventKind, bundle: &Bundle, revision: Option<RevisionId>) {
        self.inner
            .events
            .fire_bundle_event(kind, bundle.id(), &bundle.symbolic_name(), revision);
    }

    // ---- start ----

    /// Start a bundle, resolving it first if needed
    ///
    /// A failed activation leaves the bundle RESOLVED with no context.
    pub fn start(&self, id: BundleId, options: StartOptions) -> Result<(), FrameworkError> {
        if self.is_shut_down() {
            return Err(FrameworkError::Shutdown);
        }
        let bundle = self.lookup_any(id)?;
        let _guard = bundle.lock_transition();

        let state = bundle.state();
        if matches!(state, BundleState::Uninstalled | BundleState::Stopping) {
            return Err(invalid_transition(&bundle, state, BundleState::Starting));
        }
        if !options.transient {
            bundle.data().persistent_start = true;
        }
        if matches!(state, BundleState::Active | BundleState::Starting) {
            return Ok(());
        }

        let level = bundle.data().start_level;
        let framework_level = self.start_level();
        if level > framework_level {
            if options.transient {
                return Err(LifecycleError::StartLevelNotReached {
                    bundle: bundle.symbolic_name(),
                    level,
                    framework_level,
                }
                .into());
            }
            debug!(
                "Deferring start of bundle {}: level {} above framework level {}",
                id, level, framework_level
            );
            return Ok(());
        }

        self.start_locked(&bundle)
    }

    pub(crate) fn start_locked(&self, bundle: &Arc<Bundle>) -> Result<(), FrameworkError> {
        if bundle.state() == BundleState::Installed {
            self.resolve_locked(bundle)?;
        }
        match bundle.state() {
            BundleState::Resolved => {}
            BundleState::Active | BundleState::Starting => return Ok(()),
            other => return Err(invalid_transition(bundle, other, BundleState::Starting)),
        }

        let current = bundle.current_revision();
        let revision = self
            .inner
            .revisions
            .get(current)
            .ok_or_else(|| FrameworkError::NotInstalled(bundle.id().to_string()))?;

        bundle.set_state(BundleState::Starting)?;
        self.fire(BundleEventKind::Starting, bundle, Some(current));

        let context = Arc::new(BundleContext::new(bundle.id(), Arc::downgrade(&self.inner)));
        bundle.data().context = Some(Arc::clone(&context));

        if let Some(decl) = revision.metadata().activator.as_ref() {
            let activator = match self.inner.activators.load(&revision, decl) {
                Ok(activator) => Arc::new(activator),
                Err(source) => {
                    let error = LifecycleError::ActivatorNotFound {
                        bundle: revision.symbolic_name().to_string(),
                        name: decl.name.clone(),
                        source,
                    };
                    return self.fail_start(bundle, error);
                }
            };
            bundle.data().activator = Some(Arc::clone(&activator));
            if let Err(source) = invoke_hook(|| activator.start(&context)) {
                let error = LifecycleError::ActivatorFailed {
                    bundle: revision.symbolic_name().to_string(),
                    source,
                };
                return self.fail_start(bundle, error);
            }
        }

        // The hook may have stopped or uninstalled its own bundle
        let state = bundle.state();
        if state != BundleState::Starting {
            return Err(LifecycleError::StateChangedDuringStart {
                bundle: revision.symbolic_name().to_string(),
                state,
            }
            .into());
        }

        bundle.set_state(BundleState::Active)?;
        self.fire(BundleEventKind::Started, bundle, Some(current));
        info!("Started bundle {} ({})", revision.metadata().identifier(), bundle.id());
        Ok(())
    }

    /// Unwind a failed activation through STOPPING back to RESOLVED
    fn fail_start(&self, bundle: &Bundle, error: LifecycleError) -> Result<(), FrameworkError> {
        warn!("Start of bundle {} failed: {}", bundle.id(), error);
        let current = bundle.current_revision();
        let unwinding = matches!(bundle.state(), BundleState::Starting | BundleState::Active);
        if unwinding && bundle.set_state(BundleState::Stopping).is_ok() {
            self.fire(BundleEventKind::Stopping, bundle, Some(current));
        }
        self.release_resources(bundle);
        if bundle.compare_and_set_state(BundleState::Stopping, BundleState::Resolved) {
            self.fire(BundleEventKind::Stopped, bundle, Some(current));
        }
        Err(error.into())
    }

    /// Drop the context and everything registered through it
    fn release_resources(&self, bundle: &Bundle) {
        let (context, activator) = {
            let mut data = bundle.data();
            (data.context.take(), data.activator.take())
        };
        drop(activator);
        let services = self.inner.services.unregister_all(bundle.id());
        let listeners = self.inner.events.remove_listeners_of(bundle.id());
        let hooks = self.inner.weaving.unregister_all(bundle.id());
        if let Some(context) = context {
            context.invalidate();
        }
        debug!(
            "Released bundle {}: {} service(s), {} listener(s), {} weaving hook(s)",
            bundle.id(),
            services,
            listeners,
            hooks
        );
    }

    fn resolve_locked(&self, bundle: &Bundle) -> Result<(), FrameworkError> {
        let current = bundle.current_revision();
        match self.inner.resolver.resolve_revision(current) {
            Ok(report) => {
                self.apply_resolution(report.resolved());
                if bundle.compare_and_set_state(BundleState::Installed, BundleState::Resolved) {
                    self.fire(BundleEventKind::Resolved, bundle, Some(current));
                }
                Ok(())
            }
            Err(err) => {
                self.apply_resolution(err.admitted.iter().copied());
                warn!("Bundle {} could not be resolved: {}", bundle.id(), err);
                Err(err.into())
            }
        }
    }

    // ---- stop ----

    /// Stop a bundle; a no-op unless it is STARTING or ACTIVE
    pub fn stop(&self, id: BundleId, options: StopOptions) -> Result<(), FrameworkError> {
        let bundle = self.lookup_any(id)?;
        let _guard = bundle.lock_transition();
        if !options.transient {
            bundle.data().persistent_start = false;
        }
        self.stop_locked(&bundle)
    }

    pub(crate) fn stop_locked(&self, bundle: &Bundle) -> Result<(), FrameworkError> {
        let prior = bundle.state();
        if !matches!(prior, BundleState::Starting | BundleState::Active) {
            return Ok(());
        }
        let current = bundle.current_revision();
        bundle.set_state(BundleState::Stopping)?;
        self.fire(BundleEventKind::Stopping, bundle, Some(current));

        let mut failure = None;
        if prior == BundleState::Active {
            let (context, activator) = {
                let data = bundle.data();
                (data.context.clone(), data.activator.clone())
            };
            if let (Some(context), Some(activator)) = (context, activator) {
                if let Err(source) = invoke_hook(|| activator.stop(&context)) {
                    failure = Some(source);
                }
            }
        }

        match bundle.state() {
            BundleState::Uninstalled => {
                self.release_resources(bundle);
                return Err(LifecycleError::UninstalledDuringStop(bundle.symbolic_name()).into());
            }
            BundleState::Stopping => {
                self.release_resources(bundle);
                bundle.set_state(BundleState::Resolved)?;
                self.fire(BundleEventKind::Stopped, bundle, Some(current));
                info!("Stopped bundle {} ({})", bundle.symbolic_name(), bundle.id());
            }
            // The hook updated or unresolved its own bundle
            BundleState::Installed => {
                self.release_resources(bundle);
                self.fire(BundleEventKind::Stopped, bundle, Some(current));
                info!("Stopped bundle {} ({}) after unresolve", bundle.symbolic_name(), bundle.id());
            }
            // The hook restarted or otherwise moved its own bundle on
            other => debug!("Bundle {} is {} after its stop hook", bundle.id(), other),
        }

        match failure {
            Some(source) => Err(LifecycleError::DeactivatorFailed {
                bundle: bundle.symbolic_name(),
                source,
            }
            .into()),
            None => Ok(()),
        }
    }

    // ---- update / refresh ----

    /// Replace a bundle's content
    ///
    /// The new revision becomes current immediately unless another bundle
    /// is wired to the old one; it then waits for an explicit refresh.
    pub fn update(&self, id: BundleId, content: Option<Bytes>) -> Result<(), FrameworkError> {
        let bundle = self.lookup(id)?;
        let _guard = bundle.lock_transition();
        let state = bundle.state();
        if state == BundleState::Uninstalled {
            return Err(invalid_transition(&bundle, state, BundleState::Installed));
        }

        let revision = self.stage_revision(&bundle, content)?;

        // A stop hook updating its own bundle must not restart it under the outer stop
        let restart = matches!(state, BundleState::Active | BundleState::Starting);
        if restart {
            if let Err(e) = self.stop_locked(&bundle) {
                self.teardown_revision(revision);
                return Err(e);
            }
        }

        self.unresolve_locked(&bundle);
        self.set_latest(&bundle, revision);

        let current = bundle.current_revision();
        if self.inner.resolver.external_importers(current).is_empty() {
            self.refresh_locked(&bundle);
        } else {
            info!(
                "Bundle {} revision {} is still wired to; {} waits for refresh",
                id, current, revision
            );
        }

        self.fire(BundleEventKind::Updated, &bundle, Some(revision));
        info!("Updated bundle {} ({})", bundle.symbolic_name(), id);

        if restart {
            if let Err(e) = self.start_locked(&bundle) {
                self.report_error(id, "Restart after update failed", e);
            }
        }
        Ok(())
    }

    /// Stage a new latest revision without stopping or refreshing
    pub fn create_new_revision(&self, id: BundleId, content: Option<Bytes>) -> Result<RevisionId, FrameworkError> {
        let bundle = self.lookup(id)?;
        let _guard = bundle.lock_transition();
        let revision = self.stage_revision(&bundle, content)?;
        self.set_latest(&bundle, revision);
        debug!("Staged revision {} for bundle {}", revision, id);
        Ok(revision)
    }

    /// Build a revision from fresh content, keeping the symbolic name
    fn stage_revision(&self, bundle: &Bundle, content: Option<Bytes>) -> Result<RevisionId, FrameworkError> {
        let deployment = self
            .inner
            .provider
            .create_deployment(bundle.location(), content)?;
        let start_level = bundle.data().start_level;
        let revision = self.build_revision(bundle.id(), deployment, Some(start_level))?;

        let expected = bundle.symbolic_name();
        if revision.symbolic_name() != expected {
            let found = revision.symbolic_name().to_string();
            self.teardown_revision(revision.id());
            return Err(LifecycleError::IdentityChanged {
                bundle: expected.clone(),
                expected,
                found,
            }
            .into());
        }
        Ok(revision.id())
    }

    /// Point latest at `revision`, dropping a previously staged one
    fn set_latest(&self, bundle: &Bundle, revision: RevisionId) {
        let stale = {
            let mut data = bundle.data();
            let previous = data.latest;
            data.latest = revision;
            (previous != data.current).then_some(previous)
        };
        if let Some(stale) = stale {
            debug!("Dropping staged revision {} of bundle {}", stale, bundle.id());
            self.teardown_revision(stale);
        }
        bundle.touch();
    }

    /// Drop the current revision's wires and fall back to INSTALLED
    pub fn unresolve(&self, id: BundleId) -> Result<(), FrameworkError> {
        let bundle = self.lookup(id)?;
        let _guard = bundle.lock_transition();
        let state = bundle.state();
        if state == BundleState::Uninstalled {
            return Err(invalid_transition(&bundle, state, BundleState::Installed));
        }
        self.stop_locked(&bundle)?;
        self.unresolve_locked(&bundle);
        Ok(())
    }

    pub(crate) fn unresolve_locked(&self, bundle: &Bundle) {
        let current = bundle.current_revision();
        let wires = self.inner.resolver.unresolve(current);
        let state = bundle.state();
        if !matches!(state, BundleState::Installed | BundleState::Uninstalled)
            && bundle.compare_and_set_state(state, BundleState::Installed)
        {
            self.fire(BundleEventKind::Unresolved, bundle, Some(current));
        }
        debug!("Unresolved bundle {} ({} wire(s) dropped)", bundle.id(), wires.len());
    }

    /// Promote latest to current; retire the old current revision
    pub(crate) fn refresh_locked(&self, bundle: &Bundle) {
        if bundle.state() == BundleState::Uninstalled {
            self.purge_removed(bundle.id());
            return;
        }
        let (current, latest) = {
            let data = bundle.data();
            (data.current, data.latest)
        };
        if current == latest {
            self.teardown_retired(bundle);
            return;
        }
        let Some(revision) = self.inner.revisions.get(latest) else {
            warn!("Latest revision {} of bundle {} is missing", latest, bundle.id());
            return;
        };

        {
            let _registry = self.inner.registry.write();
            let mut data = bundle.data();
            data.retired.push(current);
            data.current = latest;
            data.symbolic_name = revision.symbolic_name().to_string();
            data.version = revision.version().clone();
        }
        self.inner.resolver.remove_candidate(current);
        self.inner.resolver.add_candidate(revision);
        debug!("Bundle {} current revision {} -> {}", bundle.id(), current, latest);

        self.teardown_retired(bundle);
    }

    // ---- uninstall ----

    /// Remove a bundle; its revisions stay until nothing wires to them
    pub fn uninstall(&self, id: BundleId) -> Result<(), FrameworkError> {
        let bundle = self.lookup(id)?;
        let _guard = bundle.lock_transition();
        if bundle.state() == BundleState::Uninstalled {
            return Err(FrameworkError::NotInstalled(id.to_string()));
        }

        if bundle.state().is_running() {
            if let Err(e) = self.stop_locked(&bundle) {
                self.report_error(id, "Stop during uninstall failed", e);
            }
            // Uninstalled by its own stop hook
            if bundle.state() == BundleState::Uninstalled {
                return Ok(());
            }
        }

        {
            let mut registry = self.inner.registry.write();
            registry.by_id.remove(&id);
            registry.by_location.remove(bundle.location());
        }
        bundle.set_state(BundleState::Uninstalled)?;
        bundle.touch();
        self.fire(BundleEventKind::Uninstalled, &bundle, Some(bundle.current_revision()));

        let revisions = bundle.revision_ids();
        for revision in &revisions {
            self.inner.resolver.remove_candidate(*revision);
        }
        let held = revisions
            .iter()
            .any(|revision| !self.inner.resolver.external_importers(*revision).is_empty());
        if held {
            info!("Uninstalled bundle {}; revisions held until refresh", id);
            self.inner.removed.lock().insert(id, Arc::clone(&bundle));
        } else {
            for revision in revisions {
                self.teardown_revision(revision);
            }
            self.inner.revisions.forget_bundle(id);
            info!("Uninstalled bundle {} ({})", bundle.symbolic_name(), id);
        }
        Ok(())
    }
}
