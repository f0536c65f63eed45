//! Bounded waits on bundle transitions
//!
//! Lifecycle operations themselves never time out. These helpers let a
//! caller wait, up to a deadline, for bundles to reach a state.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::framework::api::{
    BundleEvent, BundleEventKind, BundleListener, FrameworkEvent, FrameworkEventKind,
    FrameworkListener, ListenerId,
};
use crate::framework::manager::{Framework, FrameworkInner};
use crate::framework::traits::{BundleId, BundleState, FrameworkError};
use crate::utils::with_custom_timeout;

/// Pending wait for one bundle to reach a state
#[derive(Clone)]
pub struct FutureState {
    framework: Framework,
    bundle: BundleId,
    expected: BundleState,
    timeout: Duration,
}

impl FutureState {
    pub fn new(framework: Framework, bundle: BundleId, expected: BundleState) -> Self {
        let timeout = framework.config().transition_timeout();
        Self {
            framework,
            bundle,
            expected,
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_done(&self) -> bool {
        self.framework.state(self.bundle) == Some(self.expected)
    }

    pub async fn wait(&self) -> Result<BundleState, FrameworkError> {
        self.framework
            .await_state(self.bundle, self.expected, self.timeout)
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerStatus {
    Pending,
    AllStarted,
    Failed,
}

#[derive(Default)]
struct Progress {
    pending: BTreeSet<BundleId>,
    /// Pending bundles seen entering STARTING
    starting: BTreeSet<BundleId>,
    failed: BTreeSet<BundleId>,
}

/// Tracks a set of bundles until all are ACTIVE or one fails to start
pub struct StartTracker {
    progress: Mutex<Progress>,
    complete_on_first_failure: bool,
    status: watch::Sender<TrackerStatus>,
    framework: Weak<FrameworkInner>,
    listeners: Mutex<Vec<ListenerId>>,
}

impl StartTracker {
    /// Register with the framework and account for bundles already started
    pub fn attach(
        framework: &Framework,
        bundles: &[BundleId],
        complete_on_first_failure: bool,
    ) -> Arc<Self> {
        let (status, _) = watch::channel(TrackerStatus::Pending);
        let tracker = Arc::new(Self {
            progress: Mutex::new(Progress {
                pending: bundles.iter().copied().collect(),
                ..Progress::default()
            }),
            complete_on_first_failure,
            status,
            framework: Arc::downgrade(&framework.inner),
            listeners: Mutex::new(Vec::new()),
        });

        let bundle_listener = framework.add_bundle_listener(Arc::clone(&tracker) as Arc<dyn BundleListener>);
        let framework_listener =
            framework.add_framework_listener(Arc::clone(&tracker) as Arc<dyn FrameworkListener>);
        tracker
            .listeners
            .lock()
            .extend([bundle_listener, framework_listener]);

        {
            let mut progress = tracker.progress.lock();
            for id in bundles {
                match framework.state(*id) {
                    Some(BundleState::Active) => {
                        progress.pending.remove(id);
                    }
                    None | Some(BundleState::Uninstalled) => {
                        progress.pending.remove(id);
                        progress.failed.insert(*id);
                    }
                    Some(_) => {}
                }
            }
        }
        tracker.update_status();
        tracker
    }

    pub fn status(&self) -> TrackerStatus {
        *self.status.borrow()
    }

    pub fn pending(&self) -> Vec<BundleId> {
        self.progress.lock().pending.iter().copied().collect()
    }

    pub fn failed(&self) -> Vec<BundleId> {
        self.progress.lock().failed.iter().copied().collect()
    }

    /// Wait for completion; `Ok(true)` when every bundle started
    pub async fn await_completion(&self, timeout: Duration) -> Result<bool, FrameworkError> {
        let mut rx = self.status.subscribe();
        let wait = async {
            rx.wait_for(|status| *status != TrackerStatus::Pending)
                .await
                .map(|status| *status)
        };
        match with_custom_timeout(wait, timeout).await {
            Ok(Ok(status)) => {
                self.detach();
                Ok(status == TrackerStatus::AllStarted)
            }
            _ => Err(FrameworkError::Timeout(format!(
                "{} bundle(s) to start",
                self.progress.lock().pending.len()
            ))),
        }
    }

    /// Stop listening; safe to call more than once
    pub fn detach(&self) {
        let ids = std::mem::take(&mut *self.listeners.lock());
        if let Some(inner) = self.framework.upgrade() {
            for id in ids {
                inner.events.remove_listener(id);
            }
        }
    }

    fn fail(&self, bundle: BundleId) {
        {
            let mut progress = self.progress.lock();
            if !progress.pending.remove(&bundle) {
                return;
            }
            progress.starting.remove(&bundle);
            progress.failed.insert(bundle);
        }
        debug!("Start tracker: bundle {} failed to start", bundle);
        self.update_status();
    }

    fn update_status(&self) {
        let status = {
            let progress = self.progress.lock();
            if !progress.failed.is_empty()
                && (self.complete_on_first_failure || progress.pending.is_empty())
            {
                TrackerStatus::Failed
            } else if progress.pending.is_empty() {
                TrackerStatus::AllStarted
            } else {
                TrackerStatus::Pending
            }
        };
        self.status.send_if_modified(|current| {
            // Completion is final
            if *current == TrackerStatus::Pending && status != TrackerStatus::Pending {
                *current = status;
                true
            } else {
                false
            }
        });
    }
}

impl BundleListener for StartTracker {
    fn bundle_changed(&self, event: &BundleEvent) -> anyhow::Result<()> {
        match event.kind {
            BundleEventKind::Starting => {
                let mut progress = self.progress.lock();
                if progress.pending.contains(&event.bundle) {
                    progress.starting.insert(event.bundle);
                }
            }
            BundleEventKind::Started => {
                let removed = {
                    let mut progress = self.progress.lock();
                    progress.starting.remove(&event.bundle);
                    progress.pending.remove(&event.bundle)
                };
                if removed {
                    self.update_status();
                }
            }
            BundleEventKind::Stopped => {
                let aborted = self.progress.lock().starting.contains(&event.bundle);
                if aborted {
                    self.fail(event.bundle);
                }
            }
            BundleEventKind::Uninstalled => self.fail(event.bundle),
            _ => {}
        }
        Ok(())
    }
}

impl FrameworkListener for StartTracker {
    fn framework_event(&self, event: &FrameworkEvent) -> anyhow::Result<()> {
        if event.kind == FrameworkEventKind::Error {
            self.fail(event.bundle);
        }
        Ok(())
    }
}

impl Framework {
    pub fn future_state(&self, id: BundleId, expected: BundleState) -> FutureState {
        FutureState::new(self.clone(), id, expected)
    }

    pub fn track_start(&self, bundles: &[BundleId], complete_on_first_failure: bool) -> Arc<StartTracker> {
        StartTracker::attach(self, bundles, complete_on_first_failure)
    }
}
