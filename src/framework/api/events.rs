//! Framework event notifier
//!
//! Fan-out of bundle and framework events to listeners. Events are
//! sequenced under one enqueue lock and delivered one at a time, so every
//! listener observes the same total order. A caller's event is delivered
//! on the caller's own thread before `fire_*` returns; only events fired
//! from inside a listener are queued behind the one being delivered. A
//! failing or panicking listener is logged and skipped.

use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

use crate::framework::traits::{BundleId, FrameworkError, RevisionId};

/// Bundle lifecycle event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BundleEventKind {
    Installed,
    Resolved,
    Starting,
    Started,
    Stopping,
    Stopped,
    Updated,
    Unresolved,
    Uninstalled,
}

/// Framework-level event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameworkEventKind {
    Error,
    Warning,
    Info,
    PackagesRefreshed,
    StartlevelChanged,
}

#[derive(Debug, Clone)]
pub struct BundleEvent {
    /// Position in the global event order
    pub sequence: u64,
    pub kind: BundleEventKind,
    pub bundle: BundleId,
    pub symbolic_name: String,
    pub revision: Option<RevisionId>,
}

#[derive(Debug, Clone)]
pub struct FrameworkEvent {
    pub sequence: u64,
    pub kind: FrameworkEventKind,
    /// Bundle the event is about (the system bundle for global events)
    pub bundle: BundleId,
    pub message: String,
    pub cause: Option<Arc<FrameworkError>>,
}

impl fmt::Display for BundleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {:?} {} [{}]", self.sequence, self.kind, self.symbolic_name, self.bundle)
    }
}

/// Receives bundle events
pub trait BundleListener: Send + Sync {
    fn bundle_changed(&self, event: &BundleEvent) -> anyhow::Result<()>;
}

/// Receives framework events
pub trait FrameworkListener: Send + Sync {
    fn framework_event(&self, event: &FrameworkEvent) -> anyhow::Result<()>;
}

impl<F> BundleListener for F
where
    F: Fn(&BundleEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn bundle_changed(&self, event: &BundleEvent) -> anyhow::Result<()> {
        self(event)
    }
}

impl<F> FrameworkListener for F
where
    F: Fn(&FrameworkEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn framework_event(&self, event: &FrameworkEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Handle returned when a listener is added
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

#[derive(Debug, Clone)]
enum Event {
    Bundle(BundleEvent),
    Framework(FrameworkEvent),
}

struct Pending {
    event: Event,
    /// Thread blocked in `fire_*` until this event is delivered
    waiter: Option<ThreadId>,
}

#[derive(Default)]
struct Queue {
    next_sequence: u64,
    pending: VecDeque<Pending>,
    drainer: Option<ThreadId>,
}

impl Queue {
    /// The head may be delivered by `me`: nobody waits on it, or `me` does
    fn head_is_for(&self, me: ThreadId) -> bool {
        self.pending
            .front()
            .map_or(false, |head| head.waiter.map_or(true, |waiter| waiter == me))
    }
}

struct Registered<L: ?Sized> {
    owner: BundleId,
    listener: Arc<L>,
}

#[derive(Default)]
struct Listeners {
    bundle: BTreeMap<ListenerId, Registered<dyn BundleListener>>,
    framework: BTreeMap<ListenerId, Registered<dyn FrameworkListener>>,
}

/// Event notifier
pub struct FrameworkEvents {
    queue: Mutex<Queue>,
    handoff: Condvar,
    listeners: RwLock<Listeners>,
    next_listener: AtomicU64,
}

impl FrameworkEvents {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            handoff: Condvar::new(),
            listeners: RwLock::new(Listeners::default()),
            next_listener: AtomicU64::new(1),
        }
    }

    pub fn add_bundle_listener(
        &self,
        owner: BundleId,
        listener: Arc<dyn BundleListener>,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .write()
            .bundle
            .insert(id, Registered { owner, listener });
        debug!("Bundle {} added bundle listener {:?}", owner, id);
        id
    }

    pub fn add_framework_listener(
        &self,
        owner: BundleId,
        listener: Arc<dyn FrameworkListener>,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .write()
            .framework
            .insert(id, Registered { owner, listener });
        debug!("Bundle {} added framework listener {:?}", owner, id);
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        listeners.bundle.remove(&id).is_some() || listeners.framework.remove(&id).is_some()
    }

    /// Remove every listener added through a bundle's context
    pub fn remove_listeners_of(&self, owner: BundleId) -> usize {
        let mut listeners = self.listeners.write();
        let before = listeners.bundle.len() + listeners.framework.len();
        listeners.bundle.retain(|_, r| r.owner != owner);
        listeners.framework.retain(|_, r| r.owner != owner);
        before - listeners.bundle.len() - listeners.framework.len()
    }

    pub fn listener_count(&self) -> usize {
        let listeners = self.listeners.read();
        listeners.bundle.len() + listeners.framework.len()
    }

    pub fn fire_bundle_event(
        &self,
        kind: BundleEventKind,
        bundle: BundleId,
        symbolic_name: &str,
        revision: Option<RevisionId>,
    ) {
        self.enqueue(|sequence| {
            Event::Bundle(BundleEvent {
                sequence,
                kind,
                bundle,
                symbolic_name: symbolic_name.to_string(),
                revision,
            })
        });
    }

    pub fn fire_framework_event(
        &self,
        kind: FrameworkEventKind,
        bundle: BundleId,
        message: impl Into<String>,
        cause: Option<FrameworkError>,
    ) {
        let message = message.into();
        if kind == FrameworkEventKind::Error {
            match &cause {
                Some(cause) => warn!("Framework error for bundle {}: {}: {}", bundle, message, cause),
                None => warn!("Framework error for bundle {}: {}", bundle, message),
            }
        }
        let cause = cause.map(Arc::new);
        self.enqueue(|sequence| {
            Event::Framework(FrameworkEvent {
                sequence,
                kind,
                bundle,
                message,
                cause,
            })
        });
    }

    fn enqueue(&self, build: impl FnOnce(u64) -> Event) {
        let me = thread::current().id();
        let mut queue = self.queue.lock();
        let sequence = queue.next_sequence;
        queue.next_sequence += 1;
        if queue.drainer == Some(me) {
            // Fired from a listener; delivered after the current event
            queue.pending.push_back(Pending {
                event: build(sequence),
                waiter: None,
            });
            return;
        }
        queue.pending.push_back(Pending {
            event: build(sequence),
            waiter: Some(me),
        });
        while queue.drainer.is_some() || !queue.head_is_for(me) {
            self.handoff.wait(&mut queue);
        }
        queue.drainer = Some(me);
        drop(queue);
        self.drain(me);
    }

    /// Deliver from the head until it is empty or waited on by another thread
    fn drain(&self, me: ThreadId) {
        loop {
            let event = {
                let mut queue = self.queue.lock();
                let next = if queue.head_is_for(me) {
                    queue.pending.pop_front()
                } else {
                    None
                };
                match next {
                    Some(pending) => pending.event,
                    None => {
                        queue.drainer = None;
                        drop(queue);
                        self.handoff.notify_all();
                        return;
                    }
                }
            };
            self.deliver(&event);
        }
    }

    fn deliver(&self, event: &Event) {
        match event {
            Event::Bundle(event) => {
                let targets: Vec<(ListenerId, Arc<dyn BundleListener>)> = self
                    .listeners
                    .read()
                    .bundle
                    .iter()
                    .map(|(id, r)| (*id, Arc::clone(&r.listener)))
                    .collect();
                for (id, listener) in targets {
                    isolate(id, || listener.bundle_changed(event));
                }
            }
            Event::Framework(event) => {
                let targets: Vec<(ListenerId, Arc<dyn FrameworkListener>)> = self
                    .listeners
                    .read()
                    .framework
                    .iter()
                    .map(|(id, r)| (*id, Arc::clone(&r.listener)))
                    .collect();
                for (id, listener) in targets {
                    isolate(id, || listener.framework_event(event));
                }
            }
        }
    }
}

/// Run one listener call; errors and panics never reach the caller
fn isolate(id: ListenerId, call: impl FnOnce() -> anyhow::Result<()>) {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Listener {:?} failed: {:#}", id, e),
        Err(_) => warn!("Listener {:?} panicked", id),
    }
}

impl Default for FrameworkEvents {
    fn default() -> Self {
        Self::new()
    }
}
