//! Weaving hooks
//!
//! Hooks may rewrite class bytes and add dynamic imports before a class is
//! defined. Each weave runs through an explicit `WeavingContext` holding a
//! snapshot of the eligible hooks; hooks that fail are denied for the
//! rest of the framework's life.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::framework::traits::{BundleId, FrameworkError, HookError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeavingHookId(pub u64);

pub trait WeavingHook: Send + Sync {
    fn weave(&self, class: &mut WovenClass) -> anyhow::Result<()>;
}

impl<F> WeavingHook for F
where
    F: Fn(&mut WovenClass) -> anyhow::Result<()> + Send + Sync,
{
    fn weave(&self, class: &mut WovenClass) -> anyhow::Result<()> {
        self(class)
    }
}

/// Class being woven; immutable once complete
#[derive(Debug, Clone)]
pub struct WovenClass {
    class_name: String,
    bundle: BundleId,
    bytes: Vec<u8>,
    dynamic_imports: Vec<String>,
    complete: bool,
}

impl WovenClass {
    fn new(class_name: &str, bundle: BundleId, bytes: Vec<u8>) -> Self {
        Self {
            class_name: class_name.to_string(),
            bundle,
            bytes,
            dynamic_imports: Vec::new(),
            complete: false,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn bundle(&self) -> BundleId {
        self.bundle
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dynamic_imports(&self) -> &[String] {
        &self.dynamic_imports
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    fn ensure_open(&self) -> Result<(), FrameworkError> {
        if self.complete {
            return Err(FrameworkError::InvalidContext(format!(
                "woven class {} is already complete",
                self.class_name
            )));
        }
        Ok(())
    }

    pub fn set_bytes(&mut self, bytes: Vec<u8>) -> Result<(), FrameworkError> {
        self.ensure_open()?;
        self.bytes = bytes;
        Ok(())
    }

    pub fn add_dynamic_import(&mut self, import: impl Into<String>) -> Result<(), FrameworkError> {
        self.ensure_open()?;
        self.dynamic_imports.push(import.into());
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

struct HookEntry {
    owner: BundleId,
    ranking: i32,
    hook: Arc<dyn WeavingHook>,
}

/// Registered hooks plus the deny list
#[derive(Default)]
pub struct WeavingHooks {
    next_id: AtomicU64,
    hooks: RwLock<BTreeMap<WeavingHookId, HookEntry>>,
    denied: RwLock<BTreeSet<WeavingHookId>>,
}

impl WeavingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, owner: BundleId, ranking: i32, hook: Arc<dyn WeavingHook>) -> WeavingHookId {
        let id = WeavingHookId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.hooks.write().insert(
            id,
            HookEntry {
                owner,
                ranking,
                hook,
            },
        );
        debug!("Bundle {} registered weaving hook {:?} (ranking {})", owner, id, ranking);
        id
    }

    pub fn unregister(&self, id: WeavingHookId) -> bool {
        self.hooks.write().remove(&id).is_some()
    }

    pub fn unregister_all(&self, owner: BundleId) -> usize {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|_, entry| entry.owner != owner);
        before - hooks.len()
    }

    pub fn is_denied(&self, id: WeavingHookId) -> bool {
        self.denied.read().contains(&id)
    }

    fn deny(&self, id: WeavingHookId) {
        self.denied.write().insert(id);
    }

    /// Snapshot eligible hooks: ranking descending, then registration order
    pub fn context(&self, bundle: BundleId) -> WeavingContext<'_> {
        let denied = self.denied.read();
        let mut hooks: Vec<(WeavingHookId, i32, Arc<dyn WeavingHook>)> = self
            .hooks
            .read()
            .iter()
            .filter(|(id, _)| !denied.contains(id))
            .map(|(id, entry)| (*id, entry.ranking, Arc::clone(&entry.hook)))
            .collect();
        hooks.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        WeavingContext {
            registry: self,
            bundle,
            hooks: hooks.into_iter().map(|(id, _, hook)| (id, hook)).collect(),
        }
    }
}

/// Explicit per-weave context
pub struct WeavingContext<'a> {
    registry: &'a WeavingHooks,
    bundle: BundleId,
    hooks: Vec<(WeavingHookId, Arc<dyn WeavingHook>)>,
}

impl WeavingContext<'_> {
    pub fn hook_ids(&self) -> Vec<WeavingHookId> {
        self.hooks.iter().map(|(id, _)| *id).collect()
    }

    /// Run every hook over the class; the first failure aborts the weave
    pub fn weave(&self, class_name: &str, bytes: Vec<u8>) -> Result<WovenClass, FrameworkError> {
        let mut class = WovenClass::new(class_name, self.bundle, bytes);
        for (id, hook) in &self.hooks {
            // Denied by a concurrent weave since the snapshot
            if self.registry.is_denied(*id) {
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| hook.weave(&mut class)));
            let source: HookError = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.into(),
                Err(_) => "weaving hook panicked".into(),
            };
            warn!(
                "Weaving hook {:?} failed on {}; denying it: {}",
                id, class_name, source
            );
            self.registry.deny(*id);
            return Err(FrameworkError::Weaving {
                class: class_name.to_string(),
                hook: id.0,
                source,
            });
        }
        class.complete = true;
        Ok(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hooks_run_by_ranking() {
        let hooks = WeavingHooks::new();
        hooks.register(
            BundleId(1),
            0,
            Arc::new(|c: &mut WovenClass| -> anyhow::Result<()> {
                let mut bytes = c.bytes().to_vec();
                bytes.push(b'l');
                c.set_bytes(bytes)?;
                Ok(())
            }),
        );
        hooks.register(
            BundleId(2),
            10,
            Arc::new(|c: &mut WovenClass| -> anyhow::Result<()> {
                let mut bytes = c.bytes().to_vec();
                bytes.push(b'h');
                c.set_bytes(bytes)?;
                c.add_dynamic_import("org.example.trace")?;
                Ok(())
            }),
        );

        let woven = hooks.context(BundleId(3)).weave("Foo", Vec::new()).unwrap();
        assert_eq!(woven.bytes(), b"hl");
        assert_eq!(woven.dynamic_imports(), ["org.example.trace".to_string()]);
        assert!(woven.is_complete());

        let mut woven = woven;
        assert!(woven.set_bytes(Vec::new()).is_err());
    }

    #[test]
    fn test_failing_hook_is_denied() {
        let hooks = WeavingHooks::new();
        let bad = hooks.register(
            BundleId(1),
            5,
            Arc::new(|_: &mut WovenClass| -> anyhow::Result<()> { anyhow::bail!("nope") }),
        );
        let good = hooks.register(BundleId(1), 0, Arc::new(|_: &mut WovenClass| -> anyhow::Result<()> { Ok(()) }));

        let err = hooks.context(BundleId(2)).weave("Foo", Vec::new()).unwrap_err();
        assert!(matches!(err, FrameworkError::Weaving { hook, .. } if hook == bad.0));
        assert!(hooks.is_denied(bad));

        let context = hooks.context(BundleId(2));
        assert_eq!(context.hook_ids(), vec![good]);
        assert!(context.weave("Foo", Vec::new()).is_ok());
    }

    #[test]
    fn test_unregister_all_by_owner() {
        let hooks = WeavingHooks::new();
        hooks.register(BundleId(1), 0, Arc::new(|_: &mut WovenClass| -> anyhow::Result<()> { Ok(()) }));
        hooks.register(BundleId(2), 0, Arc::new(|_: &mut WovenClass| -> anyhow::Result<()> { Ok(()) }));
        assert_eq!(hooks.unregister_all(BundleId(1)), 1);
        assert_eq!(hooks.context(BundleId(9)).hook_ids().len(), 1);
    }
}
