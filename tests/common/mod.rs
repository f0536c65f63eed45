//! Shared fixtures for framework integration tests

#![allow(dead_code)]

use bllvm_framework::framework::api::{
    BundleEvent, BundleEventKind, BundleListener, FrameworkEvent, FrameworkEventKind,
    FrameworkListener,
};
use bllvm_framework::framework::resolver::{Capability, Requirement, VersionRange};
use bllvm_framework::framework::{
    ActivatorDecl, ActivatorKind, ActivatorRegistry, BundleActivator, BundleContext,
    BundleManifest, ManifestDeploymentProvider, Version,
};
use bllvm_framework::{BundleId, Framework, FrameworkConfig};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub type Hook = Arc<dyn Fn(&BundleContext) -> anyhow::Result<()> + Send + Sync>;

/// Behaviour of a scripted activator, shared by every instance built
#[derive(Clone, Default)]
pub struct Script {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    pub fail_start: Arc<AtomicBool>,
    pub fail_stop: Arc<AtomicBool>,
    pub panic_start: Arc<AtomicBool>,
    pub on_start: Arc<Mutex<Option<Hook>>>,
    pub on_stop: Arc<Mutex<Option<Hook>>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn set_on_start(&self, hook: impl Fn(&BundleContext) -> anyhow::Result<()> + Send + Sync + 'static) {
        *self.on_start.lock() = Some(Arc::new(hook));
    }

    pub fn set_on_stop(&self, hook: impl Fn(&BundleContext) -> anyhow::Result<()> + Send + Sync + 'static) {
        *self.on_stop.lock() = Some(Arc::new(hook));
    }
}

struct ScriptedActivator {
    script: Script,
}

impl BundleActivator for ScriptedActivator {
    fn start(&self, context: &BundleContext) -> anyhow::Result<()> {
        self.script.starts.fetch_add(1, Ordering::SeqCst);
        self.script
            .calls
            .lock()
            .push(format!("start:{}", context.bundle_id()));
        if self.script.panic_start.load(Ordering::SeqCst) {
            panic!("scripted panic");
        }
        if self.script.fail_start.load(Ordering::SeqCst) {
            anyhow::bail!("scripted start failure");
        }
        let hook = self.script.on_start.lock().clone();
        match hook {
            Some(hook) => hook(context),
            None => Ok(()),
        }
    }

    fn stop(&self, context: &BundleContext) -> anyhow::Result<()> {
        self.script.stops.fetch_add(1, Ordering::SeqCst);
        self.script
            .calls
            .lock()
            .push(format!("stop:{}", context.bundle_id()));
        let hook = self.script.on_stop.lock().clone();
        if let Some(hook) = hook {
            hook(context)?;
        }
        if self.script.fail_stop.load(Ordering::SeqCst) {
            anyhow::bail!("scripted stop failure");
        }
        Ok(())
    }
}

/// Records every bundle and framework event in delivery order
#[derive(Default)]
pub struct EventRecorder {
    pub bundle_events: Mutex<Vec<BundleEvent>>,
    pub framework_events: Mutex<Vec<FrameworkEvent>>,
}

impl EventRecorder {
    pub fn kinds_for(&self, bundle: BundleId) -> Vec<BundleEventKind> {
        self.bundle_events
            .lock()
            .iter()
            .filter(|e| e.bundle == bundle)
            .map(|e| e.kind)
            .collect()
    }

    pub fn framework_kinds(&self) -> Vec<FrameworkEventKind> {
        self.framework_events.lock().iter().map(|e| e.kind).collect()
    }

    pub fn errors_for(&self, bundle: BundleId) -> usize {
        self.framework_events
            .lock()
            .iter()
            .filter(|e| e.kind == FrameworkEventKind::Error && e.bundle == bundle)
            .count()
    }

    pub fn clear(&self) {
        self.bundle_events.lock().clear();
        self.framework_events.lock().clear();
    }
}

impl BundleListener for EventRecorder {
    fn bundle_changed(&self, event: &BundleEvent) -> anyhow::Result<()> {
        self.bundle_events.lock().push(event.clone());
        Ok(())
    }
}

impl FrameworkListener for EventRecorder {
    fn framework_event(&self, event: &FrameworkEvent) -> anyhow::Result<()> {
        self.framework_events.lock().push(event.clone());
        Ok(())
    }
}

pub struct FrameworkFixture {
    pub framework: Framework,
    pub activators: Arc<ActivatorRegistry>,
    pub provider: Arc<ManifestDeploymentProvider>,
    pub events: Arc<EventRecorder>,
}

impl FrameworkFixture {
    pub fn new() -> Self {
        Self::with_config(FrameworkConfig::default())
    }

    pub fn with_config(config: FrameworkConfig) -> Self {
        let activators = Arc::new(ActivatorRegistry::new());
        let provider = Arc::new(ManifestDeploymentProvider::new());
        let framework = Framework::builder(config)
            .with_activator_loader(activators.clone())
            .with_provider(provider.clone())
            .build()
            .unwrap();
        let events = Arc::new(EventRecorder::default());
        framework.add_bundle_listener(events.clone());
        framework.add_framework_listener(events.clone());
        Self {
            framework,
            activators,
            provider,
            events,
        }
    }

    /// Register a scripted activator under `name`
    pub fn script(&self, name: &str) -> Script {
        let script = Script::new();
        let shared = script.clone();
        self.activators.register_bundle_activator(name, move || {
            Box::new(ScriptedActivator {
                script: shared.clone(),
            })
        });
        script
    }

    /// Install under `mem:<symbolic name>`
    pub fn install(&self, manifest: &BundleManifest) -> BundleId {
        self.install_at(&format!("mem:{}", manifest.symbolic_name), manifest)
    }

    pub fn install_at(&self, location: &str, manifest: &BundleManifest) -> BundleId {
        self.framework
            .install(location, Some(content(manifest)))
            .unwrap()
    }
}

pub fn content(manifest: &BundleManifest) -> Bytes {
    Bytes::from(manifest.to_toml_string().unwrap())
}

pub fn manifest(name: &str, version: &str) -> BundleManifest {
    BundleManifest::new(name, version)
}

pub fn with_activator(mut manifest: BundleManifest, name: &str) -> BundleManifest {
    manifest.activator = Some(ActivatorDecl {
        kind: ActivatorKind::Bundle,
        name: name.to_string(),
    });
    manifest
}

pub fn exporting(mut manifest: BundleManifest, package: &str, version: &str) -> BundleManifest {
    let version: Version = version.parse().unwrap();
    manifest.exports.push(Capability::package(package, version));
    manifest
}

pub fn importing(mut manifest: BundleManifest, package: &str, range: &str) -> BundleManifest {
    let range: VersionRange = range.parse().unwrap();
    manifest.imports.push(Requirement::package(package, range));
    manifest
}
