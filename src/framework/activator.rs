//! Activation hooks
//!
//! A bundle declares at most one activator. Two protocols are supported:
//! `BundleActivator`, driven with the bundle's own context, and the native
//! `ModuleActivator`, driven through a bridge with a `ModuleContext`. The
//! variant is chosen once at start and kept for the matching stop.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::framework::context::BundleContext;
use crate::framework::deployment::{ActivatorDecl, ActivatorKind};
use crate::framework::revision::Revision;
use crate::framework::traits::{BundleId, HookError};

/// Hook invoked with the bundle's context on start and stop
pub trait BundleActivator: Send + Sync {
    fn start(&self, context: &BundleContext) -> anyhow::Result<()>;
    fn stop(&self, context: &BundleContext) -> anyhow::Result<()>;
}

/// Native activation protocol, unaware of bundle contexts
pub trait ModuleActivator: Send + Sync {
    fn start(&self, context: &ModuleContext) -> anyhow::Result<()>;
    fn stop(&self, context: &ModuleContext) -> anyhow::Result<()>;
}

/// What a bridged module sees of its bundle
#[derive(Debug, Clone)]
pub struct ModuleContext {
    /// `name:version` of the revision being activated
    pub module_id: String,
    pub bundle: BundleId,
    /// Bundle headers
    pub config: HashMap<String, String>,
}

impl ModuleContext {
    pub fn for_revision(revision: &Revision) -> Self {
        Self {
            module_id: revision.metadata().identifier(),
            bundle: revision.bundle(),
            config: revision
                .metadata()
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn get_config(&self, key: &str) -> Option<&String> {
        self.config.get(key)
    }

    pub fn get_config_or(&self, key: &str, default: &str) -> String {
        self.config
            .get(key)
            .map(|s| s.as_str())
            .unwrap_or(default)
            .to_string()
    }
}

/// Dispatch target selected at start
pub enum Activator {
    Direct(Box<dyn BundleActivator>),
    Bridge {
        context: ModuleContext,
        activator: Box<dyn ModuleActivator>,
    },
}

impl Activator {
    pub fn kind(&self) -> ActivatorKind {
        match self {
            Activator::Direct(_) => ActivatorKind::Bundle,
            Activator::Bridge { .. } => ActivatorKind::Module,
        }
    }

    pub fn start(&self, context: &BundleContext) -> anyhow::Result<()> {
        match self {
            Activator::Direct(activator) => activator.start(context),
            Activator::Bridge {
                context: module,
                activator,
            } => activator.start(module),
        }
    }

    pub fn stop(&self, context: &BundleContext) -> anyhow::Result<()> {
        match self {
            Activator::Direct(activator) => activator.stop(context),
            Activator::Bridge {
                context: module,
                activator,
            } => activator.stop(module),
        }
    }
}

/// Loads the activator a revision declares
pub trait ActivatorLoader: Send + Sync {
    fn load(&self, revision: &Revision, decl: &ActivatorDecl) -> Result<Activator, HookError>;
}

type BundleFactory = Arc<dyn Fn() -> Box<dyn BundleActivator> + Send + Sync>;
type ModuleFactory = Arc<dyn Fn() -> Box<dyn ModuleActivator> + Send + Sync>;

/// Name-to-factory loader
///
/// A fresh activator instance is built on every start.
#[derive(Default)]
pub struct ActivatorRegistry {
    bundle: RwLock<HashMap<String, BundleFactory>>,
    module: RwLock<HashMap<String, ModuleFactory>>,
}

impl ActivatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_bundle_activator<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn BundleActivator> + Send + Sync + 'static,
    {
        self.bundle.write().insert(name.into(), Arc::new(factory));
    }

    pub fn register_module_activator<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn ModuleActivator> + Send + Sync + 'static,
    {
        self.module.write().insert(name.into(), Arc::new(factory));
    }
}

impl ActivatorLoader for ActivatorRegistry {
    fn load(&self, revision: &Revision, decl: &ActivatorDecl) -> Result<Activator, HookError> {
        debug!(
            "Loading {:?} activator {} for {}",
            decl.kind, decl.name, revision
        );
        match decl.kind {
            ActivatorKind::Bundle => {
                let factory = self.bundle.read().get(&decl.name).cloned();
                match factory {
                    Some(factory) => Ok(Activator::Direct(factory())),
                    None => Err(format!("no bundle activator registered as {:?}", decl.name).into()),
                }
            }
            ActivatorKind::Module => {
                let factory = self.module.read().get(&decl.name).cloned();
                match factory {
                    Some(factory) => Ok(Activator::Bridge {
                        context: ModuleContext::for_revision(revision),
                        activator: factory(),
                    }),
                    None => Err(format!("no module activator registered as {:?}", decl.name).into()),
                }
            }
        }
    }
}
