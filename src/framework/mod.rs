//! Bundle framework core
//!
//! Dynamic modules ("bundles") are installed from a location, resolved
//! against each other's exported capabilities, and started and stopped
//! through activation hooks.
//!
//! ## Architecture
//!
//! - **Revision arena**: bundle content is held in immutable revisions;
//!   bundles refer to their current and latest revision by id
//! - **Single resolution lock**: wiring decisions are made atomically
//! - **Per-bundle transition lock**: transitions of one bundle are
//!   serialized, hooks included; hooks may re-enter the framework
//! - **Ordered events**: listeners see one total order; failures are isolated

pub mod activator;
pub mod api;
pub mod bundle;
pub mod context;
pub mod deployment;
pub mod lifecycle;
pub mod manager;
pub mod resolver;
pub mod revision;
pub mod storage;
pub mod tracker;
pub mod traits;
pub mod weaving;

pub use activator::{
    Activator, ActivatorLoader, ActivatorRegistry, BundleActivator, ModuleActivator, ModuleContext,
};
pub use api::{
    BundleEvent, BundleEventKind, BundleListener, FrameworkEvent, FrameworkEventKind,
    FrameworkListener, ListenerId, ServiceId, ServiceObject, ServiceReference,
};
pub use bundle::{BundleInfo, RevisionInfo};
pub use context::{BundleContext, ServiceRegistration};
pub use deployment::{
    ActivatorDecl, ActivatorKind, BundleManifest, BundleMetadata, Deployment, DeploymentProvider,
    ManifestDeploymentProvider,
};
pub use manager::{Framework, FrameworkBuilder};
pub use resolver::{Capability, Requirement, ResolutionReport, Version, VersionRange, Wire};
pub use storage::{BundleStorage, StorageState};
pub use tracker::{FutureState, StartTracker, TrackerStatus};
pub use traits::{
    BundleId, BundleState, FrameworkError, LifecycleError, ResolutionError, RevisionId,
    StartOptions, StopOptions,
};
pub use weaving::{WeavingHook, WeavingHookId, WovenClass};
