//! Bundle context
//!
//! The capability surface handed to a bundle while it runs. A context is
//! created when the bundle enters STARTING and invalidated when it leaves
//! STOPPING; every call checks validity first.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::framework::api::{
    BundleListener, FrameworkListener, ListenerId, ServiceId, ServiceObject, ServiceReference,
    ServiceRegistry,
};
use crate::framework::bundle::BundleInfo;
use crate::framework::manager::{Framework, FrameworkInner};
use crate::framework::traits::{BundleId, FrameworkError};
use crate::framework::weaving::{WeavingHook, WeavingHookId};

pub struct BundleContext {
    bundle: BundleId,
    framework: Weak<FrameworkInner>,
    valid: AtomicBool,
}

impl BundleContext {
    pub(crate) fn new(bundle: BundleId, framework: Weak<FrameworkInner>) -> Self {
        Self {
            bundle,
            framework,
            valid: AtomicBool::new(true),
        }
    }

    pub fn bundle_id(&self) -> BundleId {
        self.bundle
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> Result<Arc<FrameworkInner>, FrameworkError> {
        if !self.is_valid() {
            return Err(FrameworkError::InvalidContext(format!(
                "context of bundle {} is no longer valid",
                self.bundle
            )));
        }
        self.framework.upgrade().ok_or_else(|| {
            FrameworkError::InvalidContext(format!(
                "framework of bundle {} has been dropped",
                self.bundle
            ))
        })
    }

    /// Handle to the owning framework, for lifecycle calls
    pub fn framework(&self) -> Result<Framework, FrameworkError> {
        self.check().map(Framework::from_inner)
    }

    /// The bundle this context belongs to
    pub fn bundle(&self) -> Result<BundleInfo, FrameworkError> {
        self.get_bundle(self.bundle)?
            .ok_or_else(|| FrameworkError::NotInstalled(self.bundle.to_string()))
    }

    pub fn get_bundle(&self, id: BundleId) -> Result<Option<BundleInfo>, FrameworkError> {
        Ok(Framework::from_inner(self.check()?).bundle(id))
    }

    pub fn bundles(&self) -> Result<Vec<BundleInfo>, FrameworkError> {
        Ok(Framework::from_inner(self.check()?).bundles())
    }

    pub fn install(&self, location: &str, content: Option<Bytes>) -> Result<BundleId, FrameworkError> {
        Framework::from_inner(self.check()?).install(location, content)
    }

    /// Framework property from config
    pub fn property(&self, key: &str) -> Result<Option<String>, FrameworkError> {
        Ok(self.check()?.config.properties.get(key).cloned())
    }

    pub fn register_service(
        &self,
        interface: &str,
        properties: BTreeMap<String, String>,
        object: ServiceObject,
    ) -> Result<ServiceRegistration, FrameworkError> {
        let inner = self.check()?;
        let reference = inner
            .services
            .register(self.bundle, interface, properties, object);
        Ok(ServiceRegistration {
            reference,
            registry: Arc::downgrade(&inner.services),
        })
    }

    pub fn service_references(&self, interface: &str) -> Result<Vec<ServiceReference>, FrameworkError> {
        Ok(self.check()?.services.references(interface))
    }

    pub fn service(&self, reference: &ServiceReference) -> Result<Option<ServiceObject>, FrameworkError> {
        Ok(self.check()?.services.get(reference))
    }

    pub fn add_bundle_listener(
        &self,
        listener: Arc<dyn BundleListener>,
    ) -> Result<ListenerId, FrameworkError> {
        Ok(self.check()?.events.add_bundle_listener(self.bundle, listener))
    }

    pub fn add_framework_listener(
        &self,
        listener: Arc<dyn FrameworkListener>,
    ) -> Result<ListenerId, FrameworkError> {
        Ok(self
            .check()?
            .events
            .add_framework_listener(self.bundle, listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> Result<bool, FrameworkError> {
        Ok(self.check()?.events.remove_listener(id))
    }

    pub fn register_weaving_hook(
        &self,
        ranking: i32,
        hook: Arc<dyn WeavingHook>,
    ) -> Result<WeavingHookId, FrameworkError> {
        Ok(self.check()?.weaving.register(self.bundle, ranking, hook))
    }
}

impl fmt::Debug for BundleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleContext")
            .field("bundle", &self.bundle)
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Returned by `register_service`; unregisters on request
#[derive(Debug, Clone)]
pub struct ServiceRegistration {
    reference: ServiceReference,
    registry: Weak<ServiceRegistry>,
}

impl ServiceRegistration {
    pub fn reference(&self) -> &ServiceReference {
        &self.reference
    }

    pub fn id(&self) -> ServiceId {
        self.reference.id
    }

    /// Returns false if the service was already gone
    pub fn unregister(&self) -> bool {
        self.registry
            .upgrade()
            .map_or(false, |registry| registry.unregister(self.reference.id))
    }
}
