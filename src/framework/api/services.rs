//! Service bookkeeping
//!
//! Keeps track of which bundle registered which service so the lifecycle
//! can release them on stop. Matching is by exact interface name.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::framework::traits::BundleId;

pub type ServiceObject = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceId(pub u64);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "service.{}", self.0)
    }
}

/// Handle describing one registered service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReference {
    pub id: ServiceId,
    pub interface: String,
    pub bundle: BundleId,
    pub properties: BTreeMap<String, String>,
}

struct ServiceEntry {
    reference: ServiceReference,
    object: ServiceObject,
}

pub struct ServiceRegistry {
    next_id: AtomicU64,
    services: RwLock<BTreeMap<ServiceId, ServiceEntry>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            services: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register(
        &self,
        bundle: BundleId,
        interface: impl Into<String>,
        properties: BTreeMap<String, String>,
        object: ServiceObject,
    ) -> ServiceReference {
        let id = ServiceId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let reference = ServiceReference {
            id,
            interface: interface.into(),
            bundle,
            properties,
        };
        debug!(
            "Bundle {} registered {} as {}",
            bundle, reference.interface, id
        );
        self.services.write().insert(
            id,
            ServiceEntry {
                reference: reference.clone(),
                object,
            },
        );
        reference
    }

    pub fn unregister(&self, id: ServiceId) -> bool {
        self.services.write().remove(&id).is_some()
    }

    /// Unregister every service of a bundle; returns how many were removed
    pub fn unregister_all(&self, bundle: BundleId) -> usize {
        let mut services = self.services.write();
        let ids: BTreeSet<ServiceId> = services
            .values()
            .filter(|e| e.reference.bundle == bundle)
            .map(|e| e.reference.id)
            .collect();
        for id in &ids {
            services.remove(id);
        }
        if !ids.is_empty() {
            debug!("Unregistered {} service(s) of bundle {}", ids.len(), bundle);
        }
        ids.len()
    }

    /// References for an interface, oldest registration first
    pub fn references(&self, interface: &str) -> Vec<ServiceReference> {
        self.services
            .read()
            .values()
            .filter(|e| e.reference.interface == interface)
            .map(|e| e.reference.clone())
            .collect()
    }

    pub fn registered_by(&self, bundle: BundleId) -> Vec<ServiceReference> {
        self.services
            .read()
            .values()
            .filter(|e| e.reference.bundle == bundle)
            .map(|e| e.reference.clone())
            .collect()
    }

    pub fn get(&self, reference: &ServiceReference) -> Option<ServiceObject> {
        self.services
            .read()
            .get(&reference.id)
            .map(|e| Arc::clone(&e.object))
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
