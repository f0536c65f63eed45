//! Framework API surfaces consumed by bundles: events and services

pub mod events;
pub mod services;

pub use events::{
    BundleEvent, BundleEventKind, BundleListener, FrameworkEvent, FrameworkEventKind,
    FrameworkEvents, FrameworkListener, ListenerId,
};
pub use services::{ServiceId, ServiceObject, ServiceReference, ServiceRegistry};
