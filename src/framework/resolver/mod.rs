//! Dependency resolution
//!
//! Capabilities and requirements, the wire graph and the resolver that
//! admits candidate revisions into it.

pub mod capability;
#[allow(clippy::module_inception)]
pub mod resolver;
pub mod version;
pub mod wiring;

pub use capability::{Capability, Requirement, BUNDLE_NAMESPACE, PACKAGE_NAMESPACE};
pub use resolver::{ResolutionReport, Resolver};
pub use version::{Version, VersionRange};
pub use wiring::{Wire, WireGraph};
