//! BLLVM Framework - dynamic bundle framework
//!
//! This crate hosts dynamically installed modules ("bundles"). It tracks
//! each bundle's lifecycle state, wires bundles to each other through
//! exported and imported capabilities, and manages coexisting revisions
//! across update and refresh.
//!
//! ## Design Principles
//!
//! 1. **Immutable revisions**: bundle content is never mutated in place;
//!    update creates a new revision and refresh promotes it
//! 2. **Atomic wiring**: a revision is wired completely or not at all
//! 3. **Serialized transitions**: one lock per bundle spans each transition,
//!    activation hooks included
//! 4. **Isolated user code**: hook, listener and weaving failures are
//!    contained and reported, never left half-applied

pub mod config;
pub mod framework;
pub mod utils;

pub use config::*;
pub use framework::{
    BundleContext, BundleId, BundleInfo, BundleState, Framework, FrameworkBuilder,
    FrameworkError, LifecycleError, ResolutionError, RevisionId, StartOptions, StopOptions,
};

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const MANIFEST: &str = r#"
symbolic_name = "org.example.hello"
version = "1.0.0"
"#;

    #[test]
    fn test_framework_integration() {
        let framework = Framework::new(FrameworkConfig::default()).unwrap();
        let id = framework
            .install("mem:hello", Some(Bytes::from_static(MANIFEST.as_bytes())))
            .unwrap();
        framework.start(id, StartOptions::default()).unwrap();
        assert_eq!(framework.state(id), Some(BundleState::Active));

        framework.shutdown();
        assert_eq!(framework.state(id), Some(BundleState::Resolved));
        assert!(matches!(
            framework.install("mem:other", Some(Bytes::from_static(MANIFEST.as_bytes()))),
            Err(FrameworkError::Shutdown)
        ));
    }
}
