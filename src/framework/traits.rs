//! Framework core types and errors
//!
//! Defines bundle identity, lifecycle states, operation options and the
//! error types every framework operation returns.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Bundle identifier (unique for the lifetime of the framework, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BundleId(pub u64);

impl BundleId {
    /// The system bundle; never user-installable
    pub const SYSTEM: BundleId = BundleId(0);
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Revision arena identifier
///
/// Allocated from a single framework-wide counter, so ids are unique and
/// strictly increasing across all bundles as well as within one bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionId(pub u64);

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Bundle lifecycle state
///
/// ```text
/// INSTALLED -> RESOLVED -> STARTING -> ACTIVE -> STOPPING -> RESOLVED
///      ^__________|  (unresolve)
/// any state -> UNINSTALLED (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BundleState {
    /// Installed but not resolved
    Installed,
    /// All mandatory requirements are wired
    Resolved,
    /// Activation hook is running
    Starting,
    /// Running normally
    Active,
    /// Deactivation hook is running
    Stopping,
    /// Removed from the framework; terminal
    Uninstalled,
}

impl BundleState {
    /// Check whether a state change is legal
    pub fn can_transition_to(&self, target: BundleState) -> bool {
        use BundleState::*;
        match (self, target) {
            (Uninstalled, _) => false,
            (_, Uninstalled) => true,
            // unresolve is legal from any live state
            (_, Installed) => true,
            (Installed, Resolved) | (Stopping, Resolved) => true,
            (Resolved, Starting) => true,
            (Starting, Active) | (Starting, Stopping) => true,
            (Active, Stopping) => true,
            _ => false,
        }
    }

    /// ACTIVE, STARTING or STOPPING
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            BundleState::Active | BundleState::Starting | BundleState::Stopping
        )
    }
}

impl fmt::Display for BundleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BundleState::Installed => "INSTALLED",
            BundleState::Resolved => "RESOLVED",
            BundleState::Starting => "STARTING",
            BundleState::Active => "ACTIVE",
            BundleState::Stopping => "STOPPING",
            BundleState::Uninstalled => "UNINSTALLED",
        };
        f.write_str(name)
    }
}

/// Options for `start`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Do not record the persistent autostart flag
    pub transient: bool,
}

impl StartOptions {
    pub const TRANSIENT: StartOptions = StartOptions { transient: true };
}

/// Options for `stop`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopOptions {
    /// Do not clear the persistent autostart flag
    pub transient: bool,
}

impl StopOptions {
    pub const TRANSIENT: StopOptions = StopOptions { transient: true };
}

/// Error raised by user code (activation hooks, listeners, weaving hooks)
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Framework errors
#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Bundle not installed: {0}")]
    NotInstalled(String),

    #[error("Invalid bundle context: {0}")]
    InvalidContext(String),

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid bundle metadata: {0}")]
    InvalidMetadata(String),

    #[error("Weaving hook {hook} failed for class {class}")]
    Weaving {
        class: String,
        hook: u64,
        #[source]
        source: HookError,
    },

    #[error("Timeout waiting for {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Framework is shut down")]
    Shutdown,
}

impl FrameworkError {
    /// Wrap an I/O failure raised while materialising bundle content
    pub fn storage(message: impl Into<String>, source: std::io::Error) -> Self {
        FrameworkError::Storage {
            message: message.into(),
            source,
        }
    }
}

/// Lifecycle errors (illegal transitions and activation hook failures)
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Invalid state transition for {bundle}: {from} -> {to}")]
    InvalidTransition {
        bundle: String,
        from: BundleState,
        to: BundleState,
    },

    #[error("Cannot start bundle: {bundle}")]
    ActivatorFailed {
        bundle: String,
        #[source]
        source: HookError,
    },

    #[error("Error during stop of bundle: {bundle}")]
    DeactivatorFailed {
        bundle: String,
        #[source]
        source: HookError,
    },

    #[error("Cannot load activator {name} for bundle {bundle}")]
    ActivatorNotFound {
        bundle: String,
        name: String,
        #[source]
        source: HookError,
    },

    #[error("Cannot change symbolic name of {bundle} from {expected} to {found}")]
    IdentityChanged {
        bundle: String,
        expected: String,
        found: String,
    },

    #[error("Bundle uninstalled during activator stop: {0}")]
    UninstalledDuringStop(String),

    #[error("Bundle {bundle} left STARTING during activation (now {state})")]
    StateChangedDuringStart { bundle: String, state: BundleState },

    #[error("Cannot start {bundle} transiently: start level {level} is above framework level {framework_level}")]
    StartLevelNotReached {
        bundle: String,
        level: u32,
        framework_level: u32,
    },
}

/// A requirement nobody could satisfy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsatisfiedRequirement {
    pub revision: RevisionId,
    pub bundle: String,
    pub requirement: String,
}

/// Resolution failure; always names at least one unsatisfied requirement
#[derive(Debug, Clone, Error)]
#[error("Unable to resolve {bundle}: missing requirement {requirement}")]
pub struct ResolutionError {
    pub bundle: String,
    pub requirement: String,
    /// Every requirement that failed in the same resolution attempt
    pub unsatisfied: Vec<UnsatisfiedRequirement>,
    /// Revisions the same attempt did manage to admit
    pub admitted: Vec<RevisionId>,
}

impl ResolutionError {
    pub fn new(first: UnsatisfiedRequirement, unsatisfied: Vec<UnsatisfiedRequirement>) -> Self {
        Self {
            bundle: first.bundle,
            requirement: first.requirement,
            unsatisfied,
            admitted: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninstalled_is_terminal() {
        use BundleState::*;
        for target in [Installed, Resolved, Starting, Active, Stopping, Uninstalled] {
            assert!(!Uninstalled.can_transition_to(target));
        }
    }

    #[test]
    fn test_start_stop_cycle_transitions() {
        use BundleState::*;
        assert!(Installed.can_transition_to(Resolved));
        assert!(Resolved.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Active));
        assert!(Active.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Resolved));

        assert!(!Installed.can_transition_to(Active));
        assert!(!Active.can_transition_to(Resolved));
        assert!(!Resolved.can_transition_to(Active));
    }

    #[test]
    fn test_unresolve_legal_from_live_states() {
        use BundleState::*;
        for from in [Installed, Resolved, Starting, Active, Stopping] {
            assert!(from.can_transition_to(Installed));
            assert!(from.can_transition_to(Uninstalled));
        }
    }

    #[test]
    fn test_resolution_error_names_requirement() {
        let first = UnsatisfiedRequirement {
            revision: RevisionId(3),
            bundle: "org.example.client:1.0.0".to_string(),
            requirement: "package:org.example.api;version=[1.0.0,2.0.0)".to_string(),
        };
        let err = ResolutionError::new(first.clone(), vec![first]);
        let message = err.to_string();
        assert!(message.contains("org.example.client"));
        assert!(message.contains("org.example.api"));
    }
}
