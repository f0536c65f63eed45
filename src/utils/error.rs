//! Error handling utilities for side-effect failures
//!
//! Failures the framework triggers on its own (teardown of a retired
//! revision, listing storage) are logged and execution continues.

use tracing::warn;

/// Execute an operation and log errors without failing
///
/// Returns `Some(T)` on success, `None` on error (after logging).
///
/// # Example
/// ```rust,ignore
/// use crate::utils::log_error;
///
/// log_error(|| storage.delete_storage_state(&state), "Failed to delete storage state");
/// ```
pub fn log_error<F, T, E>(operation: F, context: &str) -> Option<T>
where
    F: FnOnce() -> Result<T, E>,
    E: std::fmt::Display,
{
    match operation() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}: {}", context, e);
            None
        }
    }
}

/// Convert a Result to an Option, logging the error
pub fn result_to_option<T, E>(result: Result<T, E>, context: &str) -> Option<T>
where
    E: std::fmt::Display,
{
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}: {}", context, e);
            None
        }
    }
}
