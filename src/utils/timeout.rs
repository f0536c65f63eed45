//! Timeout wrappers for bounded waits
//!
//! Lifecycle operations never time out on their own; callers that need a
//! deadline wrap the wait for a state change in one of these. The
//! configurable bound is `FrameworkConfig::transition_timeout_secs`:
//!
//! ```rust,ignore
//! let bound = config.transition_timeout();
//! with_custom_timeout(wait_for_active, bound).await
//! ```

use std::time::Duration;
use tokio::time::{timeout, Timeout};

/// Apply timeout to a future
pub fn with_timeout<F>(future: F, duration: Duration) -> Timeout<F>
where
    F: std::future::Future,
{
    timeout(duration, future)
}

/// Fallback bound for state-transition waits when no config is at hand
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);

/// Execute operation with custom timeout
pub async fn with_custom_timeout<F, T>(
    operation: F,
    duration: Duration,
) -> Result<T, tokio::time::error::Elapsed>
where
    F: std::future::Future<Output = T>,
{
    timeout(duration, operation).await
}
