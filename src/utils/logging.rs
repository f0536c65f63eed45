//! Logging initialisation for hosts embedding the framework
//!
//! - Respects the RUST_LOG environment variable (it always wins)
//! - Falls back to the filter from `LoggingConfig`, then to "info"
//! - `NO_COLOR` disables ANSI output
//!
//! # Usage
//! ```rust,ignore
//! use bllvm_framework::utils::init_logging;
//!
//! init_logging(Some("bllvm_framework=debug"));
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pick the filter: RUST_LOG, then the configured filter, then "info"
fn build_filter(filter: Option<&str>) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::new(filter.unwrap_or("info"))
}

/// Initialize human-readable logging on stderr
///
/// # Arguments
/// * `filter` - Optional log filter from config (e.g. "info",
///   "bllvm_framework::framework::resolver=trace"). Ignored when RUST_LOG is set.
pub fn init_logging(filter: Option<&str>) {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(build_filter(filter))
        .init();
}

/// Initialize logging with JSON output, for log aggregation systems
#[cfg(feature = "json-logging")]
pub fn init_json_logging(filter: Option<&str>) {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(build_filter(filter))
        .init();
}

/// Initialize logging from `FrameworkConfig::logging`
///
/// JSON output needs the `json-logging` feature; without it the
/// human-readable format is used.
pub fn init_logging_from_config(config: Option<&crate::config::LoggingConfig>) {
    let filter = config.and_then(|c| c.filter.as_deref());

    if config.map(|c| c.json_format).unwrap_or(false) {
        #[cfg(feature = "json-logging")]
        {
            init_json_logging(filter);
        }
        #[cfg(not(feature = "json-logging"))]
        {
            init_logging(filter);
        }
    } else {
        init_logging(filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_filter_is_accepted() {
        // Only builds the filter; installing a global subscriber would
        // conflict with other tests
        if std::env::var("RUST_LOG").is_err() {
            let filter = build_filter(Some("bllvm_framework=debug"));
            assert!(filter.to_string().contains("bllvm_framework=debug"));
        }
    }
}
