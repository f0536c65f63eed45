//! Utilities: logging setup, log-and-continue error helpers, timeouts

pub mod error;
pub mod logging;
pub mod timeout;

pub use error::{log_error, result_to_option};
pub use logging::{init_logging, init_logging_from_config};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use timeout::{with_custom_timeout, with_timeout, DEFAULT_TRANSITION_TIMEOUT};
