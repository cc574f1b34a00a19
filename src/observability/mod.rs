//! # Observability Infrastructure
//!
//! Structured logging and distributed tracing for the tenant secret service.

pub mod logging;
pub mod tracing;

pub use logging::log_config_info;
pub use self::tracing::{build_env_filter, init_tracing, shutdown_tracing};
