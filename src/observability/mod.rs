//! # Observability
//!
//! Structured logging for the provisioning engine.

pub mod logging;

pub use logging::{init_logging, log_settings};
