//! # Faultline Utilities
//!
//! Shared helpers for faultline hosts, mainly `tracing` logging setup.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
