//! # Tether Utilities
//!
//! Shared utilities, logging, and formatting helpers for Tether.
//!
//! This crate provides common functionality used across the Tether workspace,
//! including production-ready logging infrastructure built on `tracing` and
//! the hex formatting used by the console front end.

pub mod format;
pub mod logging;

// Re-export commonly used logging functions for convenience
pub use format::format_hexdump;
pub use logging::{init_logging, init_logging_to_file, init_logging_with_level, LogFormat, LogLevel};
pub use tracing::{debug, error, info, trace, warn};
