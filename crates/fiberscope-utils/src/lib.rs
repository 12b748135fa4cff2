//! # Fiberscope Utilities
//!
//! Shared utilities and logging for the Fiberscope workspace.
//!
//! The interesting part is the logging setup built on `tracing`: inspection
//! runs inside a debugger session, so logs must be able to go to a file
//! instead of interleaving with the fiber tables printed on stdout.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{LogFormat, LogLevel, init_logging, init_logging_to_file, init_logging_with_level};
pub use tracing::{debug, error, info, trace, warn};
