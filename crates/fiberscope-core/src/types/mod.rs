//! # Types
//!
//! Host-agnostic types used throughout the inspector.
//!
//! These types abstract away the host debugger's representation, allowing the
//! rest of the inspector to work with concepts like "fiber handle" and
//! "register context" without knowing whether the session is backed by gdb,
//! lldb, or a test double.

pub mod address;
pub mod context;
pub mod fiber;
pub mod symbols;

// Re-export all public types
pub use address::Address;
pub use context::RegisterContext;
pub use fiber::{FiberHandle, OsThreadId};
pub use symbols::{SourceLocation, SymbolName};
