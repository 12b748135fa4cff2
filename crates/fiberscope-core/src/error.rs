//! # Error Types
//!
//! General error handling for the inspector.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

use crate::types::{Address, FiberHandle};

/// Main error type for inspector operations
///
/// This enum represents all the ways an inspection operation can fail.
///
/// ## Error Categories
///
/// 1. **Systemic**: `UnsupportedTarget`. The target was not built with fiber
///    debugging metadata; every fiber command degrades to "unavailable" for
///    the rest of the session attempt.
/// 2. **Per-fiber**: `Unavailable`. One fiber's register context cannot be
///    determined. Batch operations (listing, grouping) degrade gracefully
///    instead of aborting.
/// 3. **Operator input**: `IndexOutOfRange`. A catalog index past the end.
/// 4. **Host plumbing**: `MemoryRead`, `Session`. Raw failures from the
///    capability traits. The context resolver converts these to `Unavailable`
///    at its boundary; they only surface directly from catalog building and
///    state restoration.
#[derive(Error, Debug)]
pub enum InspectError
{
    /// The target was not built with fiber-debugging metadata
    ///
    /// Detected by the absence of the ring anchor symbol, or by a saved-stack
    /// layout version that does not match the one this inspector understands.
    /// The string names the symbol or version that failed the check.
    #[error("no fiber debugging support in target: {0}")]
    UnsupportedTarget(String),

    /// A specific fiber's register context cannot be determined
    ///
    /// Typical cause: the fiber's persisted stack pointer is null (it is
    /// executing on an OS thread this session cannot observe) and it is not
    /// in the active map. Also produced when any memory read inside the
    /// resolver fails; the context is never silently defaulted to zero.
    #[error("cannot resolve register context for fiber {0}")]
    Unavailable(FiberHandle),

    /// An operator-supplied catalog index exceeds the catalog size
    #[error("fiber {index} does not exist (catalog has {len} entries)")]
    IndexOutOfRange
    {
        /// The requested index.
        index: usize,
        /// Number of entries in the current catalog.
        len: usize,
    },

    /// A read from target memory failed
    #[error("failed to read target memory at {address}: {details}")]
    MemoryRead
    {
        /// The address the read was issued against.
        address: Address,
        /// Host-specific failure detail.
        details: String,
    },

    /// The host session rejected a thread/register/frame operation
    #[error("inspection session error: {0}")]
    Session(String),
}

/// Convenience type alias for `Result<T, InspectError>`
///
/// ```rust
/// use fiberscope_core::error::InspectResult;
/// fn foo() -> InspectResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type InspectResult<T> = std::result::Result<T, InspectError>;
