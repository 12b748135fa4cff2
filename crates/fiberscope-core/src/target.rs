//! # Capability traits for the host debugger
//!
//! The inspector never talks to a concrete debugger API. Everything it needs
//! from the host is expressed as two narrow traits:
//!
//! - [`TargetMemory`]: typed reads from the stopped target's address space
//!   plus symbol-to-address resolution.
//! - [`InspectionSession`]: the debugger's global "currently selected OS
//!   thread / register context / stack frame" state, made explicit as an
//!   object instead of ambient globals.
//!
//! Hosts implement these over their scripting surface (gdb, lldb, a core
//! file); tests implement them over an in-memory fake. Every component in
//! this crate depends only on these traits.
//!
//! ## Design Philosophy
//!
//! The trait methods are designed to be:
//! - **Simple**: Each method does one thing
//! - **Explicit**: Clear about what they do and when they can fail
//! - **Restorable**: Everything a component mutates through the session can
//!   be read back first, so the scoped switch can always revert it

use crate::error::InspectResult;
use crate::types::{Address, FiberHandle, OsThreadId, RegisterContext};

/// Typed read access to the stopped target's address space
///
/// All reads are machine-word (8 byte) sized; the fiber runtime's debug
/// contract only ever requires word reads. The target is frozen for the
/// lifetime of any value implementing this trait, so reads are repeatable.
pub trait TargetMemory
{
    /// Read one machine word at `address`
    ///
    /// ## Errors
    ///
    /// - `MemoryRead`: the address is unmapped or the host refused the read.
    ///   Never returns a defaulted value on failure.
    fn read_word(&self, address: Address) -> InspectResult<u64>;

    /// Resolve a symbol name to its address in the target
    ///
    /// Returns `None` when the symbol is not present. Absence of the fiber
    /// ring anchor symbol is how an unsupported target is detected, so this
    /// is deliberately not an error.
    fn resolve_symbol(&self, name: &str) -> Option<Address>;

    /// Read one machine word at a fixed byte offset past `base`
    ///
    /// Convenience wrapper used by the cold-path resolver and ring walker.
    fn read_word_at_offset(&self, base: Address, offset: u64) -> InspectResult<u64>
    {
        self.read_word(base.saturating_add(offset))
    }
}

/// The debugger's singular, mutable selection state, made explicit
///
/// A session models exactly the state a debugger host keeps as ambient
/// globals: which OS thread is selected, that thread's live
/// registers, its thread-local "currently running fiber" indicator, and
/// which stack frame is selected for inspection.
///
/// ## Lifecycle
///
/// A session is only valid while the target is stopped. All fiber state
/// ([`StopState`](crate::catalog::StopState)) must be rebuilt from a fresh
/// session view on every stop event.
///
/// ## Restoration contract
///
/// Every public inspector operation leaves the selected thread, its
/// registers, its fiber indicator, and the selected frame bit-for-bit
/// identical to what it found, including on failure. The only exception is
/// the deliberate manual switch
/// ([`apply_fiber_context`](crate::switch::apply_fiber_context)), which hands
/// the caller a [`RestorePoint`](crate::switch::RestorePoint) it must commit.
pub trait InspectionSession: TargetMemory
{
    /// All OS threads of the stopped target, in host order.
    fn threads(&self) -> Vec<OsThreadId>;

    /// The presently selected OS thread.
    fn selected_thread(&self) -> OsThreadId;

    /// Select `thread` for subsequent register/indicator operations
    ///
    /// ## Errors
    ///
    /// - `Session`: the thread does not exist (e.g. it was reported by an
    ///   earlier enumeration and has since exited).
    fn select_thread(&mut self, thread: OsThreadId) -> InspectResult<()>;

    /// Live register context of the selected thread.
    fn current_registers(&self) -> InspectResult<RegisterContext>;

    /// Overwrite the selected thread's register context
    ///
    /// This is a representational overlay on the host's view of the stopped
    /// target; callers are responsible for reverting it before the target
    /// resumes (the scoped switch does this unconditionally).
    fn set_registers(&mut self, context: &RegisterContext) -> InspectResult<()>;

    /// The selected thread's "currently running fiber" indicator
    ///
    /// Reads the runtime's thread-local current-fiber variable, scoped to the
    /// selected thread.
    fn current_fiber(&self) -> InspectResult<FiberHandle>;

    /// Overwrite the selected thread's "currently running fiber" indicator
    ///
    /// Same overlay semantics as [`set_registers`](Self::set_registers).
    fn set_current_fiber(&mut self, fiber: FiberHandle) -> InspectResult<()>;

    /// Index of the selected stack frame (0 = innermost).
    fn selected_frame(&self) -> usize;

    /// Select the stack frame at `index`
    ///
    /// ## Errors
    ///
    /// - `Session`: the frame index is not valid for the selected thread.
    fn select_frame(&mut self, index: usize) -> InspectResult<()>;

    /// Select the innermost real stack frame of the selected thread
    ///
    /// Register overlays are only well-defined against the innermost frame,
    /// so the scoped switch establishes this baseline before mutating
    /// anything. Infallible: frame 0 always exists on a stopped thread.
    fn select_innermost_frame(&mut self);
}
