//! # Target runtime layout contract
//!
//! The fiber runtime publishes a handful of symbols and fixed byte offsets
//! that make debugging possible: a ring anchor for enumerating live fibers,
//! a per-fiber persisted stack pointer, and the positions of the saved frame
//! and instruction pointers inside the register area a fiber pushes when it
//! yields. These are a version-pinned contract with the target; a mismatch
//! is a silent-corruption risk, which is why [`RuntimeLayout`] carries an
//! optional version probe.

use crate::error::{InspectError, InspectResult};
use crate::target::TargetMemory;
use crate::types::Address;

/// Hard cap on ring traversal, so a corrupted list cannot hang the session.
pub const MAX_RING_NODES: usize = 1 << 20;

/// Upper bound on frames walked for one backtrace.
pub const MAX_BACKTRACE_FRAMES: usize = 256;

/// Symbol names and byte offsets of the target's fiber-debugging metadata
///
/// The defaults match the runtime's published debug contract: the anchor node lives at
/// `_fiber_debug_ring` with its intrusive `next` pointer at offset 0, the
/// fiber object stores its persisted stack pointer at offset 0, and a
/// yielded fiber's stack holds the saved frame pointer 40 bytes past the
/// persisted stack pointer with the saved instruction pointer 8 bytes after
/// that (the callee-saved register push is six words deep).
///
/// ## Version probe
///
/// Targets that publish `_fiber_debug_layout_version` get their layout
/// verified at catalog-build time; a mismatch fails with
/// [`UnsupportedTarget`](InspectError::UnsupportedTarget) instead of silently
/// misreading registers. Targets without the symbol are trusted as-is, which
/// preserves compatibility with runtimes predating the version word.
#[derive(Debug, Clone)]
pub struct RuntimeLayout
{
    /// Symbol naming the ring anchor node.
    pub anchor_symbol: String,
    /// Symbol naming the optional layout version word.
    pub version_symbol: String,
    /// Layout version this inspector understands.
    pub expected_version: u64,
    /// Offset of the intrusive `next` pointer within a ring node.
    pub link_next_offset: u64,
    /// Offset of the persisted stack pointer field within a fiber object.
    pub stack_pointer_offset: u64,
    /// Offset of the saved frame pointer past the persisted stack pointer.
    pub saved_fp_offset: u64,
    /// Offset of the saved instruction pointer past the persisted stack pointer.
    pub saved_ip_offset: u64,
}

impl Default for RuntimeLayout
{
    fn default() -> Self
    {
        Self {
            anchor_symbol: "_fiber_debug_ring".to_string(),
            version_symbol: "_fiber_debug_layout_version".to_string(),
            expected_version: 1,
            link_next_offset: 0,
            stack_pointer_offset: 0,
            saved_fp_offset: 40,
            saved_ip_offset: 48,
        }
    }
}

impl RuntimeLayout
{
    /// Locate the ring anchor, failing for targets without fiber support
    ///
    /// Also runs the version probe when the target publishes one.
    ///
    /// ## Errors
    ///
    /// - `UnsupportedTarget`: the anchor symbol is absent, or the published
    ///   layout version differs from [`expected_version`](Self::expected_version).
    /// - `MemoryRead`: the version word exists but could not be read.
    pub fn locate_anchor<M: TargetMemory + ?Sized>(&self, memory: &M) -> InspectResult<Address>
    {
        let Some(anchor) = memory.resolve_symbol(&self.anchor_symbol) else {
            return Err(InspectError::UnsupportedTarget(format!(
                "anchor symbol `{}` not found",
                self.anchor_symbol
            )));
        };

        if let Some(version_addr) = memory.resolve_symbol(&self.version_symbol) {
            let version = memory.read_word(version_addr)?;
            if version != self.expected_version {
                return Err(InspectError::UnsupportedTarget(format!(
                    "saved-stack layout version {version} (inspector supports {})",
                    self.expected_version
                )));
            }
        }

        Ok(anchor)
    }
}
