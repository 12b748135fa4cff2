//! # fiberscope-core
//!
//! Live-process fiber introspection for stopped targets.
//!
//! A target using cooperative user-level scheduling multiplexes many fibers
//! over a few OS threads, so a conventional debugger shows only the handful
//! of stacks that happen to be running. This crate recovers the rest: it
//! enumerates every live fiber from the target's debug ring, resolves each
//! one's register context, and produces backtraces, listings, and
//! stack-similarity groupings, all while guaranteeing the debuggee's real
//! thread state is bit-for-bit untouched afterwards.
//!
//! ## Host integration
//!
//! The crate never talks to a debugger host directly. Embedders implement
//! [`TargetMemory`] (word reads, symbol lookup) and [`InspectionSession`]
//! (thread/register/frame selection) over whatever host they have: a
//! ptrace-based engine, a remote protocol client, or a simulator in tests.
//!
//! ## Typical flow
//!
//! On each debuggee stop, build a fresh [`StopState`], then run any number of
//! inspection operations against it:
//!
//! - [`backtrace`]: symbolized frame walk for one fiber
//! - [`list_fibers`]: one row per fiber with running/parked status
//! - [`group_fibers`]: collapse fibers with identical innermost frames
//! - [`apply_fiber_context`] / [`RestorePoint::restore`]: manual overlay
//!   for frame-by-frame inspection, reverted by an explicit reset

pub mod backtrace;
pub mod catalog;
pub mod error;
pub mod group;
pub mod layout;
pub mod listing;
pub mod resolve;
pub mod switch;
pub mod symbols;
pub mod target;
pub mod types;

pub use backtrace::{backtrace, backtrace_capped, Frame};
pub use catalog::{ActiveEntry, ActiveMap, FiberCatalog, StopState, ThreadSnapshot};
// Re-export commonly used types
pub use error::{InspectError, InspectResult};
pub use group::{compact_ranges, group_fibers, FiberGroup, GroupedFibers};
pub use layout::{RuntimeLayout, MAX_BACKTRACE_FRAMES, MAX_RING_NODES};
pub use listing::{list_fibers, FiberRow, FiberStatus};
pub use resolve::resolve_context;
pub use switch::{apply_fiber_context, with_fiber_context, RestorePoint};
pub use symbols::{DwarfSymbolizer, FrameSymbol, NullSymbolizer, Symbolizer, SymbolizerError};
pub use target::{InspectionSession, TargetMemory};
pub use types::{Address, FiberHandle, OsThreadId, RegisterContext, SourceLocation, SymbolName};
