//! # fiberscope
//!
//! Operator-facing command layer over [`fiberscope_core`].
//!
//! The binary wires three pieces together: [`commands::FiberInspector`], the
//! stateful driver that owns the per-stop fiber view and the manual context
//! overlay; [`format`], which renders catalog rows, similarity groups, and
//! backtraces as text; and [`sim`], an in-process simulated debuggee used by
//! the `demo` subcommand and the command-layer tests.

pub mod commands;
pub mod format;
pub mod sim;

pub use commands::FiberInspector;
pub use sim::SimTarget;
