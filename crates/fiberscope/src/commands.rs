//! Stateful command driver for one inspection session.
//!
//! [`FiberInspector`] owns the host session, the per-stop fiber view, and the
//! manual context overlay. It enforces the workflow rules the core crate
//! cannot see on its own:
//!
//! - fiber state is rebuilt on every stop event and never reused across stops
//! - a target without fiber support degrades every command gracefully and
//!   warns exactly once
//! - at most one manual overlay exists at a time; switching again restores
//!   the previous one first, and a stop event discards a stale overlay

use tracing::warn;

use fiberscope_core::{
    apply_fiber_context, backtrace_capped, group_fibers, list_fibers, FiberHandle, InspectError, InspectResult,
    InspectionSession, RestorePoint, RuntimeLayout, StopState, Symbolizer,
};

use crate::format;

/// Driver owning the session and all per-stop fiber state.
pub struct FiberInspector<S: InspectionSession>
{
    session: S,
    layout: RuntimeLayout,
    state: Option<StopState>,
    overlay: Option<RestorePoint>,
    unsupported: bool,
    warned_unsupported: bool,
}

impl<S: InspectionSession> FiberInspector<S>
{
    /// Wrap `session` using the default runtime layout.
    pub fn new(session: S) -> Self
    {
        Self::with_layout(session, RuntimeLayout::default())
    }

    /// Wrap `session` with an explicit layout (non-default symbol names).
    pub fn with_layout(session: S, layout: RuntimeLayout) -> Self
    {
        Self {
            session,
            layout,
            state: None,
            overlay: None,
            unsupported: false,
            warned_unsupported: false,
        }
    }

    /// Read access to the wrapped session.
    pub fn session(&self) -> &S
    {
        &self.session
    }

    /// Returns `true` while a manual overlay is installed.
    pub fn has_overlay(&self) -> bool
    {
        self.overlay.is_some()
    }

    /// Rebuild all fiber state for a fresh stop event
    ///
    /// A stale manual overlay from before the resume is meaningless now; it
    /// is discarded with a warning rather than restored, because the thread
    /// state it captured no longer exists.
    ///
    /// A target without fiber support is not an error here: the inspector
    /// stays usable (every query reports the absence) and the condition is
    /// logged once per session.
    ///
    /// ## Errors
    ///
    /// - `MemoryRead` / `Session`: the host failed while scanning a target
    ///   that does have fiber support.
    pub fn on_stop(&mut self) -> InspectResult<()>
    {
        if let Some(overlay) = self.overlay.take() {
            warn!(
                thread = %overlay.thread(),
                "discarding manual fiber context from before the target resumed"
            );
        }

        match StopState::build(&mut self.session, &self.layout) {
            Ok(state) => {
                self.state = Some(state);
                self.unsupported = false;
                Ok(())
            }
            Err(InspectError::UnsupportedTarget(details)) => {
                self.state = None;
                self.unsupported = true;
                if !self.warned_unsupported {
                    self.warned_unsupported = true;
                    warn!(%details, "target has no fiber debugging support");
                }
                Ok(())
            }
            Err(err) => {
                self.state = None;
                self.unsupported = false;
                Err(err)
            }
        }
    }

    /// List all fibers, or group them by stack similarity when `depth` is given.
    pub fn info(&mut self, symbolizer: &dyn Symbolizer, depth: Option<usize>) -> InspectResult<String>
    {
        let Some(state) = fiber_state(self.state.as_ref(), self.unsupported)? else {
            return Ok(unsupported_text());
        };
        match depth {
            Some(depth) => {
                let grouped = group_fibers(&mut self.session, state, &self.layout, symbolizer, depth)?;
                Ok(format::format_groups(&grouped))
            }
            None => {
                let rows = list_fibers(&mut self.session, state, &self.layout, symbolizer)?;
                Ok(format::format_rows(&rows))
            }
        }
    }

    /// Backtrace the fiber at catalog position `index`.
    ///
    /// ## Errors
    ///
    /// - `IndexOutOfRange`: reported before any context switch happens.
    /// - `Unavailable`: the fiber's context could not be resolved.
    pub fn backtrace_index(&mut self, symbolizer: &dyn Symbolizer, index: usize) -> InspectResult<String>
    {
        let Some(state) = fiber_state(self.state.as_ref(), self.unsupported)? else {
            return Ok(unsupported_text());
        };
        let handle = state.catalog.handle(index)?;
        let frames = backtrace_capped(&mut self.session, &state.active, &self.layout, symbolizer, handle)?;
        Ok(format::format_backtrace(&frames))
    }

    /// Backtrace a fiber by raw handle, bypassing the catalog.
    pub fn backtrace_handle(&mut self, symbolizer: &dyn Symbolizer, handle: FiberHandle) -> InspectResult<String>
    {
        let Some(state) = fiber_state(self.state.as_ref(), self.unsupported)? else {
            return Ok(unsupported_text());
        };
        let frames = backtrace_capped(&mut self.session, &state.active, &self.layout, symbolizer, handle)?;
        Ok(format::format_backtrace(&frames))
    }

    /// Install the context of the fiber at catalog position `index`.
    pub fn switch_to_index(&mut self, index: usize) -> InspectResult<String>
    {
        let handle = {
            let Some(state) = fiber_state(self.state.as_ref(), self.unsupported)? else {
                return Ok(unsupported_text());
            };
            state.catalog.handle(index)?
        };
        self.switch_to_handle(handle)
    }

    /// Install `handle`'s context as a manual overlay
    ///
    /// The overlay stays until [`reset`](Self::reset), a further switch, or
    /// the next stop event. A previously installed overlay is restored first,
    /// so switches never stack.
    pub fn switch_to_handle(&mut self, handle: FiberHandle) -> InspectResult<String>
    {
        if let Some(overlay) = self.overlay.take() {
            overlay.restore(&mut self.session)?;
        }

        let Some(state) = fiber_state(self.state.as_ref(), self.unsupported)? else {
            return Ok(unsupported_text());
        };
        let restore = apply_fiber_context(&mut self.session, &state.active, &self.layout, handle)?;
        self.overlay = Some(restore);
        Ok(format!("inspecting fiber {handle}; run `reset` before resuming the target\n"))
    }

    /// Restore the true thread state after a manual switch.
    pub fn reset(&mut self) -> InspectResult<String>
    {
        match self.overlay.take() {
            Some(overlay) => {
                let thread = overlay.thread();
                overlay.restore(&mut self.session)?;
                Ok(format!("restored {thread}\n"))
            }
            None => Ok("no fiber context to reset\n".to_string()),
        }
    }
}

/// Gate a query on the per-stop fiber state
///
/// `Ok(None)` means the target was probed and has no fiber support: queries
/// report the absence instead of failing, since the condition is expected and
/// already warned about. Querying before any stop event at all is a workflow
/// error.
fn fiber_state(state: Option<&StopState>, unsupported: bool) -> InspectResult<Option<&StopState>>
{
    match state {
        Some(state) => Ok(Some(state)),
        None if unsupported => Ok(None),
        None => Err(InspectError::Session("no stop event observed; stop the target first".to_string())),
    }
}

fn unsupported_text() -> String
{
    "fiber debugging unavailable on this target\n".to_string()
}
