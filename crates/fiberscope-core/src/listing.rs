//! # Fiber listing
//!
//! Builds one row per cataloged fiber for operator display. Listing is a
//! batch operation over fibers in arbitrary states, so per-fiber failures
//! degrade to an [`Unavailable`](FiberStatus::Unavailable) row instead of
//! aborting the whole table.

use tracing::debug;

use crate::backtrace::Frame;
use crate::catalog::StopState;
use crate::error::InspectResult;
use crate::layout::RuntimeLayout;
use crate::switch::with_fiber_context;
use crate::symbols::Symbolizer;
use crate::target::InspectionSession;
use crate::types::{FiberHandle, OsThreadId};

/// What a fiber was doing at the stop event.
#[derive(Debug, Clone)]
pub enum FiberStatus
{
    /// Executing on an OS thread.
    Running
    {
        /// The owning OS thread.
        thread: OsThreadId,
        /// Innermost live frame, when the walk succeeded.
        frame: Option<Frame>,
    },
    /// Parked with a resolvable context; `frame` is its innermost frame.
    Parked(Frame),
    /// No context could be resolved for this fiber.
    Unavailable,
}

/// One display row of the fiber table.
#[derive(Debug, Clone)]
pub struct FiberRow
{
    /// Position in the catalog; stable for the lifetime of one stop event.
    pub index: usize,
    /// The fiber's handle.
    pub handle: FiberHandle,
    /// `true` when this is the selected thread's current fiber.
    pub is_current: bool,
    /// Running / parked / unavailable.
    pub status: FiberStatus,
}

/// Produce one row per cataloged fiber, in catalog order
///
/// Every resolvable fiber gets a scoped switch and a single-frame walk to
/// symbolize its innermost frame; running fibers additionally carry their OS
/// thread from the active map, and a failed walk only costs them the frame,
/// not the row. A fiber whose context cannot be resolved yields an
/// `Unavailable` row. The row for the selected thread's current fiber is
/// flagged with `is_current`, judged against the stop-time snapshot so a
/// manual overlay does not move the marker.
pub fn list_fibers<S: InspectionSession + ?Sized>(
    session: &mut S,
    state: &StopState,
    layout: &RuntimeLayout,
    symbolizer: &dyn Symbolizer,
) -> InspectResult<Vec<FiberRow>>
{
    let current = state
        .threads
        .get(&session.selected_thread())
        .map(|snapshot| snapshot.current_fiber);
    let mut rows = Vec::with_capacity(state.catalog.len());

    for (index, handle) in state.catalog.iter().enumerate() {
        let status = match state.active.get(handle) {
            Some(entry) => {
                let thread = entry.thread;
                let frame = match innermost_frame(session, state, layout, symbolizer, handle) {
                    Ok(frame) => frame,
                    Err(err) => {
                        debug!(fiber = %handle, %err, "running fiber listed without a frame");
                        None
                    }
                };
                FiberStatus::Running { thread, frame }
            }
            None => match innermost_frame(session, state, layout, symbolizer, handle) {
                Ok(Some(frame)) => FiberStatus::Parked(frame),
                Ok(None) => FiberStatus::Unavailable,
                Err(err) => {
                    debug!(fiber = %handle, %err, "listing row degraded to unavailable");
                    FiberStatus::Unavailable
                }
            },
        };

        rows.push(FiberRow {
            index,
            handle,
            is_current: current == Some(handle),
            status,
        });
    }

    Ok(rows)
}

fn innermost_frame<S: InspectionSession + ?Sized>(
    session: &mut S,
    state: &StopState,
    layout: &RuntimeLayout,
    symbolizer: &dyn Symbolizer,
    handle: FiberHandle,
) -> InspectResult<Option<Frame>>
{
    let frames = with_fiber_context(session, &state.active, layout, handle, |session| {
        crate::backtrace::walk_frames(session, symbolizer, 1)
    })?;
    Ok(frames.into_iter().next())
}
