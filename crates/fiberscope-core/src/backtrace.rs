//! # Backtrace production
//!
//! A backtrace is a frame-pointer walk executed while a fiber's register
//! context is installed via the scoped switch. The walk is leaf-to-root,
//! finite, and non-restartable: it ends at the root frame (null saved frame
//! pointer or return address), at a non-monotonic frame pointer, at a memory
//! read the host refuses, or at the frame cap.

use crate::catalog::ActiveMap;
use crate::error::InspectResult;
use crate::layout::{RuntimeLayout, MAX_BACKTRACE_FRAMES};
use crate::switch::with_fiber_context;
use crate::symbols::Symbolizer;
use crate::target::InspectionSession;
use crate::types::{Address, FiberHandle, RegisterContext, SourceLocation, SymbolName};

/// One symbolized stack frame.
#[derive(Debug, Clone)]
pub struct Frame
{
    /// Instruction pointer for this frame.
    pub ip: Address,
    /// Best-effort symbol for the frame.
    pub symbol: Option<SymbolName>,
    /// Best-effort source location.
    pub location: Option<SourceLocation>,
}

/// Produce a symbolized backtrace for `handle`
///
/// Runs the walk as the body of a scoped context switch, so every OS
/// thread's real state is identical before and after this call, including
/// when it fails.
///
/// ## Errors
///
/// - `Unavailable`: `handle`'s context could not be resolved; no walk ran.
pub fn backtrace<S: InspectionSession + ?Sized>(
    session: &mut S,
    active: &ActiveMap,
    layout: &RuntimeLayout,
    symbolizer: &dyn Symbolizer,
    handle: FiberHandle,
    max_frames: usize,
) -> InspectResult<Vec<Frame>>
{
    with_fiber_context(session, active, layout, handle, |session| {
        walk_frames(session, symbolizer, max_frames)
    })
}

/// Like [`backtrace`] with the default frame cap.
pub fn backtrace_capped<S: InspectionSession + ?Sized>(
    session: &mut S,
    active: &ActiveMap,
    layout: &RuntimeLayout,
    symbolizer: &dyn Symbolizer,
    handle: FiberHandle,
) -> InspectResult<Vec<Frame>>
{
    backtrace(session, active, layout, symbolizer, handle, MAX_BACKTRACE_FRAMES)
}

/// Walk the frame-pointer chain of the installed context.
///
/// Expects to run as a switch body: reads the selected thread's registers and
/// follows `[fp] -> caller fp`, `[fp + 8] -> return ip`.
pub(crate) fn walk_frames<S: InspectionSession + ?Sized>(
    session: &S,
    symbolizer: &dyn Symbolizer,
    max_frames: usize,
) -> InspectResult<Vec<Frame>>
{
    let mut cursor = session.current_registers()?;
    let mut frames = Vec::new();

    while frames.len() < max_frames && !cursor.ip.is_null() {
        frames.push(make_frame(cursor.ip, symbolizer));

        let Some(next) = step(session, &cursor) else {
            break;
        };
        cursor = next;
    }

    Ok(frames)
}

/// One leaf-to-root step; `None` means the walk reached its root.
fn step<S: InspectionSession + ?Sized>(session: &S, cursor: &RegisterContext) -> Option<RegisterContext>
{
    if cursor.fp.is_null() {
        return None;
    }

    // A read failure past the last valid frame is natural termination.
    let saved_fp = session.read_word(cursor.fp).ok()?;
    let return_ip = session.read_word(cursor.fp + 8).ok()?;
    if return_ip == 0 {
        return None;
    }
    // The caller's frame lives at a strictly higher address; anything else is
    // a corrupt or cyclic chain.
    if saved_fp != 0 && saved_fp <= cursor.fp.value() {
        return None;
    }

    Some(RegisterContext::new(
        cursor.fp + 16,
        Address::from(saved_fp),
        Address::from(return_ip),
    ))
}

fn make_frame(ip: Address, symbolizer: &dyn Symbolizer) -> Frame
{
    match symbolizer.symbolicate(ip) {
        Some(sym) => Frame {
            ip,
            symbol: Some(sym.name),
            location: sym.location,
        },
        None => Frame {
            ip,
            symbol: None,
            location: None,
        },
    }
}
