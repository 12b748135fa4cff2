//! # Context resolution
//!
//! Given an opaque fiber handle, determine its machine register state. Three
//! tiers, evaluated strictly in order:
//!
//! 1. **Identity fast path**: the handle is the selected thread's own
//!    current-fiber indicator, so the thread's live registers are the answer.
//! 2. **Active cache**: the handle was caught mid-execution on some OS
//!    thread at stop time; the cached live context is more current than
//!    anything on the fiber's stack, because a running fiber has not
//!    persisted its registers.
//! 3. **Cold path**: reconstruct from target memory: read the fiber's
//!    persisted stack pointer and pull the saved frame/instruction pointers
//!    from their fixed offsets in the yield-time register push.
//!
//! Any failure to read the target at any tier is reported as
//! [`Unavailable`](InspectError::Unavailable) for that fiber, never
//! defaulted to zero, never allowed to poison a batch operation.

use tracing::debug;

use crate::catalog::ActiveMap;
use crate::error::{InspectError, InspectResult};
use crate::layout::RuntimeLayout;
use crate::target::InspectionSession;
use crate::types::{Address, FiberHandle, RegisterContext};

/// Resolve `handle` to a register context using the three-tier policy.
///
/// ## Errors
///
/// - `Unavailable`: the persisted stack pointer is null and the fiber is not
///   in the active map (it is running on a thread this session cannot see),
///   or a memory/session read failed along the way.
pub fn resolve_context<S: InspectionSession + ?Sized>(
    session: &S,
    active: &ActiveMap,
    layout: &RuntimeLayout,
    handle: FiberHandle,
) -> InspectResult<RegisterContext>
{
    // Tier 1: the fiber owns the selected thread right now.
    let current = session.current_fiber().map_err(|err| unavailable(handle, &err))?;
    if current == handle {
        return session.current_registers().map_err(|err| unavailable(handle, &err));
    }

    // Tier 2: cached live registers from the stop-time thread scan.
    if let Some(entry) = active.get(handle) {
        return Ok(entry.context);
    }

    // Tier 3: reconstruct from the saved-register area on the fiber's stack.
    resolve_cold(session, layout, handle)
}

/// Cold-path reconstruction per the saved-stack layout contract.
fn resolve_cold<S: InspectionSession + ?Sized>(
    session: &S,
    layout: &RuntimeLayout,
    handle: FiberHandle,
) -> InspectResult<RegisterContext>
{
    let persisted = session
        .read_word_at_offset(handle.address(), layout.stack_pointer_offset)
        .map_err(|err| unavailable(handle, &err))?;

    if persisted == 0 {
        // Null while running: the fiber is active on an OS thread this
        // session is not attached to. Guessing would produce garbage frames.
        return Err(InspectError::Unavailable(handle));
    }

    let base = Address::from(persisted);
    let fp = session
        .read_word_at_offset(base, layout.saved_fp_offset)
        .map_err(|err| unavailable(handle, &err))?;
    let sp = base.saturating_add(layout.saved_ip_offset);
    let ip = session.read_word(sp).map_err(|err| unavailable(handle, &err))?;

    Ok(RegisterContext::new(sp, Address::from(fp), Address::from(ip)))
}

fn unavailable(handle: FiberHandle, cause: &InspectError) -> InspectError
{
    debug!(fiber = %handle, %cause, "context resolution degraded to Unavailable");
    InspectError::Unavailable(handle)
}
