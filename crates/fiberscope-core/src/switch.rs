//! # Scoped context switch
//!
//! Installing a parked fiber's register context onto an inspection thread is
//! the only state mutation this crate performs against the host, and it must
//! be provably reverted: the thread's real registers, its current-fiber
//! indicator, and the frame selection have to be bit-for-bit identical after
//! every operation, whether the operation succeeded, failed, or panicked.
//!
//! The discipline is packaged in two forms:
//!
//! - [`with_fiber_context`]: the scoped form. Captures a [`RestorePoint`],
//!   installs the resolved context, runs a body, and restores on every exit
//!   path (a drop guard covers unwinding).
//! - [`apply_fiber_context`] + [`RestorePoint::restore`]: the manual form
//!   behind the operator's "make this fiber active" command, where the
//!   overlay intentionally outlives the call and an explicit reset commits
//!   the restoration before the target resumes.
//!
//! Re-entering either form while a switch is already in progress on the same
//! session is a programming error; the capture/restore pair assumes it is the
//! sole driver of the host's selection state.

use tracing::error;

use crate::catalog::ActiveMap;
use crate::error::InspectResult;
use crate::layout::RuntimeLayout;
use crate::resolve::resolve_context;
use crate::target::InspectionSession;
use crate::types::{FiberHandle, OsThreadId, RegisterContext};

/// Snapshot of one OS thread's true state, consumed exactly once on restore
///
/// Capturing selects the innermost real frame first, so the register overlay
/// that follows is applied against a known baseline; the previously selected
/// frame index is part of the snapshot and comes back on restore.
#[derive(Debug)]
pub struct RestorePoint
{
    thread: OsThreadId,
    frame: usize,
    context: RegisterContext,
    current_fiber: FiberHandle,
}

impl RestorePoint
{
    /// Capture the selected thread's true state
    ///
    /// Records the current frame selection, walks to the innermost frame,
    /// then snapshots the live registers and the current-fiber indicator.
    pub fn capture<S: InspectionSession + ?Sized>(session: &mut S) -> InspectResult<Self>
    {
        let frame = session.selected_frame();
        session.select_innermost_frame();

        Ok(Self {
            thread: session.selected_thread(),
            frame,
            context: session.current_registers()?,
            current_fiber: session.current_fiber()?,
        })
    }

    /// The thread this snapshot belongs to.
    pub fn thread(&self) -> OsThreadId
    {
        self.thread
    }

    /// Reinstate the captured state, consuming the snapshot
    ///
    /// Reselects the original thread, writes back all three registers and the
    /// current-fiber indicator, and reselects the original stack frame.
    pub fn restore<S: InspectionSession + ?Sized>(self, session: &mut S) -> InspectResult<()>
    {
        session.select_thread(self.thread)?;
        session.set_registers(&self.context)?;
        session.set_current_fiber(self.current_fiber)?;
        session.select_frame(self.frame)?;
        Ok(())
    }
}

/// Run `body` with the inspection state positioned at `handle`'s context
///
/// Protocol: select the innermost frame, capture a [`RestorePoint`], resolve
/// `handle`, install its registers and indicator, invoke `body`, and restore
/// unconditionally. If resolution fails, `body` is never invoked and the
/// resolution error is returned, after restoration.
///
/// Error precedence on the way out: a `body` failure wins over a restoration
/// failure (the state corruption is logged either way); a restoration failure
/// after a successful `body` is returned, because a session whose thread
/// state silently stayed corrupted is worse than a lost result.
///
/// ## Preconditions
///
/// Must not be called re-entrantly from inside another switch on the same
/// session.
pub fn with_fiber_context<S, T, F>(
    session: &mut S,
    active: &ActiveMap,
    layout: &RuntimeLayout,
    handle: FiberHandle,
    body: F,
) -> InspectResult<T>
where
    S: InspectionSession + ?Sized,
    F: FnOnce(&mut S) -> InspectResult<T>,
{
    let restore = RestorePoint::capture(session)?;
    let mut guard = SwitchGuard {
        session,
        restore: Some(restore),
    };

    let outcome = match resolve_context(guard.session, active, layout, handle) {
        Ok(context) => {
            let run = || {
                guard.session.set_registers(&context)?;
                guard.session.set_current_fiber(handle)?;
                body(guard.session)
            };
            run()
        }
        Err(err) => Err(err),
    };

    let restored = guard.finish();
    let value = outcome?;
    restored?;
    Ok(value)
}

/// Install `handle`'s context without a scope, for manual inspection
///
/// Performs the capture/resolve/install steps of [`with_fiber_context`] and
/// hands the restore point to the caller instead of restoring. The caller
/// owns the overlay until it commits [`RestorePoint::restore`], required
/// before the target is allowed to resume. If resolution or installation
/// fails, the true state is restored here and no restore point escapes.
pub fn apply_fiber_context<S: InspectionSession + ?Sized>(
    session: &mut S,
    active: &ActiveMap,
    layout: &RuntimeLayout,
    handle: FiberHandle,
) -> InspectResult<RestorePoint>
{
    let restore = RestorePoint::capture(session)?;
    let mut guard = SwitchGuard {
        session,
        restore: Some(restore),
    };

    let installed = match resolve_context(guard.session, active, layout, handle) {
        Ok(context) => {
            let mut run = || {
                guard.session.set_registers(&context)?;
                guard.session.set_current_fiber(handle)
            };
            run()
        }
        Err(err) => Err(err),
    };

    match installed {
        Ok(()) => Ok(guard.disarm()),
        Err(err) => {
            guard.finish()?;
            Err(err)
        }
    }
}

/// Restores the captured state when dropped, unless finished or disarmed.
///
/// The `Drop` path exists for unwinding only; it cannot propagate a failed
/// restore, so it logs at error level instead.
struct SwitchGuard<'a, S: InspectionSession + ?Sized>
{
    session: &'a mut S,
    restore: Option<RestorePoint>,
}

impl<S: InspectionSession + ?Sized> SwitchGuard<'_, S>
{
    /// Restore now, surfacing any restoration error.
    fn finish(&mut self) -> InspectResult<()>
    {
        match self.restore.take() {
            Some(restore) => restore.restore(self.session),
            None => Ok(()),
        }
    }

    /// Hand the restore point to the caller; the guard will not fire.
    fn disarm(mut self) -> RestorePoint
    {
        self.restore.take().expect("guard disarmed twice")
    }
}

impl<S: InspectionSession + ?Sized> Drop for SwitchGuard<'_, S>
{
    fn drop(&mut self)
    {
        if let Some(restore) = self.restore.take() {
            let thread = restore.thread();
            if let Err(err) = restore.restore(self.session) {
                error!(%thread, %err, "failed to restore thread state while unwinding");
            }
        }
    }
}
