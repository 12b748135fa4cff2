//! Integration tests for register-context resolution and the scoped context
//! switch, including its restoration guarantee on every exit path.

mod common;

use std::panic::{catch_unwind, AssertUnwindSafe};

use common::{ctx, FakeTarget};
use fiberscope_core::{
    apply_fiber_context, resolve_context, with_fiber_context, Address, FiberHandle, InspectError, InspectionSession,
    RuntimeLayout, StopState, TargetMemory,
};

const ANCHOR: u64 = 0x1000;
const FIBER_A: u64 = 0x2000;
const FIBER_B: u64 = 0x3000;

/// One thread running fiber A, fiber B parked with a persisted context.
fn scenario() -> (FakeTarget, RuntimeLayout)
{
    let layout = RuntimeLayout::default();
    let mut target = FakeTarget::new();
    target.add_thread(1, ctx(0x7000, 0x7100, 0x40_0000), FiberHandle::from(FIBER_A));
    target.install_ring(&layout, ANCHOR, &[FIBER_A, FIBER_B]);
    target.park_fiber(&layout, FIBER_B, 0x9000, 0x9100, 0x41_0000);
    (target, layout)
}

#[test]
fn identity_fast_path_uses_live_registers()
{
    let (mut target, layout) = scenario();
    let state = StopState::build(&mut target, &layout).unwrap();

    // Diverge the live registers from the values cached at build time. The
    // selected thread still runs fiber A, so resolution must answer with the
    // live values, not the stale cache.
    target.set_registers(&ctx(0x7600, 0x7700, 0x43_0000)).unwrap();

    let resolved = resolve_context(&target, &state.active, &layout, FiberHandle::from(FIBER_A)).unwrap();
    assert_eq!(resolved, ctx(0x7600, 0x7700, 0x43_0000));
}

#[test]
fn active_map_answers_for_running_fiber_on_other_thread()
{
    let (mut target, layout) = scenario();
    // Second thread running fiber B's sibling; the selected thread stays 1.
    let running = FiberHandle::from(0x4000_u64);
    target.add_thread(2, ctx(0x8000, 0x8100, 0x42_0000), running);
    target.install_ring(&layout, ANCHOR, &[FIBER_A, FIBER_B, 0x4000]);
    let state = StopState::build(&mut target, &layout).unwrap();

    let resolved = resolve_context(&target, &state.active, &layout, running).unwrap();
    assert_eq!(resolved, ctx(0x8000, 0x8100, 0x42_0000));
}

#[test]
fn cold_path_reconstructs_from_saved_stack()
{
    let (mut target, layout) = scenario();
    let state = StopState::build(&mut target, &layout).unwrap();

    let resolved = resolve_context(&target, &state.active, &layout, FiberHandle::from(FIBER_B)).unwrap();
    // sp lands past the saved-register area, fp and ip come from their slots.
    assert_eq!(resolved.sp, Address::from(0x9000 + layout.saved_ip_offset));
    assert_eq!(resolved.fp, Address::from(0x9100_u64));
    assert_eq!(resolved.ip, Address::from(0x41_0000_u64));
}

#[test]
fn null_persisted_stack_pointer_is_unavailable()
{
    let (mut target, layout) = scenario();
    // Fiber B now claims to be running (null persisted sp) but no thread has it.
    target.poke(FIBER_B + layout.stack_pointer_offset, 0);
    let state = StopState::build(&mut target, &layout).unwrap();

    let err = resolve_context(&target, &state.active, &layout, FiberHandle::from(FIBER_B)).unwrap_err();
    assert!(matches!(err, InspectError::Unavailable(handle) if handle == FiberHandle::from(FIBER_B)));
}

#[test]
fn unreadable_saved_area_is_unavailable()
{
    let (mut target, layout) = scenario();
    target.poison(0x9000 + layout.saved_fp_offset);
    let state = StopState::build(&mut target, &layout).unwrap();

    let err = resolve_context(&target, &state.active, &layout, FiberHandle::from(FIBER_B)).unwrap_err();
    assert!(matches!(err, InspectError::Unavailable(_)));
}

#[test]
fn scoped_switch_installs_context_and_restores_everything()
{
    let (mut target, layout) = scenario();
    let state = StopState::build(&mut target, &layout).unwrap();
    target.select_frame(3).unwrap();
    let before = target.thread_states();

    let seen = with_fiber_context(&mut target, &state.active, &layout, FiberHandle::from(FIBER_B), |session| {
        assert_eq!(session.selected_frame(), 0);
        assert_eq!(session.current_fiber().unwrap(), FiberHandle::from(FIBER_B));
        session.current_registers()
    })
    .unwrap();

    assert_eq!(seen.ip, Address::from(0x41_0000_u64));
    assert_eq!(target.thread_states(), before);
    assert_eq!(target.selected_frame(), 3);
}

#[test]
fn scoped_switch_restores_after_body_error()
{
    let (mut target, layout) = scenario();
    let state = StopState::build(&mut target, &layout).unwrap();
    let before = target.thread_states();

    let err = with_fiber_context(&mut target, &state.active, &layout, FiberHandle::from(FIBER_B), |session| {
        session.read_word(Address::from(0xdead_0000_u64)).map(|_| ())
    })
    .unwrap_err();

    assert!(matches!(err, InspectError::MemoryRead { .. }));
    assert_eq!(target.thread_states(), before);
}

#[test]
fn scoped_switch_restores_while_unwinding()
{
    let (mut target, layout) = scenario();
    let state = StopState::build(&mut target, &layout).unwrap();
    let before = target.thread_states();

    let result = catch_unwind(AssertUnwindSafe(|| {
        let _ = with_fiber_context::<FakeTarget, (), _>(
            &mut target,
            &state.active,
            &layout,
            FiberHandle::from(FIBER_B),
            |_| panic!("inspection body blew up"),
        );
    }));

    assert!(result.is_err());
    assert_eq!(target.thread_states(), before);
}

#[test]
fn unresolvable_fiber_never_runs_the_body()
{
    let (mut target, layout) = scenario();
    target.poke(FIBER_B + layout.stack_pointer_offset, 0);
    let state = StopState::build(&mut target, &layout).unwrap();
    let before = target.thread_states();

    let mut body_ran = false;
    let err = with_fiber_context(&mut target, &state.active, &layout, FiberHandle::from(FIBER_B), |_| {
        body_ran = true;
        Ok(())
    })
    .unwrap_err();

    assert!(!body_ran);
    assert!(matches!(err, InspectError::Unavailable(_)));
    assert_eq!(target.thread_states(), before);
}

#[test]
fn manual_apply_and_restore_round_trip()
{
    let (mut target, layout) = scenario();
    let state = StopState::build(&mut target, &layout).unwrap();
    let before = target.thread_states();

    let restore = apply_fiber_context(&mut target, &state.active, &layout, FiberHandle::from(FIBER_B)).unwrap();

    // The overlay persists past the call.
    assert_eq!(target.current_fiber().unwrap(), FiberHandle::from(FIBER_B));
    assert_eq!(target.current_registers().unwrap().ip, Address::from(0x41_0000_u64));
    assert_ne!(target.thread_states(), before);

    restore.restore(&mut target).unwrap();
    assert_eq!(target.thread_states(), before);
}

#[test]
fn failed_apply_restores_immediately()
{
    let (mut target, layout) = scenario();
    target.poke(FIBER_B + layout.stack_pointer_offset, 0);
    let state = StopState::build(&mut target, &layout).unwrap();
    let before = target.thread_states();

    let err = apply_fiber_context(&mut target, &state.active, &layout, FiberHandle::from(FIBER_B)).unwrap_err();
    assert!(matches!(err, InspectError::Unavailable(_)));
    assert_eq!(target.thread_states(), before);
}
