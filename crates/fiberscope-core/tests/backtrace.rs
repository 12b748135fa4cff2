//! Integration tests for the frame-pointer walk behind backtrace production.

mod common;

use common::{ctx, FakeTarget};
use fiberscope_core::{backtrace, Address, FiberHandle, NullSymbolizer, RuntimeLayout, StopState};

const ANCHOR: u64 = 0x1000;
const FIBER: u64 = 0x2000;
const PERSISTED: u64 = 0x9000;

fn parked_scenario() -> (FakeTarget, RuntimeLayout)
{
    let layout = RuntimeLayout::default();
    let mut target = FakeTarget::new();
    target.add_thread(1, ctx(0x7000, 0x7100, 0x40_0000), FiberHandle::NULL);
    target.install_ring(&layout, ANCHOR, &[FIBER]);
    target.park_fiber(&layout, FIBER, PERSISTED, 0x9100, 0x41_0000);
    (target, layout)
}

fn trace(target: &mut FakeTarget, layout: &RuntimeLayout, max_frames: usize) -> Vec<Address>
{
    let state = StopState::build(target, layout).unwrap();
    let frames = backtrace(
        target,
        &state.active,
        layout,
        &NullSymbolizer,
        FiberHandle::from(FIBER),
        max_frames,
    )
    .unwrap();
    frames.into_iter().map(|frame| frame.ip).collect()
}

#[test]
fn walk_follows_frame_chain_to_the_root()
{
    let (mut target, layout) = parked_scenario();
    target.link_frame(0x9100, 0x9200, 0x42_0000);
    target.link_frame(0x9200, 0, 0x43_0000);

    let ips = trace(&mut target, &layout, 64);
    assert_eq!(
        ips,
        vec![
            Address::from(0x41_0000_u64),
            Address::from(0x42_0000_u64),
            Address::from(0x43_0000_u64),
        ]
    );
}

#[test]
fn zero_return_address_ends_the_walk()
{
    let (mut target, layout) = parked_scenario();
    target.link_frame(0x9100, 0x9200, 0);

    let ips = trace(&mut target, &layout, 64);
    assert_eq!(ips, vec![Address::from(0x41_0000_u64)]);
}

#[test]
fn non_monotonic_frame_pointer_ends_the_walk()
{
    let (mut target, layout) = parked_scenario();
    // Caller frame claims to live below the current one: corrupt or cyclic.
    target.link_frame(0x9100, 0x9050, 0x42_0000);

    let ips = trace(&mut target, &layout, 64);
    assert_eq!(ips, vec![Address::from(0x41_0000_u64)]);
}

#[test]
fn unreadable_frame_slot_is_natural_termination()
{
    let (mut target, layout) = parked_scenario();
    // Nothing mapped at the frame pointer at all.

    let ips = trace(&mut target, &layout, 64);
    assert_eq!(ips, vec![Address::from(0x41_0000_u64)]);
}

#[test]
fn frame_cap_truncates_deep_stacks()
{
    let (mut target, layout) = parked_scenario();
    target.link_frame(0x9100, 0x9200, 0x42_0000);
    target.link_frame(0x9200, 0x9300, 0x43_0000);
    target.link_frame(0x9300, 0, 0x44_0000);

    let ips = trace(&mut target, &layout, 2);
    assert_eq!(ips.len(), 2);
}

#[test]
fn backtrace_leaves_thread_state_untouched()
{
    let (mut target, layout) = parked_scenario();
    target.link_frame(0x9100, 0, 0x42_0000);
    let state = StopState::build(&mut target, &layout).unwrap();
    let before = target.thread_states();

    backtrace(
        &mut target,
        &state.active,
        &layout,
        &NullSymbolizer,
        FiberHandle::from(FIBER),
        64,
    )
    .unwrap();

    assert_eq!(target.thread_states(), before);
}

#[test]
fn running_fiber_backtrace_starts_from_live_registers()
{
    let layout = RuntimeLayout::default();
    let mut target = FakeTarget::new();
    let running = FiberHandle::from(FIBER);
    target.add_thread(1, ctx(0x7000, 0x7100, 0x50_0000), running);
    target.install_ring(&layout, ANCHOR, &[FIBER]);
    target.link_frame(0x7100, 0, 0x51_0000);

    let state = StopState::build(&mut target, &layout).unwrap();
    let frames = backtrace(&mut target, &state.active, &layout, &NullSymbolizer, running, 64).unwrap();

    let ips: Vec<_> = frames.into_iter().map(|frame| frame.ip).collect();
    assert_eq!(ips, vec![Address::from(0x50_0000_u64), Address::from(0x51_0000_u64)]);
}
