//! Integration tests for the fiber listing and stack-similarity grouping.

mod common;

use common::{ctx, FakeTarget};
use fiberscope_core::{
    compact_ranges, group_fibers, list_fibers, Address, FiberHandle, FiberStatus, NullSymbolizer, OsThreadId,
    RuntimeLayout, StopState,
};

const ANCHOR: u64 = 0x1000;

/// Park `fiber` with a one-frame stack whose innermost ip is `ip`.
fn park_with_ip(target: &mut FakeTarget, layout: &RuntimeLayout, fiber: u64, ip: u64)
{
    let persisted = fiber + 0x10_0000;
    let fp = persisted + 0x100;
    target.park_fiber(layout, fiber, persisted, fp, ip);
    target.link_frame(fp, 0, 0);
}

#[test]
fn listing_reports_running_parked_and_unavailable()
{
    let layout = RuntimeLayout::default();
    let mut target = FakeTarget::new();
    let running = FiberHandle::from(0x2000_u64);
    target.add_thread(1, ctx(0x7000, 0x7100, 0x40_0000), running);
    target.install_ring(&layout, ANCHOR, &[0x2000, 0x3000, 0x4000]);
    park_with_ip(&mut target, &layout, 0x3000, 0x41_0000);
    // 0x4000 claims to be running but no thread has it.
    target.poke(0x4000 + layout.stack_pointer_offset, 0);

    let state = StopState::build(&mut target, &layout).unwrap();
    let rows = list_fibers(&mut target, &state, &layout, &NullSymbolizer).unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].index, 0);
    assert!(matches!(rows[0].status, FiberStatus::Running { thread, .. } if thread == OsThreadId::from(1)));
    assert!(matches!(&rows[1].status, FiberStatus::Parked(frame) if frame.ip == Address::from(0x41_0000_u64)));
    assert!(matches!(rows[2].status, FiberStatus::Unavailable));
    // The selected thread runs the first fiber, so only its row is current.
    assert!(rows[0].is_current);
    assert!(!rows[1].is_current);
    assert!(!rows[2].is_current);
}

#[test]
fn running_fiber_row_carries_its_live_frame()
{
    let layout = RuntimeLayout::default();
    let mut target = FakeTarget::new();
    let running = FiberHandle::from(0x2000_u64);
    target.add_thread(1, ctx(0x7000, 0x7100, 0x40_0000), running);
    target.install_ring(&layout, ANCHOR, &[0x2000]);

    let state = StopState::build(&mut target, &layout).unwrap();
    let rows = list_fibers(&mut target, &state, &layout, &NullSymbolizer).unwrap();

    let FiberStatus::Running { thread, frame } = &rows[0].status else {
        panic!("expected a running row");
    };
    assert_eq!(*thread, OsThreadId::from(1));
    assert_eq!(frame.as_ref().map(|f| f.ip), Some(Address::from(0x40_0000_u64)));
}

#[test]
fn listing_leaves_thread_state_untouched()
{
    let layout = RuntimeLayout::default();
    let mut target = FakeTarget::new();
    target.add_thread(1, ctx(0x7000, 0x7100, 0x40_0000), FiberHandle::NULL);
    target.install_ring(&layout, ANCHOR, &[0x3000]);
    park_with_ip(&mut target, &layout, 0x3000, 0x41_0000);

    let state = StopState::build(&mut target, &layout).unwrap();
    let before = target.thread_states();
    list_fibers(&mut target, &state, &layout, &NullSymbolizer).unwrap();
    assert_eq!(target.thread_states(), before);
}

#[test]
fn fibers_with_identical_frames_group_together()
{
    let layout = RuntimeLayout::default();
    let mut target = FakeTarget::new();
    target.add_thread(1, ctx(0x7000, 0x7100, 0x40_0000), FiberHandle::NULL);
    target.install_ring(&layout, ANCHOR, &[0x2000, 0x3000, 0x4000, 0x5000]);
    park_with_ip(&mut target, &layout, 0x2000, 0x41_0000);
    park_with_ip(&mut target, &layout, 0x3000, 0x42_0000);
    park_with_ip(&mut target, &layout, 0x4000, 0x41_0000);
    park_with_ip(&mut target, &layout, 0x5000, 0x41_0000);

    let state = StopState::build(&mut target, &layout).unwrap();
    let grouped = group_fibers(&mut target, &state, &layout, &NullSymbolizer, 0).unwrap();

    assert_eq!(grouped.groups.len(), 1);
    assert_eq!(grouped.groups[0].indices, vec![0, 2, 3]);
    assert_eq!(grouped.groups[0].frames[0].ip, Address::from(0x41_0000_u64));
    // The lone divergent fiber is demoted to a single, not a group of one.
    assert_eq!(grouped.singles.len(), 1);
    assert_eq!(grouped.singles[0].indices, vec![1]);
    assert!(grouped.unavailable.is_empty());
}

#[test]
fn grouping_depth_distinguishes_callers()
{
    let layout = RuntimeLayout::default();
    let mut target = FakeTarget::new();
    target.add_thread(1, ctx(0x7000, 0x7100, 0x40_0000), FiberHandle::NULL);
    target.install_ring(&layout, ANCHOR, &[0x2000, 0x3000]);

    // Same innermost ip, different callers.
    target.park_fiber(&layout, 0x2000, 0x12_0000, 0x12_0100, 0x41_0000);
    target.link_frame(0x12_0100, 0, 0x51_0000);
    target.park_fiber(&layout, 0x3000, 0x13_0000, 0x13_0100, 0x41_0000);
    target.link_frame(0x13_0100, 0, 0x52_0000);

    let state = StopState::build(&mut target, &layout).unwrap();

    // Depth 0 keys on the innermost frame only: one group.
    let shallow = group_fibers(&mut target, &state, &layout, &NullSymbolizer, 0).unwrap();
    assert_eq!(shallow.groups.len(), 1);
    assert_eq!(shallow.groups[0].indices, vec![0, 1]);

    // Depth 1 includes the caller: the stacks diverge into singles.
    let deep = group_fibers(&mut target, &state, &layout, &NullSymbolizer, 1).unwrap();
    assert!(deep.groups.is_empty());
    assert_eq!(deep.singles.len(), 2);
}

#[test]
fn unresolvable_fibers_are_reported_not_fatal()
{
    let layout = RuntimeLayout::default();
    let mut target = FakeTarget::new();
    target.add_thread(1, ctx(0x7000, 0x7100, 0x40_0000), FiberHandle::NULL);
    target.install_ring(&layout, ANCHOR, &[0x2000, 0x3000]);
    park_with_ip(&mut target, &layout, 0x2000, 0x41_0000);
    target.poke(0x3000 + layout.stack_pointer_offset, 0);

    let state = StopState::build(&mut target, &layout).unwrap();
    let grouped = group_fibers(&mut target, &state, &layout, &NullSymbolizer, 0).unwrap();

    assert_eq!(grouped.unavailable, vec![1]);
    assert_eq!(grouped.singles.len(), 1);
}

#[test]
fn grouping_order_is_deterministic()
{
    let layout = RuntimeLayout::default();
    let mut target = FakeTarget::new();
    target.add_thread(1, ctx(0x7000, 0x7100, 0x40_0000), FiberHandle::NULL);
    target.install_ring(&layout, ANCHOR, &[0x2000, 0x3000, 0x4000, 0x5000]);
    park_with_ip(&mut target, &layout, 0x2000, 0x44_0000);
    park_with_ip(&mut target, &layout, 0x3000, 0x41_0000);
    park_with_ip(&mut target, &layout, 0x4000, 0x44_0000);
    park_with_ip(&mut target, &layout, 0x5000, 0x41_0000);

    let state = StopState::build(&mut target, &layout).unwrap();
    for _ in 0..8 {
        let grouped = group_fibers(&mut target, &state, &layout, &NullSymbolizer, 0).unwrap();
        assert_eq!(grouped.groups.len(), 2);
        // Ordered by first member index, not by key hash.
        assert_eq!(grouped.groups[0].indices, vec![0, 2]);
        assert_eq!(grouped.groups[1].indices, vec![1, 3]);
    }
}

#[test]
fn compact_ranges_collapses_runs()
{
    assert_eq!(compact_ranges(&[]), "");
    assert_eq!(compact_ranges(&[4]), "4");
    assert_eq!(compact_ranges(&[0, 1]), "0-1");
    assert_eq!(compact_ranges(&[3, 4, 5, 8]), "3-5, 8");
    assert_eq!(compact_ranges(&[1, 3, 5]), "1, 3, 5");
    assert_eq!(compact_ranges(&[0, 1, 2, 7, 8, 11]), "0-2, 7-8, 11");
}
