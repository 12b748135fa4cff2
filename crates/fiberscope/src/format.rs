//! Text rendering for fiber tables, similarity groups, and backtraces.
//!
//! Pure string building so the command layer stays testable without capturing
//! stdout.

use std::fmt::Write as _;

use fiberscope_core::{compact_ranges, FiberRow, FiberStatus, Frame, GroupedFibers};

/// Render the fiber table, one line per catalog entry
///
/// The selected thread's current fiber is marked with `*` in the left
/// margin, the way debuggers mark the selected thread.
pub fn format_rows(rows: &[FiberRow]) -> String
{
    let mut out = String::new();
    for row in rows {
        let marker = if row.is_current { '*' } else { ' ' };
        let _ = write!(out, "{marker}{:4}  {}  ", row.index, row.handle);
        match &row.status {
            FiberStatus::Running { thread, frame } => match frame {
                Some(frame) => {
                    let _ = writeln!(out, "running on {thread}  {}", describe_frame(frame));
                }
                None => {
                    let _ = writeln!(out, "running on {thread}");
                }
            },
            FiberStatus::Parked(frame) => {
                let _ = writeln!(out, "parked at {}  {}", frame.ip, describe_frame(frame));
            }
            FiberStatus::Unavailable => {
                let _ = writeln!(out, "<context unavailable>");
            }
        }
    }
    out
}

/// Render grouped fibers: shared-stack groups first, then singles, then the
/// unavailable indices.
pub fn format_groups(grouped: &GroupedFibers) -> String
{
    let mut out = String::new();

    for group in &grouped.groups {
        let _ = writeln!(
            out,
            "fibers {} ({} fibers):",
            compact_ranges(&group.indices),
            group.indices.len()
        );
        let _ = write!(out, "{}", format_backtrace(&group.frames));
    }

    for single in &grouped.singles {
        let _ = writeln!(out, "fiber {}:", compact_ranges(&single.indices));
        let _ = write!(out, "{}", format_backtrace(&single.frames));
    }

    if !grouped.unavailable.is_empty() {
        let _ = writeln!(out, "unavailable: {}", compact_ranges(&grouped.unavailable));
    }

    out
}

/// Render a backtrace in the familiar numbered-frame shape.
pub fn format_backtrace(frames: &[Frame]) -> String
{
    let mut out = String::new();
    for (index, frame) in frames.iter().enumerate() {
        let _ = writeln!(out, "  #{index}  {} {}", frame.ip, describe_frame(frame));
    }
    out
}

fn describe_frame(frame: &Frame) -> String
{
    match (&frame.symbol, &frame.location) {
        (Some(symbol), Some(location)) => format!("in {symbol} at {location}"),
        (Some(symbol), None) => format!("in {symbol}"),
        (None, Some(location)) => format!("at {location}"),
        (None, None) => "in ??".to_string(),
    }
}
