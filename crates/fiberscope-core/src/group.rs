//! # Stack-similarity grouping
//!
//! Collapses a large fiber population into equivalence classes keyed by the
//! innermost portion of each fiber's stack, so an operator staring at ten
//! thousand parked fibers sees "9,998 blocked in the same place" plus the two
//! interesting ones. A group's key is the sequence of instruction pointers of
//! its innermost frames; a fiber stack shorter than the requested depth keys
//! on the frames it has.

use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::debug;

use crate::backtrace::{walk_frames, Frame};
use crate::catalog::StopState;
use crate::error::InspectResult;
use crate::layout::RuntimeLayout;
use crate::switch::with_fiber_context;
use crate::symbols::Symbolizer;
use crate::target::InspectionSession;

/// Grouping key: instruction pointers of the innermost frames, leaf first.
type SimilarityKey = SmallVec<[u64; 8]>;

/// A set of fibers whose innermost frames coincide.
#[derive(Debug, Clone)]
pub struct FiberGroup
{
    /// Catalog indices of the members, ascending.
    pub indices: Vec<usize>,
    /// Representative frames (from the first member, leaf first).
    pub frames: Vec<Frame>,
}

/// Result of grouping one stop event's fibers by stack similarity.
#[derive(Debug, Default)]
pub struct GroupedFibers
{
    /// Groups with at least two members, ordered by first member index.
    pub groups: Vec<FiberGroup>,
    /// Fibers whose stack matched no other fiber, ordered by index.
    pub singles: Vec<FiberGroup>,
    /// Fibers whose context could not be resolved, ordered by index.
    pub unavailable: Vec<usize>,
}

/// Group all cataloged fibers by their innermost `depth + 1` frames
///
/// Every fiber gets a scoped switch and a shallow frame walk; per-fiber
/// resolution failures land in `unavailable` rather than failing the batch.
/// Output order is deterministic for a given catalog: groups and singles are
/// ordered by their first member's catalog index.
pub fn group_fibers<S: InspectionSession + ?Sized>(
    session: &mut S,
    state: &StopState,
    layout: &RuntimeLayout,
    symbolizer: &dyn Symbolizer,
    depth: usize,
) -> InspectResult<GroupedFibers>
{
    let key_len = depth.saturating_add(1);
    let mut buckets: HashMap<SimilarityKey, FiberGroup> = HashMap::new();
    let mut order: Vec<SimilarityKey> = Vec::new();
    let mut unavailable = Vec::new();

    for (index, handle) in state.catalog.iter().enumerate() {
        let walked = with_fiber_context(session, &state.active, layout, handle, |session| {
            walk_frames(session, symbolizer, key_len)
        });

        let frames = match walked {
            Ok(frames) => frames,
            Err(err) => {
                debug!(fiber = %handle, %err, "fiber excluded from grouping");
                unavailable.push(index);
                continue;
            }
        };

        let key: SimilarityKey = frames.iter().map(|frame| frame.ip.value()).collect();
        let bucket = buckets.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            FiberGroup {
                indices: Vec::new(),
                frames,
            }
        });
        bucket.indices.push(index);
    }

    let mut groups = Vec::new();
    let mut singles = Vec::new();
    for key in order {
        if let Some(group) = buckets.remove(&key) {
            if group.indices.len() > 1 {
                groups.push(group);
            } else {
                singles.push(group);
            }
        }
    }

    Ok(GroupedFibers {
        groups,
        singles,
        unavailable,
    })
}

/// Render ascending indices as compact ranges: `{3, 4, 5, 8}` becomes `"3-5, 8"`.
pub fn compact_ranges(indices: &[usize]) -> String
{
    let mut parts: Vec<String> = Vec::new();
    let mut iter = indices.iter().copied();

    let Some(first) = iter.next() else {
        return String::new();
    };

    let mut start = first;
    let mut end = first;
    for index in iter {
        if index == end + 1 {
            end = index;
        } else {
            parts.push(render_range(start, end));
            start = index;
            end = index;
        }
    }
    parts.push(render_range(start, end));

    parts.join(", ")
}

fn render_range(start: usize, end: usize) -> String
{
    if start == end {
        start.to_string()
    } else {
        format!("{start}-{end}")
    }
}
