//! # Fiber catalog and active map
//!
//! On every debuggee-stop event the inspector rebuilds its entire view of the
//! target's fibers: the ordered catalog (ring-traversal order), the map of
//! fibers caught mid-execution on an OS thread, and a per-thread snapshot of
//! true register state used by the explicit reset command. Nothing here is
//! updated incrementally: a [`StopState`] is valid for exactly one stop
//! event and replaced wholesale on the next.

use std::collections::BTreeMap;
use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{InspectError, InspectResult};
use crate::layout::{RuntimeLayout, MAX_RING_NODES};
use crate::target::InspectionSession;
use crate::types::{Address, FiberHandle, OsThreadId, RegisterContext};

/// Ordered collection of live fiber handles
///
/// Insertion order is the traversal order of the target's intrusive circular
/// list, starting just after the anchor node and stopping when the anchor
/// recurs. Rebuilt fully on each stop event.
#[derive(Debug, Default, Clone)]
pub struct FiberCatalog
{
    handles: Vec<FiberHandle>,
}

impl FiberCatalog
{
    /// Number of cataloged fibers.
    pub fn len(&self) -> usize
    {
        self.handles.len()
    }

    /// Returns `true` when the target has no live fibers.
    pub fn is_empty(&self) -> bool
    {
        self.handles.is_empty()
    }

    /// Handle at `index`, with bounds reported as a typed error
    ///
    /// ## Errors
    ///
    /// - `IndexOutOfRange`: `index >= len()`. No context switch or memory
    ///   read happens for an out-of-range request.
    pub fn handle(&self, index: usize) -> InspectResult<FiberHandle>
    {
        self.handles.get(index).copied().ok_or(InspectError::IndexOutOfRange {
            index,
            len: self.handles.len(),
        })
    }

    /// Iterate handles in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = FiberHandle> + '_
    {
        self.handles.iter().copied()
    }
}

/// Where a currently-executing fiber was found.
#[derive(Debug, Clone, Copy)]
pub struct ActiveEntry
{
    /// Live register context read from the owning thread.
    pub context: RegisterContext,
    /// The OS thread the fiber is executing on.
    pub thread: OsThreadId,
}

/// Map from currently-executing fiber to its live context
///
/// Authoritative over the fiber's on-stack saved state: a running fiber has
/// not written its registers back to its saved-context slot, so the live CPU
/// values cached here are the only correct answer for it.
#[derive(Debug, Default, Clone)]
pub struct ActiveMap
{
    entries: HashMap<FiberHandle, ActiveEntry>,
}

impl ActiveMap
{
    /// Look up the live entry for `handle`, if it is executing.
    pub fn get(&self, handle: FiberHandle) -> Option<&ActiveEntry>
    {
        self.entries.get(&handle)
    }

    /// Returns `true` if `handle` is executing on some OS thread.
    pub fn contains(&self, handle: FiberHandle) -> bool
    {
        self.entries.contains_key(&handle)
    }

    /// Number of executing fibers observed at stop time.
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Returns `true` when no thread was running a fiber at stop time.
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}

/// True state of one OS thread, captured at stop time.
#[derive(Debug, Clone, Copy)]
pub struct ThreadSnapshot
{
    /// Live registers at the stop event.
    pub context: RegisterContext,
    /// The thread's current-fiber indicator at the stop event.
    pub current_fiber: FiberHandle,
}

/// Everything the inspector knows about fibers for one stop event
///
/// Owns the catalog, the active map, and the per-thread snapshots. This
/// replaces mutable module-level caches: staleness is impossible because the
/// only way to obtain a `StopState` is to build a fresh one.
#[derive(Debug, Default)]
pub struct StopState
{
    /// Ordered fiber handles.
    pub catalog: FiberCatalog,
    /// Fibers caught mid-execution.
    pub active: ActiveMap,
    /// Per-thread true state for restoration.
    pub threads: BTreeMap<OsThreadId, ThreadSnapshot>,
}

impl StopState
{
    /// Build the catalog, active map, and thread snapshots from a stopped target
    ///
    /// Walks the fiber ring from the anchor, then visits every OS thread to
    /// record its live registers and current-fiber indicator. The originally
    /// selected thread is reselected before returning, on success and on
    /// error.
    ///
    /// ## Errors
    ///
    /// - `UnsupportedTarget`: no fiber-debugging metadata in the target
    ///   (missing anchor symbol or layout version mismatch).
    /// - `MemoryRead` / `Session`: the host failed mid-scan; the selected
    ///   thread is still restored.
    pub fn build<S: InspectionSession + ?Sized>(session: &mut S, layout: &RuntimeLayout) -> InspectResult<Self>
    {
        let anchor = layout.locate_anchor(session)?;
        let catalog = walk_ring(session, layout, anchor)?;

        let original = session.selected_thread();
        let scan = scan_threads(session);
        session.select_thread(original)?;
        let (active, threads) = scan?;

        debug!(
            fibers = catalog.len(),
            active = active.len(),
            threads = threads.len(),
            "rebuilt fiber stop state"
        );

        Ok(Self {
            catalog,
            active,
            threads,
        })
    }
}

/// Traverse the intrusive circular list starting just after `anchor`.
fn walk_ring<M: InspectionSession + ?Sized>(
    memory: &M,
    layout: &RuntimeLayout,
    anchor: Address,
) -> InspectResult<FiberCatalog>
{
    let mut handles = Vec::new();
    let mut node = Address::from(memory.read_word_at_offset(anchor, layout.link_next_offset)?);

    while node != anchor {
        if handles.len() >= MAX_RING_NODES {
            warn!(cap = MAX_RING_NODES, "fiber ring traversal hit the node cap; list may be corrupted");
            break;
        }

        handles.push(FiberHandle::from(node));
        let next = Address::from(memory.read_word_at_offset(node, layout.link_next_offset)?);
        if next == node {
            // Self-referencing link: the ring is transiently inconsistent.
            warn!(node = %node, "fiber ring node links to itself; stopping traversal early");
            break;
        }
        node = next;
    }

    Ok(FiberCatalog { handles })
}

/// Visit every OS thread and record its live state.
///
/// Caller is responsible for reselecting the original thread afterwards.
fn scan_threads<S: InspectionSession + ?Sized>(
    session: &mut S,
) -> InspectResult<(ActiveMap, BTreeMap<OsThreadId, ThreadSnapshot>)>
{
    let mut active = ActiveMap::default();
    let mut threads = BTreeMap::new();

    for thread in session.threads() {
        session.select_thread(thread)?;
        let context = session.current_registers()?;
        let current_fiber = session.current_fiber()?;

        threads.insert(
            thread,
            ThreadSnapshot {
                context,
                current_fiber,
            },
        );
        if !current_fiber.is_null() {
            active.entries.insert(current_fiber, ActiveEntry { context, thread });
        }
    }

    Ok((active, threads))
}
