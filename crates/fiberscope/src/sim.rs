//! In-process simulated debuggee.
//!
//! Implements the capability traits over a word-addressed memory image so the
//! `demo` subcommand and the command-layer tests can run the full inspection
//! workflow without a live process. The canned scenario mirrors a small
//! scheduler: a couple of OS threads, a ring of fibers parked in two distinct
//! wait sites, one fiber caught running, and one whose context is gone.

use std::collections::HashMap;

use fiberscope_core::{
    Address, FiberHandle, FrameSymbol, InspectError, InspectResult, InspectionSession, OsThreadId, RegisterContext,
    RuntimeLayout, SourceLocation, SymbolName, Symbolizer, TargetMemory,
};

#[derive(Debug, Clone)]
struct SimThread
{
    id: OsThreadId,
    registers: RegisterContext,
    current_fiber: FiberHandle,
    frame: usize,
}

/// Simulated stopped process with fiber-runtime metadata in memory.
#[derive(Debug, Default)]
pub struct SimTarget
{
    memory: HashMap<u64, u64>,
    symbols: HashMap<String, u64>,
    threads: Vec<SimThread>,
    selected: usize,
}

impl SimTarget
{
    /// Empty target; populate with the builder methods below.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Write one word of simulated memory.
    pub fn poke(&mut self, address: u64, value: u64)
    {
        self.memory.insert(address, value);
    }

    /// Publish a symbol at `address`.
    pub fn define_symbol(&mut self, name: &str, address: u64)
    {
        self.symbols.insert(name.to_string(), address);
    }

    /// Add an OS thread; the first one added starts selected.
    pub fn add_thread(&mut self, id: u64, registers: RegisterContext, current_fiber: FiberHandle)
    {
        self.threads.push(SimThread {
            id: OsThreadId::from(id),
            registers,
            current_fiber,
            frame: 0,
        });
    }

    /// Install the ring anchor and link `fibers` into a circular list.
    pub fn install_ring(&mut self, layout: &RuntimeLayout, anchor: u64, fibers: &[u64])
    {
        self.define_symbol(&layout.anchor_symbol, anchor);
        let mut node = anchor;
        for &fiber in fibers {
            self.poke(node + layout.link_next_offset, fiber);
            node = fiber;
        }
        self.poke(node + layout.link_next_offset, anchor);
    }

    /// Park `fiber`: persisted stack pointer plus the saved fp/ip slots.
    pub fn park_fiber(&mut self, layout: &RuntimeLayout, fiber: u64, persisted_sp: u64, fp: u64, ip: u64)
    {
        self.poke(fiber + layout.stack_pointer_offset, persisted_sp);
        self.poke(persisted_sp + layout.saved_fp_offset, fp);
        self.poke(persisted_sp + layout.saved_ip_offset, ip);
    }

    /// Link one stack frame: `[fp] = caller_fp`, `[fp + 8] = return_ip`.
    pub fn link_frame(&mut self, fp: u64, caller_fp: u64, return_ip: u64)
    {
        self.poke(fp, caller_fp);
        self.poke(fp + 8, return_ip);
    }

    /// Canned scenario used by the `demo` subcommand.
    ///
    /// Two threads, five fibers: fiber 0 running on thread 1, fibers 1-3
    /// parked at the same wait site under different callers collapsing to the
    /// same innermost frames, and fiber 4 with a null persisted stack pointer
    /// that no thread owns.
    pub fn demo() -> (Self, RuntimeLayout)
    {
        let layout = RuntimeLayout::default();
        let mut sim = Self::new();

        let running = 0x2000_u64;
        sim.add_thread(1, demo_ctx(0x7000, 0x7100, addr::MAIN_LOOP), FiberHandle::from(running));
        sim.add_thread(2, demo_ctx(0x7800, 0x7900, addr::IDLE), FiberHandle::NULL);
        sim.link_frame(0x7100, 0, addr::START);
        sim.link_frame(0x7900, 0, addr::START);

        sim.install_ring(&layout, 0x1000, &[running, 0x3000, 0x4000, 0x5000, 0x6000]);

        // Three fibers blocked on the same channel receive.
        for (fiber, caller_ip) in [(0x3000_u64, addr::WORKER_A), (0x4000, addr::WORKER_B), (0x5000, addr::WORKER_B)] {
            let persisted = fiber + 0x10_0000;
            let fp = persisted + 0x100;
            sim.park_fiber(&layout, fiber, persisted, fp, addr::CHANNEL_RECV);
            sim.link_frame(fp, fp + 0x40, caller_ip);
            sim.link_frame(fp + 0x40, 0, addr::FIBER_ENTRY);
        }

        // Running elsewhere: null persisted sp, not in any thread's indicator.
        sim.poke(0x6000 + layout.stack_pointer_offset, 0);

        (sim, layout)
    }

    fn selected_state(&self) -> &SimThread
    {
        &self.threads[self.selected]
    }

    fn selected_state_mut(&mut self) -> &mut SimThread
    {
        &mut self.threads[self.selected]
    }
}

impl TargetMemory for SimTarget
{
    fn read_word(&self, address: Address) -> InspectResult<u64>
    {
        self.memory
            .get(&address.value())
            .copied()
            .ok_or(InspectError::MemoryRead {
                address,
                details: "address not mapped".to_string(),
            })
    }

    fn resolve_symbol(&self, name: &str) -> Option<Address>
    {
        self.symbols.get(name).copied().map(Address::from)
    }
}

impl InspectionSession for SimTarget
{
    fn threads(&self) -> Vec<OsThreadId>
    {
        self.threads.iter().map(|t| t.id).collect()
    }

    fn selected_thread(&self) -> OsThreadId
    {
        self.selected_state().id
    }

    fn select_thread(&mut self, thread: OsThreadId) -> InspectResult<()>
    {
        match self.threads.iter().position(|t| t.id == thread) {
            Some(index) => {
                self.selected = index;
                Ok(())
            }
            None => Err(InspectError::Session(format!("no such thread: {thread}"))),
        }
    }

    fn current_registers(&self) -> InspectResult<RegisterContext>
    {
        Ok(self.selected_state().registers)
    }

    fn set_registers(&mut self, context: &RegisterContext) -> InspectResult<()>
    {
        self.selected_state_mut().registers = *context;
        Ok(())
    }

    fn current_fiber(&self) -> InspectResult<FiberHandle>
    {
        Ok(self.selected_state().current_fiber)
    }

    fn set_current_fiber(&mut self, fiber: FiberHandle) -> InspectResult<()>
    {
        self.selected_state_mut().current_fiber = fiber;
        Ok(())
    }

    fn selected_frame(&self) -> usize
    {
        self.selected_state().frame
    }

    fn select_frame(&mut self, index: usize) -> InspectResult<()>
    {
        self.selected_state_mut().frame = index;
        Ok(())
    }

    fn select_innermost_frame(&mut self)
    {
        self.selected_state_mut().frame = 0;
    }
}

/// Instruction-pointer constants for the demo program's functions.
mod addr
{
    pub const START: u64 = 0x40_0100;
    pub const MAIN_LOOP: u64 = 0x40_1000;
    pub const IDLE: u64 = 0x40_1800;
    pub const FIBER_ENTRY: u64 = 0x40_2000;
    pub const WORKER_A: u64 = 0x40_3000;
    pub const WORKER_B: u64 = 0x40_4000;
    pub const CHANNEL_RECV: u64 = 0x40_5000;
}

/// Table-driven symbolizer for the demo scenario.
#[derive(Debug, Default)]
pub struct SimSymbolizer;

impl Symbolizer for SimSymbolizer
{
    fn symbolicate(&self, address: Address) -> Option<FrameSymbol>
    {
        let (name, file, line) = match address.value() {
            addr::START => ("demo::start", "src/main.rs", 12),
            addr::MAIN_LOOP => ("demo::scheduler::run", "src/scheduler.rs", 88),
            addr::IDLE => ("demo::scheduler::idle", "src/scheduler.rs", 140),
            addr::FIBER_ENTRY => ("demo::fiber_entry", "src/fiber.rs", 31),
            addr::WORKER_A => ("demo::worker::ingest", "src/worker.rs", 54),
            addr::WORKER_B => ("demo::worker::flush", "src/worker.rs", 97),
            addr::CHANNEL_RECV => ("demo::channel::recv", "src/channel.rs", 210),
            _ => return None,
        };

        Some(FrameSymbol {
            name: SymbolName::new(name.to_string(), None),
            location: Some(SourceLocation {
                file: file.to_string(),
                line: Some(line),
            }),
        })
    }
}

fn demo_ctx(sp: u64, fp: u64, ip: u64) -> RegisterContext
{
    RegisterContext::new(Address::from(sp), Address::from(fp), Address::from(ip))
}
