//! In-memory fake of a stopped debuggee for integration tests.
//!
//! Models everything the capability traits expose: a word-addressed memory
//! image, a symbol table, and per-thread selection state (registers, fiber
//! indicator, frame index). Helpers build fiber rings and frame chains the
//! way the runtime lays them out.

#![allow(dead_code)] // not every test binary uses every helper

use std::collections::{HashMap, HashSet};

use fiberscope_core::{
    Address, FiberHandle, InspectError, InspectResult, InspectionSession, OsThreadId, RegisterContext, RuntimeLayout,
    TargetMemory,
};

/// One simulated OS thread's selection-visible state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeThread
{
    pub id: OsThreadId,
    pub registers: RegisterContext,
    pub current_fiber: FiberHandle,
    pub frame: usize,
}

#[derive(Debug, Default)]
pub struct FakeTarget
{
    memory: HashMap<u64, u64>,
    symbols: HashMap<String, u64>,
    poisoned: HashSet<u64>,
    threads: Vec<FakeThread>,
    selected: usize,
}

impl FakeTarget
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Write one word of target memory.
    pub fn poke(&mut self, address: u64, value: u64)
    {
        self.memory.insert(address, value);
    }

    /// Make reads of `address` fail like an unmapped page.
    pub fn poison(&mut self, address: u64)
    {
        self.poisoned.insert(address);
    }

    pub fn define_symbol(&mut self, name: &str, address: u64)
    {
        self.symbols.insert(name.to_string(), address);
    }

    pub fn add_thread(&mut self, id: u64, registers: RegisterContext, current_fiber: FiberHandle)
    {
        self.threads.push(FakeThread {
            id: OsThreadId::from(id),
            registers,
            current_fiber,
            frame: 0,
        });
    }

    /// Install the anchor symbol and a circular ring containing `fibers`.
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

    /// Park `fiber` with a persisted stack pointer and saved registers.
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

    /// Clone of all thread states, for before/after restoration checks.
    pub fn thread_states(&self) -> Vec<FakeThread>
    {
        self.threads.clone()
    }

    fn selected_state(&self) -> &FakeThread
    {
        &self.threads[self.selected]
    }

    fn selected_state_mut(&mut self) -> &mut FakeThread
    {
        &mut self.threads[self.selected]
    }
}

impl TargetMemory for FakeTarget
{
    fn read_word(&self, address: Address) -> InspectResult<u64>
    {
        let addr = address.value();
        if self.poisoned.contains(&addr) {
            return Err(InspectError::MemoryRead {
                address,
                details: "address not mapped".to_string(),
            });
        }
        self.memory.get(&addr).copied().ok_or(InspectError::MemoryRead {
            address,
            details: "address not mapped".to_string(),
        })
    }

    fn resolve_symbol(&self, name: &str) -> Option<Address>
    {
        self.symbols.get(name).copied().map(Address::from)
    }
}

impl InspectionSession for FakeTarget
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

/// Register context shorthand.
pub fn ctx(sp: u64, fp: u64, ip: u64) -> RegisterContext
{
    RegisterContext::new(Address::from(sp), Address::from(fp), Address::from(ip))
}
