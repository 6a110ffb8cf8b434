//! Scripted test doubles
//!
//! [`MockSimulator`] implements the simulator seam over a 64K byte array
//! with a scripted run plan: each `resume` jumps to the next queued stop
//! address and reports whichever breakpoints are armed there. The mock
//! records every call that matters for asserting orchestration order.

use crate::host::{DebugEvent, Delivery, EventId, HostEvents, PortObserver};
use crate::modules::SymbolLoader;
use crate::simulator::{Cookie, ResetFlags, SimResult, SimStop, Simulator, SimulatorError};
use crate::types::BreakpointKind;
use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use symtab::SymbolTable;

pub(crate) struct MockSimulator {
    memory: Vec<u8>,
    pc: u16,
    running: bool,
    armed: HashMap<Cookie, (BreakpointKind, bool, u16)>,
    next_cookie: u64,
    subscribers: u32,
    /// Addresses the next `resume` calls will stop at, in order
    run_targets: VecDeque<u16>,
    fail_next_add: Option<String>,
    fail_next_snapshot: Option<String>,
    binary_size: u32,
    pub loaded_binaries: Vec<(String, u16)>,
    pub loaded_snapshots: Vec<String>,
    pub resets: Vec<ResetFlags>,
    pub break_now_calls: u32,
    pub resume_calls: u32,
    pub step_calls: u32,
}

impl MockSimulator {
    pub fn new() -> Self {
        Self {
            memory: vec![0; 0x10000],
            pc: 0,
            running: false,
            armed: HashMap::new(),
            next_cookie: 1,
            subscribers: 0,
            run_targets: VecDeque::new(),
            fail_next_add: None,
            fail_next_snapshot: None,
            binary_size: 0x100,
            loaded_binaries: Vec::new(),
            loaded_snapshots: Vec::new(),
            resets: Vec::new(),
            break_now_calls: 0,
            resume_calls: 0,
            step_calls: 0,
        }
    }

    pub fn subscriber_count(&self) -> u32 {
        self.subscribers
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    pub fn armed_addresses(&self) -> Vec<u16> {
        self.armed.values().map(|(_, _, addr)| *addr).collect()
    }

    pub fn fail_next_add_breakpoint(&mut self, msg: &str) {
        self.fail_next_add = Some(msg.to_string());
    }

    pub fn fail_next_load_snapshot(&mut self, msg: &str) {
        self.fail_next_snapshot = Some(msg.to_string());
    }

    pub fn set_binary_size(&mut self, size: u32) {
        self.binary_size = size;
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Queue the address the next `resume` stops at.
    pub fn queue_stop_at(&mut self, address: u16) {
        self.run_targets.push_back(address);
    }

    pub fn memory_at(&self, address: u16, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| self.memory[address.wrapping_add(i as u16) as usize])
            .collect()
    }

    pub fn poke(&mut self, address: u16, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.memory[address.wrapping_add(i as u16) as usize] = *byte;
        }
    }

    fn cookies_at(&self, address: u16) -> Vec<Cookie> {
        let mut hit: Vec<Cookie> = self
            .armed
            .iter()
            .filter(|(_, (_, _, addr))| *addr == address)
            .map(|(cookie, _)| *cookie)
            .collect();
        hit.sort_by_key(|c| c.0);
        hit
    }
}

impl Simulator for MockSimulator {
    fn break_now(&mut self) -> SimResult<()> {
        self.break_now_calls += 1;
        self.running = false;
        Ok(())
    }

    fn reset(&mut self, flags: ResetFlags) -> SimResult<()> {
        self.resets.push(flags);
        if flags.contains(ResetFlags::MEMORY) {
            self.memory.fill(0);
        }
        if flags.contains(ResetFlags::CPU) {
            self.pc = 0;
        }
        Ok(())
    }

    fn resume(&mut self, check_breakpoints_at_pc: bool) -> SimResult<SimStop> {
        self.resume_calls += 1;
        self.running = false;
        if check_breakpoints_at_pc {
            let here = self.cookies_at(self.pc);
            if !here.is_empty() {
                return Ok(SimStop::BreakpointsHit(here));
            }
        }
        match self.run_targets.pop_front() {
            Some(target) => {
                self.pc = target;
                let hit = self.cookies_at(target);
                if hit.is_empty() {
                    Ok(SimStop::Paused)
                } else {
                    Ok(SimStop::BreakpointsHit(hit))
                }
            }
            None => Ok(SimStop::Paused),
        }
    }

    fn step_instruction(&mut self) -> SimResult<()> {
        self.step_calls += 1;
        self.pc = self.pc.wrapping_add(1);
        Ok(())
    }

    fn add_breakpoint(
        &mut self,
        kind: BreakpointKind,
        physical: bool,
        address: u16,
    ) -> SimResult<Cookie> {
        if let Some(msg) = self.fail_next_add.take() {
            return Err(SimulatorError(msg));
        }
        let cookie = Cookie(self.next_cookie);
        self.next_cookie += 1;
        self.armed.insert(cookie, (kind, physical, address));
        Ok(cookie)
    }

    fn remove_breakpoint(&mut self, cookie: Cookie) -> SimResult<()> {
        self.armed
            .remove(&cookie)
            .map(|_| ())
            .ok_or_else(|| SimulatorError(format!("unknown cookie {}", cookie.0)))
    }

    fn read_memory(&self, address: u16, buf: &mut [u8]) -> SimResult<()> {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.memory[address.wrapping_add(i as u16) as usize];
        }
        Ok(())
    }

    fn write_memory(&mut self, address: u16, data: &[u8]) -> SimResult<()> {
        self.poke(address, data);
        Ok(())
    }

    fn load_binary(&mut self, path: &str, base: u16) -> SimResult<u32> {
        self.loaded_binaries.push((path.to_string(), base));
        Ok(self.binary_size)
    }

    fn load_snapshot(&mut self, path: &str) -> SimResult<()> {
        if let Some(msg) = self.fail_next_snapshot.take() {
            return Err(SimulatorError(msg));
        }
        self.loaded_snapshots.push(path.to_string());
        Ok(())
    }

    fn pc(&self) -> SimResult<u16> {
        Ok(self.pc)
    }

    fn set_pc(&mut self, pc: u16) -> SimResult<()> {
        self.pc = pc;
        Ok(())
    }

    fn subscribe(&mut self) -> SimResult<()> {
        self.subscribers += 1;
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.subscribers = self.subscribers.saturating_sub(1);
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// Host double that records every notification in order.
pub(crate) struct RecordingHost {
    events: Vec<(EventId, DebugEvent, Delivery)>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn events(&self) -> &[(EventId, DebugEvent, Delivery)] {
        &self.events
    }
}

impl HostEvents for RecordingHost {
    fn notify(&mut self, id: EventId, event: DebugEvent, delivery: Delivery) {
        self.events.push((id, event, delivery));
    }
}

/// Port observer double that counts destroy notifications through a
/// shared cell, so tests can inspect the count after handing the observer
/// to a session.
pub(crate) struct RecordingPort {
    destroyed: Rc<Cell<u32>>,
}

impl RecordingPort {
    pub fn new() -> Self {
        Self {
            destroyed: Rc::new(Cell::new(0)),
        }
    }

    pub fn destroyed(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.destroyed)
    }
}

impl PortObserver for RecordingPort {
    fn program_destroyed(&mut self) {
        self.destroyed.set(self.destroyed.get() + 1);
    }
}

/// Symbol loader double that counts invocations.
pub(crate) struct CountingLoader<F> {
    load: F,
    calls: Rc<Cell<u32>>,
}

impl<F> CountingLoader<F>
where
    F: Fn(&str) -> Result<SymbolTable, String>,
{
    pub fn new(load: F) -> Self {
        Self {
            load,
            calls: Rc::new(Cell::new(0)),
        }
    }

    pub fn calls(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.calls)
    }
}

impl<F> SymbolLoader for CountingLoader<F>
where
    F: Fn(&str) -> Result<SymbolTable, String>,
{
    fn load(&self, path: &str) -> Result<SymbolTable, String> {
        self.calls.set(self.calls.get() + 1);
        (self.load)(path)
    }
}
