//! Simulator capability seam
//!
//! The [`Simulator`] trait abstracts the in-process CPU simulator, allowing
//! the session logic to run against a scripted mock in tests. The simulator
//! executes synchronously on the control thread: [`Simulator::resume`]
//! blocks the caller until the next stop condition.

use crate::types::BreakpointKind;
use thiserror::Error;

/// Opaque handle identifying one armed simulator breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cookie(pub u64);

/// Failure reported by the simulator capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct SimulatorError(pub String);

/// Result type for simulator calls
pub type SimResult<T> = std::result::Result<T, SimulatorError>;

bitflags::bitflags! {
    /// What a [`Simulator::reset`] clears
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResetFlags: u8 {
        /// Reset CPU registers and program counter
        const CPU = 0b0000_0001;
        /// Clear RAM contents
        const MEMORY = 0b0000_0010;
    }
}

/// Why a blocking [`Simulator::resume`] returned.
///
/// A breakpoint stop always carries the full set of cookies hit at that
/// address; each owner inspects only its own cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimStop {
    /// One or more armed breakpoints were hit
    BreakpointsHit(Vec<Cookie>),
    /// The simulator paused for another reason (host break, idle)
    Paused,
}

/// Abstract interface to the CPU simulator.
///
/// Implementors run the simulated target in-process. All calls are
/// synchronous; `resume` is the single suspension point of the whole
/// orchestration layer.
pub trait Simulator {
    /// Stop execution if the simulator is currently free-running.
    fn break_now(&mut self) -> SimResult<()>;

    /// Reset the simulated machine.
    fn reset(&mut self, flags: ResetFlags) -> SimResult<()>;

    /// Run until the next stop condition and return it.
    ///
    /// `check_breakpoints_at_pc` controls whether a breakpoint armed at the
    /// current program counter fires immediately; callers that already
    /// accounted for the current location pass `false`.
    fn resume(&mut self, check_breakpoints_at_pc: bool) -> SimResult<SimStop>;

    /// Execute exactly one instruction.
    fn step_instruction(&mut self) -> SimResult<()>;

    /// Arm a breakpoint and return its cookie.
    fn add_breakpoint(
        &mut self,
        kind: BreakpointKind,
        physical: bool,
        address: u16,
    ) -> SimResult<Cookie>;

    /// Disarm a breakpoint. Disarming an unknown cookie is an error.
    fn remove_breakpoint(&mut self, cookie: Cookie) -> SimResult<()>;

    /// Read `buf.len()` bytes starting at `address`, wrapping at 64K.
    fn read_memory(&self, address: u16, buf: &mut [u8]) -> SimResult<()>;

    /// Write `data` starting at `address`, wrapping at 64K.
    fn write_memory(&mut self, address: u16, data: &[u8]) -> SimResult<()>;

    /// Load a raw binary image at `base`; returns the image size in bytes.
    fn load_binary(&mut self, path: &str, base: u16) -> SimResult<u32>;

    /// Load a machine snapshot (memory plus register state).
    fn load_snapshot(&mut self, path: &str) -> SimResult<()>;

    /// Read the program counter.
    fn pc(&self) -> SimResult<u16>;

    /// Set the program counter.
    fn set_pc(&mut self, pc: u16) -> SimResult<()>;

    /// Register interest in breakpoint-hit stops. Subscriptions nest; the
    /// implementation reference-counts them.
    fn subscribe(&mut self) -> SimResult<()>;

    /// Drop one level of breakpoint-event interest.
    fn unsubscribe(&mut self);

    /// Whether the simulator is currently free-running (not stopped).
    fn is_running(&self) -> bool;
}
