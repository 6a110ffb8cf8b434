//! Step-over support
//!
//! Step-into is a single simulator instruction step. Step-over is the same
//! unless the instruction at the program counter is a call-like form, in
//! which case a transient breakpoint is armed at the following instruction
//! and the target resumed. The transient breakpoint is never entered into
//! the breakpoint manager; its cookie is session-internal and must be
//! disarmed on every exit path, hit or not.

use crate::decode::classify_call_form;
use crate::error::Result;
use crate::simulator::{Cookie, Simulator};
use crate::types::BreakpointKind;
use tracing::warn;

/// How a step request executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Execute exactly one instruction, entering calls
    Into,
    /// Run call-like instructions to completion
    Over,
}

/// Where step-over should stop for the instruction at `pc`, or `None` when
/// a plain single step suffices.
///
/// Reads the two bytes at `pc` through the simulator; a truncated or
/// unrecognized encoding classifies as plain (fail closed).
pub fn step_over_target<S: Simulator>(sim: &S, pc: u16) -> Result<Option<u16>> {
    let mut bytes = [0u8; 2];
    sim.read_memory(pc, &mut bytes)?;
    Ok(classify_call_form(&bytes).map(|form| pc.wrapping_add(form.length())))
}

/// A session-internal breakpoint armed for the duration of one step-over.
///
/// Not a RAII guard: the simulator borrow cannot be held across the resume
/// that follows arming, so the caller disarms explicitly. [`disarm`] is
/// idempotent and never fails; simulator errors during removal are logged.
///
/// [`disarm`]: TransientBreakpoint::disarm
#[derive(Debug)]
pub struct TransientBreakpoint {
    cookie: Cookie,
    armed: bool,
}

impl TransientBreakpoint {
    /// Arm a code breakpoint at `address`.
    pub fn arm<S: Simulator>(sim: &mut S, address: u16) -> Result<Self> {
        let cookie = sim.add_breakpoint(BreakpointKind::Code, false, address)?;
        Ok(Self {
            cookie,
            armed: true,
        })
    }

    /// Whether this breakpoint is among the cookies of a stop.
    pub fn matches(&self, cookies: &[Cookie]) -> bool {
        self.armed && cookies.contains(&self.cookie)
    }

    /// Disarm the breakpoint. Safe to call more than once.
    pub fn disarm<S: Simulator>(&mut self, sim: &mut S) {
        if !self.armed {
            return;
        }
        self.armed = false;
        if let Err(err) = sim.remove_breakpoint(self.cookie) {
            warn!("failed to disarm transient step breakpoint: {err}");
        }
    }
}
