//! Debug-session orchestrator for a simulated Z80 target.
//!
//! This crate binds logical breakpoints to simulator addresses, drives the
//! launch/run/stop/step lifecycle of a simulated program, and resolves
//! between source locations and simulator addresses through per-module
//! symbol tables (see the `symtab` crate).
//!
//! The main types are:
//! - [`Session`] - The launch state machine and host-facing entry point
//! - [`BreakpointManager`] - Logical breakpoint to simulator cookie mapping
//! - [`ModuleRegistry`] - Loaded address ranges and lazy symbol resolution
//! - [`Simulator`] / [`HostEvents`] - The two capability seams
//!
//! Everything runs on one logical control thread; the only suspension
//! points are the blocking [`Simulator::resume`] calls.

pub mod breakpoints;
pub mod decode;
pub mod error;
pub mod host;
pub mod modules;
pub mod options;
pub mod session;
pub mod simulator;
pub mod stepping;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use breakpoints::{BreakpointInfo, BreakpointManager};
pub use error::{Error, Result};
pub use host::{DebugEvent, Delivery, EventId, HostEvents, PortObserver};
pub use modules::{BindResult, Module, ModuleRegistry, SourceRef, SymbolLoader};
pub use options::{LaunchOptions, TargetKind};
pub use session::Session;
pub use simulator::{Cookie, ResetFlags, SimStop, Simulator, SimulatorError};
pub use stepping::StepKind;
pub use types::{BreakpointKind, BreakpointOwner, CodeContext, ThreadId};
