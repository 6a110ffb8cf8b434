//! Host callback capability seam
//!
//! The host IDE consumes life-cycle notifications through a single
//! [`HostEvents::notify`] entry point. Three delivery disciplines exist and
//! must not be mixed: asynchronous events return immediately with no
//! ordering guarantee; synchronous-stop events leave the target stopped
//! until the host continues it; the synchronous-non-stop discipline is used
//! only for the program-destroy handshake.

use crate::types::{BreakpointOwner, ThreadId};

/// Identity of one delivered event; the host hands it back through
/// [`crate::Session::continue_from_synchronous_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventId(pub u64);

/// Allocates monotonically increasing event identities.
#[derive(Debug, Default)]
pub struct EventCounter {
    next: u64,
}

impl EventCounter {
    pub fn next(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }
}

/// Delivery discipline for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Fire-and-forget; no ordering guarantee relative to the caller
    Asynchronous,
    /// The target is considered stopped until the host continues it
    SynchronousStop,
    /// Delivered inline without stopping the target; program-destroy only
    SynchronousNonStop,
}

/// A life-cycle notification to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    /// The debug engine finished constructing for a launch
    EngineCreated,
    /// A module (ROM or program image) was added to the registry
    ModuleLoaded { name: String, base: u16, size: u32 },
    /// The target binary finished loading
    LoadComplete,
    /// Execution reached the target's entry address
    EntryPointReached,
    /// One batched stop naming every owner whose breakpoint was hit
    BreakpointsHit {
        thread: ThreadId,
        owners: Vec<BreakpointOwner>,
    },
    /// A step-over's transient breakpoint fired
    StepComplete { thread: ThreadId },
    /// The program was torn down; resources are released when the host
    /// continues from this event
    ProgramDestroyed,
}

/// Host callback capability: one notification entry point.
pub trait HostEvents {
    fn notify(&mut self, id: EventId, event: DebugEvent, delivery: Delivery);
}

/// Secondary observer informed of program destruction during phase-2
/// teardown, after the host has processed the destroy event.
pub trait PortObserver {
    fn program_destroyed(&mut self);
}
