//! Breakpoint management
//!
//! The [`BreakpointManager`] is the sole owner of the cookie-to-owner
//! mapping for host-visible breakpoints. It holds a simulator event
//! subscription exactly while its set is non-empty, and it never sees the
//! session's internal warm-up/entry/exit breakpoints: cookies it does not
//! own are silently skipped during hit dispatch.

use crate::error::{Error, Result};
use crate::host::{DebugEvent, Delivery, EventCounter, HostEvents};
use crate::simulator::{Cookie, Simulator};
use crate::types::{BreakpointKind, BreakpointOwner, ThreadId};
use tracing::warn;

/// One armed host-visible breakpoint.
#[derive(Debug, Clone)]
struct Entry {
    cookie: Cookie,
    owner: BreakpointOwner,
    kind: BreakpointKind,
    physical: bool,
    address: u16,
}

/// Public view of one armed breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointInfo {
    pub owner: BreakpointOwner,
    pub kind: BreakpointKind,
    pub physical: bool,
    pub address: u16,
}

/// Maps logical (host-visible) breakpoints to simulator cookies.
#[derive(Debug, Default)]
pub struct BreakpointManager {
    entries: Vec<Entry>,
}

impl BreakpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a breakpoint for `owner`.
    ///
    /// Fails with [`Error::DuplicateOwner`] if `owner` already has a live
    /// entry. On the first insertion the manager subscribes to simulator
    /// breakpoint events; if the simulator then rejects the arm request the
    /// subscription is rolled back before the error propagates.
    pub fn add<S: Simulator>(
        &mut self,
        sim: &mut S,
        owner: BreakpointOwner,
        kind: BreakpointKind,
        physical: bool,
        address: u16,
    ) -> Result<Cookie> {
        match kind {
            BreakpointKind::Code => {}
            BreakpointKind::Data => return Err(Error::NotImplemented("data breakpoints")),
        }
        if physical {
            return Err(Error::PhysicalSpaceUnsupported);
        }
        if self.contains(owner) {
            return Err(Error::DuplicateOwner(owner));
        }

        let was_empty = self.entries.is_empty();
        if was_empty {
            sim.subscribe()?;
        }

        let cookie = match sim.add_breakpoint(kind, physical, address) {
            Ok(cookie) => cookie,
            Err(err) => {
                if was_empty {
                    sim.unsubscribe();
                }
                return Err(err.into());
            }
        };

        self.entries.push(Entry {
            cookie,
            owner,
            kind,
            physical,
            address,
        });
        Ok(cookie)
    }

    /// Disarm and forget the breakpoint owned by `owner`.
    ///
    /// Drops the simulator event subscription when the set becomes empty.
    pub fn remove<S: Simulator>(&mut self, sim: &mut S, owner: BreakpointOwner) -> Result<()> {
        let index = self
            .entries
            .iter()
            .position(|e| e.owner == owner)
            .ok_or(Error::BreakpointNotFound(owner))?;

        let entry = self.entries.remove(index);
        let result = sim.remove_breakpoint(entry.cookie);
        if self.entries.is_empty() {
            sim.unsubscribe();
        }
        result.map_err(Into::into)
    }

    /// Whether `owner` has a live entry.
    pub fn contains(&self, owner: BreakpointOwner) -> bool {
        self.entries.iter().any(|e| e.owner == owner)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Owners of all live entries, in insertion order.
    pub fn owners(&self) -> impl Iterator<Item = BreakpointOwner> + '_ {
        self.entries.iter().map(|e| e.owner)
    }

    /// The armed address for `owner`, if any.
    pub fn address_of(&self, owner: BreakpointOwner) -> Option<u16> {
        self.entries.iter().find(|e| e.owner == owner).map(|e| e.address)
    }

    /// Snapshot of every live entry, for host breakpoint listings.
    pub fn list(&self) -> Vec<BreakpointInfo> {
        self.entries
            .iter()
            .map(|e| BreakpointInfo {
                owner: e.owner,
                kind: e.kind,
                physical: e.physical,
                address: e.address,
            })
            .collect()
    }

    /// Handle a simulator breakpoint-hit notification.
    ///
    /// Filters `cookies` to the ones this manager owns and, only when at
    /// least one matched, delivers a single batched stop event naming every
    /// matched owner, addressed to the session's thread. Unknown cookies
    /// belong to other owners (internal session breakpoints) and are
    /// ignored here.
    pub fn handle_breakpoint_hit<H: HostEvents>(
        &self,
        host: &mut H,
        events: &mut EventCounter,
        thread: ThreadId,
        cookies: &[Cookie],
    ) -> bool {
        let owners: Vec<BreakpointOwner> = self
            .entries
            .iter()
            .filter(|e| cookies.contains(&e.cookie))
            .map(|e| e.owner)
            .collect();

        if owners.is_empty() {
            return false;
        }

        host.notify(
            events.next(),
            DebugEvent::BreakpointsHit { thread, owners },
            Delivery::SynchronousStop,
        );
        true
    }

    /// Disarm everything, for session teardown. Simulator failures here are
    /// logged and ignored; the entries are dropped regardless.
    pub fn clear<S: Simulator>(&mut self, sim: &mut S) {
        let had_entries = !self.entries.is_empty();
        for entry in self.entries.drain(..) {
            if let Err(err) = sim.remove_breakpoint(entry.cookie) {
                warn!(owner = entry.owner.0, "failed to disarm breakpoint at teardown: {err}");
            }
        }
        if had_entries {
            sim.unsubscribe();
        }
    }
}
