//! Core value types

use crate::error::{Error, Result};
use std::fmt;

/// Identity of a host-visible logical breakpoint.
///
/// The breakpoint manager stores owner identities, never the host's bound
/// breakpoint objects themselves; the host keeps those alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BreakpointOwner(pub u32);

impl fmt::Display for BreakpointOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of breakpoint. Data breakpoints are unsupported by the simulator
/// integration and fail with [`Error::NotImplemented`] at the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    /// Breaks when the program counter reaches the address
    Code,
    /// Breaks on access to the address (unsupported)
    Data,
}

/// The session's single simulated thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadId(pub u32);

/// An immutable location in the simulated address space.
///
/// `physical` tags the larger backing-store space, which is unsupported
/// everywhere: operations on a physical context fail distinctly instead of
/// silently degrading. Equality is by `(physical, address)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeContext {
    /// Whether this context addresses the physical backing store
    pub physical: bool,
    /// 16-bit address in the simulated CPU's space
    pub address: u16,
}

impl CodeContext {
    /// A context in the simulated (non-physical) address space.
    pub fn simulated(address: u16) -> Self {
        Self {
            physical: false,
            address,
        }
    }

    /// Advance the context. Wraps at 16 bits in the simulated space.
    pub fn add(&self, count: u16) -> Result<CodeContext> {
        if self.physical {
            return Err(Error::PhysicalSpaceUnsupported);
        }
        Ok(CodeContext {
            physical: false,
            address: self.address.wrapping_add(count),
        })
    }

    /// Move the context backwards. Wraps at 16 bits in the simulated space.
    pub fn subtract(&self, count: u16) -> Result<CodeContext> {
        if self.physical {
            return Err(Error::PhysicalSpaceUnsupported);
        }
        Ok(CodeContext {
            physical: false,
            address: self.address.wrapping_sub(count),
        })
    }
}
