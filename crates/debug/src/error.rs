//! Error taxonomy for the debug orchestrator

use crate::simulator::SimulatorError;
use crate::types::BreakpointOwner;
use thiserror::Error;

/// Crate-level result type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the debug orchestrator.
///
/// Allocation and simulator failures always propagate to the caller; the
/// only swallowed (logged) failures are best-effort breakpoint re-binding
/// after a module load and internal-breakpoint cleanup at terminate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("breakpoint owner {0} already registered")]
    DuplicateOwner(BreakpointOwner),

    #[error("breakpoint owner {0} not found")]
    BreakpointNotFound(BreakpointOwner),

    #[error("no module covers address {address:#06x}")]
    ModuleNotFound { address: u16 },

    #[error("symbol not found: {name}")]
    SymbolNotFound { name: String },

    #[error("no statement for {file}:{line}")]
    LineNotFound { file: String, line: u32 },

    #[error("address {address:#06x} has no source mapping")]
    AddressUnmapped { address: u16 },

    #[error("symbol table unavailable for module {module}")]
    SymbolTableUnavailable { module: String },

    #[error("invalid launch options: {0}")]
    OptionsInvalid(String),

    #[error("unsupported target file: {path}")]
    UnsupportedTarget { path: String },

    #[error("simulator failure: {0}")]
    Simulator(#[from] SimulatorError),

    /// Snapshot load failures keep the simulator's detail here because the
    /// generic failure code loses it on the way up through the host layers.
    #[error("failed to load snapshot {path}: {detail}")]
    SnapshotLoadFailed { path: String, detail: String },

    #[error("allocation failure")]
    AllocationFailure,

    #[error("physical memory space is not supported")]
    PhysicalSpaceUnsupported,

    /// The host integration has no implementation for this operation.
    /// Distinct from "unsupported": the contract requires the entry point,
    /// nothing answers it yet.
    #[error("not implemented by the host integration: {0}")]
    NotImplemented(&'static str),

    #[error("{operation} is not valid while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}
