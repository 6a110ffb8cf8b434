//! Module registry and cross-module symbol resolution
//!
//! A module is one loaded address range (the ROM, or a program image).
//! Lookup is first-match-wins in load order; the registry does not reject
//! overlaps because callers add modules in a fixed order. Each module's
//! symbol table is resolved at most once, lazily, and a failed parse is
//! cached so repeated queries never re-parse.

use crate::breakpoints::BreakpointManager;
use crate::error::{Error, Result};
use crate::host::{DebugEvent, Delivery, EventCounter, HostEvents};
use crate::simulator::Simulator;
use crate::types::{BreakpointKind, BreakpointOwner};
use symtab::{LabelKind, SymbolTable};
use tracing::{debug, warn};

/// Parses one module's symbol text into a queryable table.
///
/// The text grammar is the host's business; this core only consumes the
/// resulting query surface.
pub trait SymbolLoader {
    fn load(&self, path: &str) -> std::result::Result<SymbolTable, String>;
}

/// Lazy symbol-table state. `Failed` is distinct from `Unresolved` so a
/// failed parse is attempted exactly once.
#[derive(Debug)]
enum SymbolCache {
    Unresolved,
    Resolved(SymbolTable),
    Failed,
}

/// One loaded address range.
#[derive(Debug)]
pub struct Module {
    /// First address covered by the module
    pub base: u16,
    /// Size in bytes (may extend to the top of the address space)
    pub size: u32,
    /// Path of the binary image backing this range
    pub backing_path: String,
    /// Symbol file, if the host supplied one
    pub symbol_path: Option<String>,
    /// Whether this is the user's program (as opposed to the ROM)
    pub is_user_code: bool,
    symbols: SymbolCache,
}

impl Module {
    pub fn new(
        base: u16,
        size: u32,
        backing_path: impl Into<String>,
        symbol_path: Option<String>,
        is_user_code: bool,
    ) -> Self {
        Self {
            base,
            size,
            backing_path: backing_path.into(),
            symbol_path,
            is_user_code,
            symbols: SymbolCache::Unresolved,
        }
    }

    /// Whether `[base, base+size)` contains `address`.
    pub fn contains(&self, address: u16) -> bool {
        let addr = address as u32;
        let base = self.base as u32;
        addr >= base && addr < base + self.size
    }
}

/// A source-level location a breakpoint was requested at but could not yet
/// be bound to, for lack of a covering module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Line { file: String, line: u32 },
    Symbol { name: String },
}

#[derive(Debug)]
struct UnboundBreakpoint {
    owner: BreakpointOwner,
    location: SourceRef,
}

/// Outcome of binding a source-level breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindResult {
    /// The location resolved and the breakpoint is armed
    Bound,
    /// No loaded module resolves the location yet; the request is parked
    /// and re-attempted on every module load
    Pending,
}

/// Ordered set of loaded modules plus the unbound-breakpoint ledger.
pub struct ModuleRegistry {
    modules: Vec<Module>,
    loader: Box<dyn SymbolLoader>,
    unbound: Vec<UnboundBreakpoint>,
}

impl ModuleRegistry {
    pub fn new(loader: Box<dyn SymbolLoader>) -> Self {
        Self {
            modules: Vec::new(),
            loader,
            unbound: Vec::new(),
        }
    }

    /// Append a module, notify the host, and re-attempt binding of parked
    /// breakpoints. Re-binding is best-effort: failures are logged and the
    /// request stays parked; nothing here is fatal.
    pub fn add_module<S: Simulator, H: HostEvents>(
        &mut self,
        module: Module,
        sim: &mut S,
        manager: &mut BreakpointManager,
        host: &mut H,
        events: &mut EventCounter,
    ) {
        host.notify(
            events.next(),
            DebugEvent::ModuleLoaded {
                name: module.backing_path.clone(),
                base: module.base,
                size: module.size,
            },
            Delivery::Asynchronous,
        );
        self.modules.push(module);

        let parked = std::mem::take(&mut self.unbound);
        for request in parked {
            let address = match &request.location {
                SourceRef::Line { file, line } => self.address_for_line(file, *line),
                SourceRef::Symbol { name } => self.address_for_symbol(name),
            };
            match address {
                Ok(address) => {
                    if let Err(err) =
                        manager.add(sim, request.owner, BreakpointKind::Code, false, address)
                    {
                        warn!(
                            owner = request.owner.0,
                            "re-binding breakpoint failed: {err}"
                        );
                    } else {
                        debug!(owner = request.owner.0, address, "re-bound breakpoint");
                    }
                }
                Err(_) => self.unbound.push(request),
            }
        }
    }

    /// Park a source-level breakpoint for later binding.
    pub fn park_unbound(&mut self, owner: BreakpointOwner, location: SourceRef) {
        self.unbound.push(UnboundBreakpoint { owner, location });
    }

    /// Forget a parked request (the host removed the breakpoint before a
    /// module could bind it).
    pub fn unpark(&mut self, owner: BreakpointOwner) -> bool {
        let before = self.unbound.len();
        self.unbound.retain(|u| u.owner != owner);
        self.unbound.len() != before
    }

    /// Whether a parked request exists for `owner`.
    pub fn is_parked(&self, owner: BreakpointOwner) -> bool {
        self.unbound.iter().any(|u| u.owner == owner)
    }

    /// First module (in load order) whose range contains `address`.
    pub fn module_at(&self, address: u16) -> Result<&Module> {
        self.modules
            .iter()
            .find(|m| m.contains(address))
            .ok_or(Error::ModuleNotFound { address })
    }

    /// All loaded modules, in load order.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Drop every module (and its symbol table) at session teardown.
    pub fn clear(&mut self) {
        self.modules.clear();
        self.unbound.clear();
    }

    /// The symbol table for the module at `index`, resolving it on first
    /// use. A module without a symbol path, or whose symbol file failed to
    /// parse, stays failed; the parse is never retried.
    fn symbol_table(&mut self, index: usize) -> Result<&SymbolTable> {
        let module = &mut self.modules[index];
        if let SymbolCache::Unresolved = module.symbols {
            module.symbols = match &module.symbol_path {
                Some(path) => match self.loader.load(path) {
                    Ok(table) => SymbolCache::Resolved(table),
                    Err(err) => {
                        warn!(module = %module.backing_path, "symbol parse failed: {err}");
                        SymbolCache::Failed
                    }
                },
                None => SymbolCache::Failed,
            };
        }
        match &self.modules[index].symbols {
            SymbolCache::Resolved(table) => Ok(table),
            _ => Err(Error::SymbolTableUnavailable {
                module: self.modules[index].backing_path.clone(),
            }),
        }
    }

    /// Resolve `address` to `(file, line)` through the covering module.
    pub fn line_for_address(&mut self, address: u16) -> Result<(String, u32)> {
        let index = self
            .modules
            .iter()
            .position(|m| m.contains(address))
            .ok_or(Error::ModuleNotFound { address })?;
        let table = self.symbol_table(index)?;
        table
            .line_for_address(address)
            .map(|(file, line)| (file.to_string(), line))
            .ok_or(Error::AddressUnmapped { address })
    }

    /// Resolve a source line to an address, searching modules in load
    /// order.
    pub fn address_for_line(&mut self, file: &str, line: u32) -> Result<u16> {
        for index in 0..self.modules.len() {
            if let Ok(table) = self.symbol_table(index) {
                if let Some(address) = table.address_for_line(file, line) {
                    return Ok(address);
                }
            }
        }
        Err(Error::LineNotFound {
            file: file.to_string(),
            line,
        })
    }

    /// Resolve a symbol name to an address, searching modules in load
    /// order.
    pub fn address_for_symbol(&mut self, name: &str) -> Result<u16> {
        for index in 0..self.modules.len() {
            if let Ok(table) = self.symbol_table(index) {
                if let Some(address) = table.address_for_symbol(name) {
                    return Ok(address);
                }
            }
        }
        Err(Error::SymbolNotFound {
            name: name.to_string(),
        })
    }

    /// Resolve the symbol at `address` through the covering module.
    pub fn symbol_at(
        &mut self,
        address: u16,
        kind: LabelKind,
        exact_only: bool,
    ) -> Result<(String, u16)> {
        let index = self
            .modules
            .iter()
            .position(|m| m.contains(address))
            .ok_or(Error::ModuleNotFound { address })?;
        let table = self.symbol_table(index)?;
        table
            .symbol_at(address, kind, exact_only)
            .map(|(name, offset)| (name.to_string(), offset))
            .ok_or(Error::AddressUnmapped { address })
    }
}
