//! Session state machine
//!
//! One session owns one simulated program with one simulated thread. It
//! drives launch → resume → (warm-up) → entry → run → exit → terminate
//! through up to three internal breakpoints (warm-up, entry, exit). The
//! internal breakpoints are armed directly against the simulator and never
//! enter the [`BreakpointManager`]; the two sets share nothing but the
//! cookie namespace, and each side inspects only its own cookies when a
//! stop arrives.

use crate::breakpoints::{BreakpointInfo, BreakpointManager};
use crate::error::{Error, Result};
use crate::host::{DebugEvent, Delivery, EventCounter, EventId, HostEvents, PortObserver};
use crate::modules::{BindResult, Module, ModuleRegistry, SourceRef, SymbolLoader};
use crate::options::{LaunchOptions, TargetKind};
use crate::simulator::{Cookie, ResetFlags, SimStop, Simulator};
use crate::stepping::{step_over_target, StepKind, TransientBreakpoint};
use crate::types::{BreakpointKind, BreakpointOwner, ThreadId};
use tracing::{debug, error, warn};

const ROM_BASE: u16 = 0x0000;
const ROM_SIZE: u32 = 0x4000;

// Firmware emulation constants. These encode the 48K ROM's memory layout
// and must change together: the warm-up breakpoint sits in the
// interpreter's main execution loop, reached once the machine is warm and
// idle; the RET at 0x0052 is where the program counter is parked so the
// interpreter picks up the synthesized edit line on the next pass.
const WARM_UP_BREAK_ADDR: u16 = 0x12A9;
const ROM_RET_ADDR: u16 = 0x0052;

// System variables delimiting the edit-line buffer. E_LINE holds the
// buffer's address; K_CUR the cursor position within it; WORKSP, STKBOT
// and STKEND mark the end of the line and the (empty) calculator stack
// right after it. All four trailing sysvars must be patched consistently
// with the synthesized line or the interpreter rejects it.
const E_LINE: u16 = 0x5C59;
const K_CUR: u16 = 0x5C5B;
const WORKSP: u16 = 0x5C61;
const STKBOT: u16 = 0x5C63;
const STKEND: u16 = 0x5C65;

// Token bytes of the synthesized `RANDOMIZE USR <entry>` command.
const TOKEN_RANDOMIZE: u8 = 0xF9;
const TOKEN_USR: u8 = 0xC0;
const LINE_TERMINATOR: u8 = 0x0D;
const LINE_END_MARKER: u8 = 0x80;

/// Label the target is expected to carry at its exit point.
const EXIT_SYMBOL: &str = "__exit";

const SESSION_THREAD: ThreadId = ThreadId(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    /// Warm-up breakpoint armed, firmware booting
    WarmingUp,
    /// Entry breakpoint armed, target loaded but not yet entered
    AtEntry,
    /// Target code executing (or stopped at a host breakpoint)
    Executing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Launched,
    Running(RunPhase),
    /// Destroy event sent, waiting for the host's phase-2 continue
    Terminating,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Launched => "launched",
            State::Running(_) => "running",
            State::Terminating => "terminating",
        }
    }
}

/// The session's internal breakpoints. Each is 0-or-1 valued and they are
/// mutually exclusive in time: warm-up is removed before entry is armed,
/// entry before exit.
#[derive(Debug, Default)]
struct InternalBreakpoints {
    warm_up: Option<Cookie>,
    entry: Option<Cookie>,
    exit: Option<Cookie>,
}

impl InternalBreakpoints {
    /// Disarm whatever is still armed. Idempotent; simulator failures are
    /// logged and ignored, this runs during teardown.
    fn disarm_all<S: Simulator>(&mut self, sim: &mut S) {
        for slot in [&mut self.warm_up, &mut self.entry, &mut self.exit] {
            if let Some(cookie) = slot.take() {
                if let Err(err) = sim.remove_breakpoint(cookie) {
                    warn!("failed to disarm internal breakpoint: {err}");
                }
            }
        }
    }
}

/// Debug session: the host-facing entry point.
///
/// All calls arrive on one logical control thread. The blocking
/// [`Simulator::resume`] calls inside [`Session::resume`], [`Session::run`]
/// and [`Session::step`] are the only suspension points.
pub struct Session<S: Simulator, H: HostEvents> {
    sim: S,
    host: H,
    events: EventCounter,
    state: State,
    options: Option<LaunchOptions>,
    manager: Option<BreakpointManager>,
    registry: ModuleRegistry,
    internal: InternalBreakpoints,
    port: Option<Box<dyn PortObserver>>,
    subscribed: bool,
    pending_destroy: Option<EventId>,
}

impl<S: Simulator, H: HostEvents> Session<S, H> {
    pub fn new(sim: S, host: H, loader: Box<dyn SymbolLoader>) -> Self {
        Self {
            sim,
            host,
            events: EventCounter::default(),
            state: State::Idle,
            options: None,
            manager: None,
            registry: ModuleRegistry::new(loader),
            internal: InternalBreakpoints::default(),
            port: None,
            subscribed: false,
            pending_destroy: None,
        }
    }

    /// Attach the owning port, notified of program destruction during
    /// phase-2 teardown.
    pub fn attach_port(&mut self, port: Box<dyn PortObserver>) {
        self.port = Some(port);
    }

    fn invalid_state(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state.name(),
        }
    }

    /// Parse launch options, stop and reset the machine, and announce the
    /// engine. Does not start execution; the host follows up with
    /// [`Session::resume`].
    pub fn launch(&mut self, option_blob: &str) -> Result<()> {
        if self.state != State::Idle {
            return Err(self.invalid_state("launch"));
        }
        let options = LaunchOptions::parse(option_blob)?;

        self.sim.break_now()?;
        self.sim.reset(ResetFlags::CPU | ResetFlags::MEMORY)?;

        self.options = Some(options);
        self.state = State::Launched;
        self.host
            .notify(self.events.next(), DebugEvent::EngineCreated, Delivery::Asynchronous);
        Ok(())
    }

    /// Bring the target up to its entry point.
    ///
    /// Loads the ROM, then dispatches on the program kind: a raw binary
    /// goes through the firmware warm-up dance, a snapshot loads directly.
    /// Returns with the simulator stopped at the entry point and
    /// `LoadComplete` / `EntryPointReached` delivered, in that order.
    pub fn resume(&mut self) -> Result<()> {
        if self.state != State::Launched {
            return Err(self.invalid_state("resume"));
        }
        let options = match &self.options {
            Some(options) => options.clone(),
            None => return Err(self.invalid_state("resume")),
        };
        let kind = options.target_kind()?;

        self.manager = Some(BreakpointManager::new());
        self.sim.subscribe()?;
        self.subscribed = true;

        self.sim.load_binary(&options.rom_path, ROM_BASE)?;
        self.add_module(Module::new(ROM_BASE, ROM_SIZE, options.rom_path.clone(), None, false));

        match kind {
            TargetKind::RawBinary => {
                self.internal.warm_up =
                    Some(self.sim.add_breakpoint(BreakpointKind::Code, false, WARM_UP_BREAK_ADDR)?);
                self.sim.reset(ResetFlags::CPU)?;
                self.state = State::Running(RunPhase::WarmingUp);
                self.run_until_host_stop(true)
            }
            TargetKind::Snapshot => {
                self.sim
                    .load_snapshot(&options.program)
                    .map_err(|err| Error::SnapshotLoadFailed {
                        path: options.program.clone(),
                        detail: err.0,
                    })?;
                let size = 0x10000 - options.base as u32;
                self.add_module(Module::new(
                    options.base,
                    size,
                    options.program.clone(),
                    options.symbol_path.clone(),
                    true,
                ));
                self.reach_entry_point()
            }
        }
    }

    /// Continue execution after a synchronous stop, blocking until the
    /// next stop is delivered to the host (or the simulator pauses on its
    /// own).
    pub fn run(&mut self) -> Result<()> {
        if !matches!(self.state, State::Running(_)) {
            return Err(self.invalid_state("run"));
        }
        self.run_until_host_stop(false)
    }

    /// Execute one step.
    ///
    /// `Into` is a single simulated instruction and emits no event. `Over`
    /// runs call-like instructions to completion behind a transient
    /// breakpoint and emits `StepComplete` when that breakpoint fires; any
    /// other stop arriving first is routed normally, and the transient
    /// breakpoint is removed on every path out of here.
    pub fn step(&mut self, kind: StepKind) -> Result<()> {
        if !matches!(self.state, State::Running(_)) {
            return Err(self.invalid_state("step"));
        }

        let target = match kind {
            StepKind::Into => None,
            StepKind::Over => {
                let pc = self.sim.pc()?;
                step_over_target(&self.sim, pc)?
            }
        };
        let target = match target {
            Some(target) => target,
            None => return self.sim.step_instruction().map_err(Into::into),
        };

        let mut transient = TransientBreakpoint::arm(&mut self.sim, target)?;
        // The current location's breakpoint, if any, was already reported
        // to the caller; do not re-fire it.
        let stop = match self.sim.resume(false) {
            Ok(stop) => stop,
            Err(err) => {
                transient.disarm(&mut self.sim);
                return Err(err.into());
            }
        };
        match stop {
            SimStop::BreakpointsHit(cookies) if transient.matches(&cookies) => {
                transient.disarm(&mut self.sim);
                self.host.notify(
                    self.events.next(),
                    DebugEvent::StepComplete { thread: SESSION_THREAD },
                    Delivery::SynchronousStop,
                );
                Ok(())
            }
            other => {
                // Another breakpoint beat the transient one; drop ours
                // before routing the stop it produced.
                transient.disarm(&mut self.sim);
                self.handle_stop(other)?;
                Ok(())
            }
        }
    }

    /// Tear the program down, phase 1.
    ///
    /// Disarms whatever internal breakpoints are still live, drops the
    /// session's event subscription, and sends `ProgramDestroyed`. Resource
    /// release waits for [`Session::continue_from_synchronous_event`].
    pub fn terminate(&mut self) -> Result<()> {
        match self.state {
            State::Idle => return Err(self.invalid_state("terminate")),
            State::Terminating => return Ok(()),
            State::Launched | State::Running(_) => {}
        }

        self.internal.disarm_all(&mut self.sim);
        if self.subscribed {
            self.sim.unsubscribe();
            self.subscribed = false;
        }

        let id = self.events.next();
        self.pending_destroy = Some(id);
        self.state = State::Terminating;
        self.host
            .notify(id, DebugEvent::ProgramDestroyed, Delivery::SynchronousNonStop);
        Ok(())
    }

    /// Phase 2 of teardown: the host has finished processing the event
    /// identified by `id`.
    ///
    /// Only the `ProgramDestroyed` event carries teardown obligations;
    /// continues for other synchronous events arrive here too and are
    /// no-ops (the target is resumed through [`Session::run`], not this
    /// call). On the destroy continue, session resources are released, the
    /// port is notified, and the simulator is resumed unconditionally if
    /// it is not already free-running, so the machine is not left paused.
    pub fn continue_from_synchronous_event(&mut self, id: EventId) -> Result<()> {
        if self.pending_destroy != Some(id) {
            debug!(event = id.0, "continue for a non-destroy event, nothing to release");
            return Ok(());
        }
        self.pending_destroy = None;

        if let Some(manager) = self.manager.as_mut() {
            if !manager.is_empty() {
                // Host breakpoints must be removed before teardown; a
                // non-empty manager here is a host protocol violation.
                error!(
                    remaining = manager.len(),
                    "terminating with host breakpoints still armed"
                );
                debug_assert!(manager.is_empty(), "teardown with armed breakpoints");
                manager.clear(&mut self.sim);
            }
        }
        self.manager = None;
        self.options = None;
        self.registry.clear();

        if let Some(port) = self.port.as_mut() {
            port.program_destroyed();
        }

        self.state = State::Idle;
        if !self.sim.is_running() {
            self.sim.resume(false)?;
        }
        Ok(())
    }

    // ---- host-facing breakpoint binding ----------------------------------

    /// Arm a breakpoint at an absolute address.
    pub fn add_breakpoint(
        &mut self,
        owner: BreakpointOwner,
        kind: BreakpointKind,
        physical: bool,
        address: u16,
    ) -> Result<Cookie> {
        self.check_new_owner(owner)?;
        let manager = match self.manager.as_mut() {
            Some(manager) => manager,
            None => {
                return Err(Error::InvalidState {
                    operation: "add_breakpoint",
                    state: self.state.name(),
                })
            }
        };
        manager.add(&mut self.sim, owner, kind, physical, address)
    }

    /// Arm a breakpoint at a source line, parking it for later binding if
    /// no loaded module resolves the line yet.
    pub fn add_breakpoint_at_line(
        &mut self,
        owner: BreakpointOwner,
        file: &str,
        line: u32,
    ) -> Result<BindResult> {
        self.check_new_owner(owner)?;
        match self.registry.address_for_line(file, line) {
            Ok(address) => {
                self.add_breakpoint(owner, BreakpointKind::Code, false, address)?;
                Ok(BindResult::Bound)
            }
            Err(Error::LineNotFound { .. }) | Err(Error::SymbolTableUnavailable { .. }) => {
                self.registry
                    .park_unbound(owner, SourceRef::Line { file: file.to_string(), line });
                Ok(BindResult::Pending)
            }
            Err(err) => Err(err),
        }
    }

    /// Arm a breakpoint at a symbol, parking it for later binding if no
    /// loaded module defines the symbol yet.
    pub fn add_breakpoint_at_symbol(
        &mut self,
        owner: BreakpointOwner,
        name: &str,
    ) -> Result<BindResult> {
        self.check_new_owner(owner)?;
        match self.registry.address_for_symbol(name) {
            Ok(address) => {
                self.add_breakpoint(owner, BreakpointKind::Code, false, address)?;
                Ok(BindResult::Bound)
            }
            Err(Error::SymbolNotFound { .. }) | Err(Error::SymbolTableUnavailable { .. }) => {
                self.registry
                    .park_unbound(owner, SourceRef::Symbol { name: name.to_string() });
                Ok(BindResult::Pending)
            }
            Err(err) => Err(err),
        }
    }

    /// Disarm a breakpoint, whether armed or still parked.
    pub fn remove_breakpoint(&mut self, owner: BreakpointOwner) -> Result<()> {
        if let Some(manager) = self.manager.as_mut() {
            if manager.contains(owner) {
                return manager.remove(&mut self.sim, owner);
            }
        }
        if self.registry.unpark(owner) {
            return Ok(());
        }
        Err(Error::BreakpointNotFound(owner))
    }

    /// Whether `owner` has an armed or parked breakpoint.
    pub fn contains_breakpoint(&self, owner: BreakpointOwner) -> bool {
        self.manager.as_ref().is_some_and(|m| m.contains(owner))
            || self.registry.is_parked(owner)
    }

    /// Armed breakpoints, for host listings. Parked requests are not
    /// included.
    pub fn breakpoints(&self) -> Vec<BreakpointInfo> {
        self.manager.as_ref().map(|m| m.list()).unwrap_or_default()
    }

    /// Resolve `address` to a source location through the loaded modules.
    pub fn line_for_address(&mut self, address: u16) -> Result<(String, u32)> {
        self.registry.line_for_address(address)
    }

    /// Resolve the symbol covering `address` through the loaded modules.
    pub fn symbol_at(
        &mut self,
        address: u16,
        kind: symtab::LabelKind,
        exact_only: bool,
    ) -> Result<(String, u16)> {
        self.registry.symbol_at(address, kind, exact_only)
    }

    // ---- internals --------------------------------------------------------

    fn check_new_owner(&self, owner: BreakpointOwner) -> Result<()> {
        if self.contains_breakpoint(owner) {
            return Err(Error::DuplicateOwner(owner));
        }
        Ok(())
    }

    fn add_module(&mut self, module: Module) {
        // The manager exists for the whole window in which modules load.
        if let Some(manager) = self.manager.as_mut() {
            self.registry
                .add_module(module, &mut self.sim, manager, &mut self.host, &mut self.events);
        }
    }

    /// Resume repeatedly until a stop is delivered to the host (or the
    /// simulator pauses on its own). Internal breakpoint hits that only
    /// advance the launch sequence do not return control.
    fn run_until_host_stop(&mut self, check_breakpoints_at_pc: bool) -> Result<()> {
        let mut check = check_breakpoints_at_pc;
        loop {
            let stop = self.sim.resume(check)?;
            check = false;
            if self.handle_stop(stop)? {
                return Ok(());
            }
            if matches!(self.state, State::Terminating | State::Idle) {
                return Ok(());
            }
        }
    }

    /// Route one simulator stop. Returns `true` when control should go
    /// back to the host.
    fn handle_stop(&mut self, stop: SimStop) -> Result<bool> {
        let cookies = match stop {
            SimStop::Paused => return Ok(true),
            SimStop::BreakpointsHit(cookies) => cookies,
        };

        if self.internal.warm_up.is_some_and(|c| cookies.contains(&c)) {
            self.finish_warm_up()?;
            return Ok(false);
        }

        if let Some(cookie) = self.internal.entry {
            if cookies.contains(&cookie) {
                self.internal.entry = None;
                if let Err(err) = self.sim.remove_breakpoint(cookie) {
                    warn!("failed to disarm entry breakpoint: {err}");
                }
                self.reach_entry_point()?;
                return Ok(true);
            }
        }

        if let Some(cookie) = self.internal.exit {
            if cookies.contains(&cookie) {
                self.internal.exit = None;
                if let Err(err) = self.sim.remove_breakpoint(cookie) {
                    warn!("failed to disarm exit breakpoint: {err}");
                }
                // Same path as an external terminate; the machine actually
                // resumes in the teardown's phase 2.
                self.terminate()?;
                return Ok(true);
            }
        }

        if let Some(manager) = self.manager.as_ref() {
            if manager.handle_breakpoint_hit(
                &mut self.host,
                &mut self.events,
                SESSION_THREAD,
                &cookies,
            ) {
                return Ok(true);
            }
        }

        debug!(?cookies, "stop carried no cookie owned by this session");
        Ok(false)
    }

    /// Warm-up breakpoint fired: the firmware is warm and idle. Load the
    /// target image, synthesize the run command, park the program counter
    /// on a known RET, and arm the entry breakpoint.
    fn finish_warm_up(&mut self) -> Result<()> {
        if let Some(cookie) = self.internal.warm_up.take() {
            if let Err(err) = self.sim.remove_breakpoint(cookie) {
                warn!("failed to disarm warm-up breakpoint: {err}");
            }
        }

        let options = match &self.options {
            Some(options) => options.clone(),
            None => return Err(self.invalid_state("resume")),
        };

        let size = self.sim.load_binary(&options.program, options.base)?;
        self.add_module(Module::new(
            options.base,
            size,
            options.program.clone(),
            options.symbol_path.clone(),
            true,
        ));

        self.inject_run_command(options.entry)?;
        self.sim.set_pc(ROM_RET_ADDR)?;

        self.internal.entry =
            Some(self.sim.add_breakpoint(BreakpointKind::Code, false, options.entry)?);
        self.state = State::Running(RunPhase::AtEntry);
        Ok(())
    }

    /// Write `RANDOMIZE USR <entry>` into the edit-line buffer and patch
    /// the system variables that delimit it, byte-for-byte what the line
    /// editor would have left after the user typed the command.
    fn inject_run_command(&mut self, entry: u16) -> Result<()> {
        let mut command = vec![TOKEN_RANDOMIZE, TOKEN_USR];
        command.extend(entry.to_string().into_bytes());
        command.push(LINE_TERMINATOR);
        command.push(LINE_END_MARKER);

        let mut e_line_bytes = [0u8; 2];
        self.sim.read_memory(E_LINE, &mut e_line_bytes)?;
        let e_line = u16::from_le_bytes(e_line_bytes);

        self.sim.write_memory(e_line, &command)?;

        // K_CUR sits on the terminator; WORKSP, STKBOT and STKEND all
        // point just past the end marker (line present, stack empty).
        let cursor = e_line.wrapping_add(command.len() as u16 - 2);
        let after = e_line.wrapping_add(command.len() as u16);
        self.sim.write_memory(K_CUR, &cursor.to_le_bytes())?;
        self.sim.write_memory(WORKSP, &after.to_le_bytes())?;
        self.sim.write_memory(STKBOT, &after.to_le_bytes())?;
        self.sim.write_memory(STKEND, &after.to_le_bytes())?;
        Ok(())
    }

    /// Deliver `LoadComplete` then `EntryPointReached` (order is part of
    /// the host contract) and arm the exit breakpoint. The simulator is
    /// left stopped; the host decides whether to continue.
    fn reach_entry_point(&mut self) -> Result<()> {
        self.host
            .notify(self.events.next(), DebugEvent::LoadComplete, Delivery::SynchronousStop);
        self.host.notify(
            self.events.next(),
            DebugEvent::EntryPointReached,
            Delivery::SynchronousStop,
        );

        match self.registry.address_for_symbol(EXIT_SYMBOL) {
            Ok(address) => {
                self.internal.exit =
                    Some(self.sim.add_breakpoint(BreakpointKind::Code, false, address)?);
            }
            Err(err) => {
                warn!("exit symbol unresolved, program end will not be detected: {err}");
            }
        }

        self.state = State::Running(RunPhase::Executing);
        Ok(())
    }
}
