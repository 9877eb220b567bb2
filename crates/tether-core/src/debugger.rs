//! The debug session engine.
//!
//! [`Debugger`] owns the target process, the event source and the session
//! state, and splits its work across two threads:
//!
//! - the **loop thread** runs [`Debugger::run`], which attaches, pumps
//!   debug events through the handler registries and resumes the target
//!   with the disposition the handlers chose;
//! - the **command thread** (usually a REPL or a test) calls the public
//!   operations: breakpoint management, stepping, context and memory
//!   access, symbol queries.
//!
//! When a breakpoint or step completes, the dispatching handler parks on an
//! internal gate and the target stays suspended until the command thread
//! calls [`Debugger::resume`], [`Debugger::step_into`],
//! [`Debugger::step_over`] or [`Debugger::stop`].

use std::sync::Mutex;

use tracing::{debug, error, info, trace, warn};

use crate::breakpoints::{Breakpoint, BreakpointInfo, BreakpointTable};
use crate::decoder::{DecodedInstruction, InstructionDecoder, ListedInstruction, MAX_INSTRUCTION_LEN};
use crate::dispatch::{HandlerRegistry, HandlerToken};
use crate::error::{DebuggerError, Result};
use crate::events::{
    session_channel, DebugEvent, DebugEventKind, DebugEventPayload, ExceptionCode, SessionEvent,
    SessionEventReceiver, SessionEventSender,
};
use crate::stack::{walk_stack, StackFrame, MAX_FRAMES};
use crate::symbols::{ModuleInfo, ModuleRecord, Symbol, SymbolBackend, SymbolStore};
use crate::sync::ContinueGate;
use crate::target::{read_target_string, DebugEventSource, PageProtection, ProcessMemory, TargetProcess};
use crate::types::{Address, ContinueStatus, CpuContext, ThreadId};

/// Default number of bytes shown by memory dumps.
pub const DEFAULT_DUMP_LEN: usize = 40;

/// Default number of instructions shown by a disassembly listing.
pub const DEFAULT_LISTING_LEN: usize = 15;

/// Exception codes that are reported to the target rather than swallowed.
const FAULT_CODES: [ExceptionCode; 20] = [
    ExceptionCode::AccessViolation,
    ExceptionCode::ArrayBoundsExceeded,
    ExceptionCode::DatatypeMisalignment,
    ExceptionCode::FltDenormalOperand,
    ExceptionCode::FltDivideByZero,
    ExceptionCode::FltInexactResult,
    ExceptionCode::FltInvalidOperation,
    ExceptionCode::FltOverflow,
    ExceptionCode::FltStackCheck,
    ExceptionCode::FltUnderflow,
    ExceptionCode::GuardPage,
    ExceptionCode::IllegalInstruction,
    ExceptionCode::InPageError,
    ExceptionCode::InvalidHandle,
    ExceptionCode::IntDivideByZero,
    ExceptionCode::IntOverflow,
    ExceptionCode::InvalidDisposition,
    ExceptionCode::NoncontinuableException,
    ExceptionCode::PrivilegedInstruction,
    ExceptionCode::StackOverflow,
];

/// Callback invoked while a debug event is dispatched.
///
/// Handlers run on the loop thread and may call back into the [`Debugger`]
/// they receive, but they must not register or remove handlers from inside
/// the callback.
pub type EventHandler = Box<dyn FnMut(&Debugger, &DebugEvent) + Send>;

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionOptions
{
    /// Terminate the target when the session detaches.
    pub kill_on_detach: bool,
    /// Poll interval for the event wait, in milliseconds. The loop rechecks
    /// the session's active flag between polls so [`Debugger::stop`] can end
    /// an idle session.
    pub event_poll_ms: u32,
}

impl Default for SessionOptions
{
    fn default() -> Self
    {
        Self {
            kill_on_detach: false,
            event_poll_ms: 100,
        }
    }
}

/// Mutable state shared by the loop and command threads.
struct SessionState
{
    active: bool,
    stepping: bool,
    disposition: ContinueStatus,
    executing_thread: Option<ThreadId>,
    last_context: Option<CpuContext>,
    last_hit: Option<Address>,
    step_point: Breakpoint,
    breakpoints: BreakpointTable,
}

impl SessionState
{
    fn new() -> Self
    {
        Self {
            active: false,
            stepping: false,
            disposition: ContinueStatus::Handled,
            executing_thread: None,
            last_context: None,
            last_hit: None,
            step_point: Breakpoint::new_interrupt(Address::ZERO),
            breakpoints: BreakpointTable::new(),
        }
    }
}

struct Registries
{
    events: HandlerRegistry<DebugEventKind, EventHandler>,
    exceptions: HandlerRegistry<ExceptionCode, EventHandler>,
}

/// A debug session over one target process.
pub struct Debugger
{
    process: Box<dyn TargetProcess>,
    source: Mutex<Box<dyn DebugEventSource>>,
    decoder: Box<dyn InstructionDecoder>,
    symbol_backend: Option<Box<dyn SymbolBackend>>,
    options: SessionOptions,
    session: Mutex<SessionState>,
    symbols: Mutex<SymbolStore>,
    registries: Mutex<Registries>,
    gate: ContinueGate,
    events_tx: Mutex<Option<SessionEventSender>>,
}

impl Debugger
{
    /// Builds a session over `process`, pulling events from `source`.
    ///
    /// The default handlers for process, thread, module and exception
    /// events are installed here; callers may register more alongside them.
    #[must_use]
    pub fn new(
        process: Box<dyn TargetProcess>,
        source: Box<dyn DebugEventSource>,
        decoder: Box<dyn InstructionDecoder>,
        symbol_backend: Option<Box<dyn SymbolBackend>>,
        options: SessionOptions,
    ) -> Self
    {
        let debugger = Self {
            process,
            source: Mutex::new(source),
            decoder,
            symbol_backend,
            options,
            session: Mutex::new(SessionState::new()),
            symbols: Mutex::new(SymbolStore::new()),
            registries: Mutex::new(Registries {
                events: HandlerRegistry::new(),
                exceptions: HandlerRegistry::new(),
            }),
            gate: ContinueGate::new(),
            events_tx: Mutex::new(None),
        };
        debugger.install_default_handlers();
        debugger
    }

    // ------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------

    /// Attaches to the target and pumps debug events until the session ends.
    ///
    /// Blocks for the lifetime of the session, so callers run it on its own
    /// thread. Attach, wait, resume and detach all happen on that thread.
    /// Returns when [`Debugger::stop`] is called, when the target exits, or
    /// when the event source fails.
    pub fn run(&self) -> Result<()>
    {
        let process = self.process.process_id();
        {
            let mut source = self.source.lock().unwrap();
            source.attach(process, self.options.kill_on_detach)?;
        }
        self.session.lock().unwrap().active = true;
        info!(%process, kill_on_detach = self.options.kill_on_detach, "Debug session started");

        let result = self.event_loop();

        {
            let mut source = self.source.lock().unwrap();
            if let Err(error) = source.detach() {
                warn!(%process, %error, "Could not detach from the target");
            }
        }
        self.session.lock().unwrap().active = false;
        // Closing the channel tells subscribers the session is over.
        self.events_tx.lock().unwrap().take();
        match &result {
            Ok(()) => info!(%process, "Debug session ended"),
            Err(error) => error!(%process, %error, "Debug session failed"),
        }
        result
    }

    fn event_loop(&self) -> Result<()>
    {
        loop {
            if !self.is_active() {
                return Ok(());
            }
            let event = {
                let mut source = self.source.lock().unwrap();
                source.wait_event(self.options.event_poll_ms)?
            };
            let Some(event) = event else { continue };
            trace!(kind = %event.kind(), process = %event.process, thread = %event.thread, "Debug event");
            self.dispatch(&event);
            let status = self.continue_status();
            let mut source = self.source.lock().unwrap();
            source.continue_event(event.process, event.thread, status)?;
        }
    }

    fn dispatch(&self, event: &DebugEvent)
    {
        let mut registries = self.registries.lock().unwrap();
        registries
            .events
            .notify_with(event.kind(), |handler| handler(self, event));
        if let DebugEventPayload::Exception { record, .. } = &event.payload {
            registries
                .exceptions
                .notify_with(record.code, |handler| handler(self, event));
        }
    }

    fn install_default_handlers(&self)
    {
        let mut registries = self.registries.lock().unwrap();
        registries.events.register(
            DebugEventKind::CreateProcess,
            Box::new(|debugger, event| debugger.on_create_process(event)),
        );
        registries.events.register(
            DebugEventKind::CreateThread,
            Box::new(|debugger, event| debugger.on_create_thread(event)),
        );
        registries.events.register(
            DebugEventKind::ExitProcess,
            Box::new(|debugger, event| debugger.on_exit_process(event)),
        );
        registries.events.register(
            DebugEventKind::ExitThread,
            Box::new(|debugger, event| debugger.on_exit_thread(event)),
        );
        registries.events.register(
            DebugEventKind::LoadModule,
            Box::new(|debugger, event| debugger.on_load_module(event)),
        );
        registries.events.register(
            DebugEventKind::UnloadModule,
            Box::new(|debugger, event| debugger.on_unload_module(event)),
        );
        registries.events.register(
            DebugEventKind::OutputString,
            Box::new(|debugger, event| debugger.on_output_string(event)),
        );
        registries.events.register(
            DebugEventKind::Rip,
            Box::new(|debugger, event| debugger.on_rip(event)),
        );
        registries.exceptions.register(
            ExceptionCode::Breakpoint,
            Box::new(|debugger, event| debugger.on_breakpoint(event)),
        );
        registries.exceptions.register(
            ExceptionCode::SingleStep,
            Box::new(|debugger, event| debugger.on_single_step(event)),
        );
        for code in FAULT_CODES {
            registries.exceptions.register(
                code,
                Box::new(|debugger, event| debugger.on_target_fault(event)),
            );
        }
    }

    // ------------------------------------------------------------------
    // Default event handlers
    // ------------------------------------------------------------------

    fn on_create_process(&self, event: &DebugEvent)
    {
        let DebugEventPayload::CreateProcess { image_base, start_address, image_path } =
            &event.payload
        else {
            return;
        };
        info!(
            process = %event.process,
            base = %image_base,
            start = %start_address,
            path = image_path.as_deref().unwrap_or("<unknown>"),
            "Target process came under debug control"
        );
        self.set_continue_status(ContinueStatus::Handled);
        self.publish(SessionEvent::ProcessCreated {
            process: event.process,
            image: image_path.clone(),
        });
        self.record_module(*image_base, image_path.as_deref());
    }

    fn on_create_thread(&self, event: &DebugEvent)
    {
        let DebugEventPayload::CreateThread { start_address } = &event.payload else { return };
        debug!(thread = %event.thread, start = %start_address, "Thread created");
        self.set_continue_status(ContinueStatus::Handled);
        self.publish(SessionEvent::ThreadCreated {
            thread: event.thread,
            start_address: *start_address,
        });
    }

    fn on_exit_process(&self, event: &DebugEvent)
    {
        let DebugEventPayload::ExitProcess { exit_code } = &event.payload else { return };
        info!(process = %event.process, exit_code, "Target process exited");
        {
            let mut session = self.session.lock().unwrap();
            session.disposition = ContinueStatus::Handled;
            // The loop delivers the final resume and then winds down.
            session.active = false;
        }
        self.publish(SessionEvent::ProcessExited { exit_code: *exit_code });
    }

    fn on_exit_thread(&self, event: &DebugEvent)
    {
        let DebugEventPayload::ExitThread { exit_code } = &event.payload else { return };
        debug!(thread = %event.thread, exit_code, "Thread exited");
        self.set_continue_status(ContinueStatus::Handled);
        self.publish(SessionEvent::ThreadExited {
            thread: event.thread,
            exit_code: *exit_code,
        });
    }

    fn on_load_module(&self, event: &DebugEvent)
    {
        let DebugEventPayload::LoadModule { base, image_path } = &event.payload else { return };
        debug!(base = %base, path = image_path.as_deref().unwrap_or("<unknown>"), "Module loaded");
        self.set_continue_status(ContinueStatus::Handled);
        self.record_module(*base, image_path.as_deref());
    }

    fn on_unload_module(&self, event: &DebugEvent)
    {
        let DebugEventPayload::UnloadModule { base } = &event.payload else { return };
        // Symbols stay resident so stale addresses keep resolving.
        debug!(base = %base, "Module unloaded");
        self.set_continue_status(ContinueStatus::Handled);
        self.publish(SessionEvent::ModuleUnloaded { base: *base });
    }

    fn on_output_string(&self, event: &DebugEvent)
    {
        let DebugEventPayload::OutputString { address, length, wide } = &event.payload else {
            return;
        };
        self.set_continue_status(ContinueStatus::Handled);
        match read_target_string(self.memory(), *address, *length, *wide) {
            Ok(text) => {
                debug!(thread = %event.thread, "Debug output: {text}");
                self.publish(SessionEvent::Output { text });
            }
            Err(error) => warn!(address = %address, %error, "Could not read debug output string"),
        }
    }

    fn on_rip(&self, event: &DebugEvent)
    {
        let DebugEventPayload::Rip { error, kind } = &event.payload else { return };
        warn!(error, kind, "RIP event from the target");
        self.set_continue_status(ContinueStatus::Handled);
        self.publish(SessionEvent::Rip { error: *error, kind: *kind });
    }

    /// Breakpoint exception: restore the patched byte, rewind the thread to
    /// the trap address, arm a single step to re-install the patch later,
    /// then park until the command thread resumes the session.
    fn on_breakpoint(&self, event: &DebugEvent)
    {
        let DebugEventPayload::Exception { record, .. } = &event.payload else { return };
        let address = record.address;
        let thread = event.thread;
        debug!(%address, %thread, "Breakpoint exception");

        let mut session = self.session.lock().unwrap();
        session.disposition = ContinueStatus::Handled;

        let is_user = session.breakpoints.contains(address);
        let is_step = !is_user && !address.is_null() && session.step_point.address() == address;
        if !is_user && !is_step {
            // Typically the loader's initial breakpoint; let it pass.
            debug!(%address, "No breakpoint at the exception address");
            return;
        }

        let hits = {
            let state = &mut *session;
            let breakpoint = if is_user {
                match state.breakpoints.get_mut(address) {
                    Some(breakpoint) => breakpoint,
                    None => return,
                }
            } else {
                &mut state.step_point
            };
            if let Err(error) = self.patch_disable(breakpoint) {
                warn!(%address, %error, "Could not restore the patched byte");
                return;
            }
            if is_user { breakpoint.record_hit() } else { 0 }
        };

        session.executing_thread = Some(thread);
        let mut context = match self.process.read_context(thread) {
            Ok(context) => context,
            Err(error) => {
                warn!(%thread, %error, "Could not read the executing context");
                return;
            }
        };
        // Re-run the instruction the trap byte displaced, and take one trap
        // step so the patch can go back in behind it.
        context.set_instruction_pointer(address);
        context.set_trap_flag();
        session.last_hit = Some(address);
        session.last_context = Some(context);
        if let Err(error) = self.process.write_context(thread, &context) {
            warn!(%thread, %error, "Could not write the executing context");
            return;
        }

        let notification = if is_user {
            SessionEvent::BreakpointHit { address, thread, hits }
        } else {
            SessionEvent::StepComplete { address, thread }
        };
        drop(session);
        self.publish(notification);
        self.gate.wait();
    }

    /// Single-step exception: report a completed step if one was requested,
    /// then re-arm whichever breakpoint was disabled by the last hit.
    fn on_single_step(&self, event: &DebugEvent)
    {
        let DebugEventPayload::Exception { record, .. } = &event.payload else { return };
        let thread = event.thread;
        trace!(address = %record.address, %thread, "Single-step exception");

        let mut session = self.session.lock().unwrap();
        session.disposition = ContinueStatus::Handled;

        if session.stepping {
            session.executing_thread = Some(thread);
            match self.process.read_context(thread) {
                Ok(context) => {
                    session.last_context = Some(context);
                    if let Err(error) = self.process.write_context(thread, &context) {
                        warn!(%thread, %error, "Could not refresh the executing context");
                    } else {
                        let address = context.instruction_pointer();
                        drop(session);
                        self.publish(SessionEvent::StepComplete { address, thread });
                        self.gate.wait();
                        session = self.session.lock().unwrap();
                    }
                }
                Err(error) => warn!(%thread, %error, "Could not read the executing context"),
            }
        }

        if let Some(address) = session.last_hit {
            let in_table = session.breakpoints.contains(address);
            let is_step = !in_table && session.step_point.address() == address;
            let state = &mut *session;
            if in_table {
                if let Some(breakpoint) = state.breakpoints.get_mut(address) {
                    if !breakpoint.is_enabled() {
                        if let Err(error) = self.patch_enable(breakpoint) {
                            warn!(%address, %error, "Could not re-arm the breakpoint");
                        }
                    }
                }
            } else if is_step {
                if !state.step_point.is_enabled() {
                    if let Err(error) = self.patch_enable(&mut state.step_point) {
                        warn!(%address, %error, "Could not re-arm the step point");
                    }
                }
            } else {
                trace!(%address, "Last-hit breakpoint is gone; nothing to re-arm");
            }
        }
    }

    /// Any other exception is logged and handed back to the target's own
    /// handlers on resume.
    fn on_target_fault(&self, event: &DebugEvent)
    {
        let DebugEventPayload::Exception { first_chance, record } = &event.payload else { return };
        warn!(
            code = %record.code,
            address = %record.address,
            first_chance,
            "Exception in the target"
        );
        self.set_continue_status(ContinueStatus::NotHandled);
        self.publish(SessionEvent::TargetFault {
            code: record.code,
            address: record.address,
            first_chance: *first_chance,
        });
    }

    fn record_module(&self, base: Address, path: Option<&str>)
    {
        let symbols = match &self.symbol_backend {
            Some(backend) => match backend.load_module(path, base) {
                Ok(symbols) => symbols,
                Err(error) => {
                    warn!(%base, ?path, %error, "Could not enumerate module symbols");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let count = symbols.len();
        let name = path.map_or_else(|| String::from("<unknown>"), str::to_owned);
        self.symbols.lock().unwrap().insert_module(ModuleRecord {
            base,
            name: name.clone(),
            symbols,
        });
        debug!(%base, name = %name, symbols = count, "Recorded module");
        self.publish(SessionEvent::ModuleLoaded {
            base,
            name: path.map(str::to_owned),
            symbols: count,
        });
    }

    // ------------------------------------------------------------------
    // Breakpoints
    // ------------------------------------------------------------------

    /// Plants a software breakpoint at `address`.
    ///
    /// The trap byte is written before the table changes; a failed write
    /// leaves the table as it was.
    pub fn add_breakpoint(&self, address: Address) -> Result<()>
    {
        let mut session = self.session.lock().unwrap();
        if session.breakpoints.contains(address) {
            return Err(DebuggerError::DuplicateBreakpoint(address.value()));
        }
        let mut breakpoint = Breakpoint::new_interrupt(address);
        self.patch_enable(&mut breakpoint)?;
        session.breakpoints.insert(breakpoint)?;
        info!(%address, "Breakpoint added");
        Ok(())
    }

    /// Resolves `name` and plants a breakpoint at the symbol's address.
    pub fn add_breakpoint_by_name(&self, name: &str) -> Result<Address>
    {
        let address = self.resolve_symbol_address(name)?;
        self.add_breakpoint(address)?;
        Ok(address)
    }

    /// Removes the breakpoint at `address`, restoring the original byte.
    ///
    /// If the restore fails the breakpoint stays in the table unchanged.
    pub fn remove_breakpoint(&self, address: Address) -> Result<()>
    {
        let mut session = self.session.lock().unwrap();
        let Some(breakpoint) = session.breakpoints.get_mut(address) else {
            return Err(DebuggerError::NoBreakpoint(address.value()));
        };
        self.patch_disable(breakpoint)?;
        session.breakpoints.remove(address);
        info!(%address, "Breakpoint removed");
        Ok(())
    }

    /// Resolves `name` and removes the breakpoint at the symbol's address.
    pub fn remove_breakpoint_by_name(&self, name: &str) -> Result<Address>
    {
        let address = self.resolve_symbol_address(name)?;
        self.remove_breakpoint(address)?;
        Ok(address)
    }

    /// Lists the registered breakpoints in address order.
    #[must_use]
    pub fn breakpoints(&self) -> Vec<BreakpointInfo>
    {
        self.session.lock().unwrap().breakpoints.list()
    }

    // ------------------------------------------------------------------
    // Execution control
    // ------------------------------------------------------------------

    /// Resumes the suspended target without stepping.
    pub fn resume(&self)
    {
        self.session.lock().unwrap().stepping = false;
        self.gate.signal();
    }

    /// Executes exactly one instruction, following any control transfer.
    pub fn step_into(&self) -> Result<()>
    {
        let mut session = self.session.lock().unwrap();
        let thread = session.executing_thread.ok_or(DebuggerError::NoExecutingThread)?;
        let mut context = self.process.read_context(thread)?;
        context.set_trap_flag();
        self.process.write_context(thread, &context)?;
        session.last_context = Some(context);
        session.stepping = true;
        drop(session);
        self.gate.signal();
        Ok(())
    }

    /// Executes one instruction, running calls to completion.
    ///
    /// A transfer the flow never returns from (`ret`, `jmp`) degrades to a
    /// plain single step; anything else plants the internal step point at
    /// the fall-through address and resumes without the trap flag.
    pub fn step_over(&self) -> Result<()>
    {
        let mut session = self.session.lock().unwrap();
        let thread = session.executing_thread.ok_or(DebuggerError::NoExecutingThread)?;
        let mut context = self.process.read_context(thread)?;
        let ip = context.instruction_pointer();
        let instruction = self.decode_with_overlay(&session, ip)?;
        if instruction.unconditional_transfer {
            debug!(%ip, "Unconditional transfer; stepping into it");
            drop(session);
            return self.step_into();
        }
        let fall_through = instruction.fall_through();
        {
            let state = &mut *session;
            self.patch_disable(&mut state.step_point)?;
            state.step_point.relocate(fall_through);
            self.patch_enable(&mut state.step_point)?;
        }
        context.clear_trap_flag();
        self.process.write_context(thread, &context)?;
        session.last_context = Some(context);
        session.stepping = true;
        drop(session);
        self.gate.signal();
        debug!(%ip, %fall_through, "Step point armed");
        Ok(())
    }

    /// Forcibly ends the target process.
    ///
    /// The OS reports the exit through a process-exit event, which winds the
    /// session down the same way a natural exit does.
    pub fn terminate(&self, exit_code: u32) -> Result<()>
    {
        info!(exit_code, "Terminating the target");
        self.process.terminate(exit_code)
    }

    /// Ends the session: releases any parked handler and lets the loop
    /// deliver one final resume before detaching.
    pub fn stop(&self)
    {
        info!("Session stop requested");
        {
            let mut session = self.session.lock().unwrap();
            session.active = false;
            session.stepping = false;
        }
        self.gate.signal();
    }

    /// Whether the event loop is (still) running.
    #[must_use]
    pub fn is_active(&self) -> bool
    {
        self.session.lock().unwrap().active
    }

    /// The disposition the next resume reports to the target.
    #[must_use]
    pub fn continue_status(&self) -> ContinueStatus
    {
        self.session.lock().unwrap().disposition
    }

    /// Overrides the disposition for the event being dispatched.
    ///
    /// The value persists until some later handler changes it.
    pub fn set_continue_status(&self, status: ContinueStatus)
    {
        self.session.lock().unwrap().disposition = status;
    }

    // ------------------------------------------------------------------
    // Thread context
    // ------------------------------------------------------------------

    /// Reads the full register file of the executing thread.
    pub fn executing_context(&self) -> Result<CpuContext>
    {
        let mut session = self.session.lock().unwrap();
        let thread = session.executing_thread.ok_or(DebuggerError::NoExecutingThread)?;
        let context = self.process.read_context(thread)?;
        session.last_context = Some(context);
        Ok(context)
    }

    /// Writes `context` into the executing thread.
    pub fn set_executing_context(&self, context: &CpuContext) -> Result<()>
    {
        let mut session = self.session.lock().unwrap();
        let thread = session.executing_thread.ok_or(DebuggerError::NoExecutingThread)?;
        self.process.write_context(thread, context)?;
        session.last_context = Some(*context);
        Ok(())
    }

    /// The most recent context this session read or wrote, if any.
    #[must_use]
    pub fn last_context(&self) -> Option<CpuContext>
    {
        self.session.lock().unwrap().last_context
    }

    // ------------------------------------------------------------------
    // Memory
    // ------------------------------------------------------------------

    /// Reads `len` bytes of target memory starting at `address`.
    pub fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        let mut buf = vec![0u8; len];
        self.process.read_memory(address, &mut buf)?;
        Ok(buf)
    }

    /// Writes a single byte of target memory.
    pub fn write_byte(&self, address: Address, byte: u8) -> Result<()>
    {
        self.process.write_memory(address, &[byte])?;
        info!(%address, byte = %format_args!("{byte:#04x}"), "Patched target byte");
        Ok(())
    }

    /// Disassembles `count` instructions starting at `address`.
    ///
    /// Bytes displaced by enabled breakpoints are shown as the original
    /// instructions, not as the planted traps.
    pub fn disassemble(&self, address: Address, count: usize) -> Result<Vec<ListedInstruction>>
    {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; count * MAX_INSTRUCTION_LEN + 1];
        self.process.read_memory(address, &mut buf)?;
        {
            let session = self.session.lock().unwrap();
            Self::overlay_saved_bytes(&session, address, &mut buf);
        }
        Ok(self.decoder.disassemble(&buf, address, count))
    }

    /// Walks the executing thread's call stack.
    pub fn call_stack(&self) -> Result<Vec<StackFrame>>
    {
        let context = self.executing_context()?;
        let store = self.symbols.lock().unwrap();
        let backend = self.symbol_backend.as_deref();
        Ok(walk_stack(self.memory(), &context, &store, backend, MAX_FRAMES))
    }

    // ------------------------------------------------------------------
    // Symbols
    // ------------------------------------------------------------------

    /// Looks up a symbol by exact name across the stored modules.
    #[must_use]
    pub fn find_symbol_by_name(&self, name: &str) -> Option<Symbol>
    {
        self.symbols.lock().unwrap().find_by_name(name).cloned()
    }

    /// Looks up the symbol whose address is exactly `address`.
    #[must_use]
    pub fn find_symbol_by_address(&self, address: Address) -> Option<Symbol>
    {
        self.symbols.lock().unwrap().find_by_address(address).cloned()
    }

    /// Lists the modules recorded for this session in base-address order.
    #[must_use]
    pub fn modules(&self) -> Vec<ModuleInfo>
    {
        self.symbols.lock().unwrap().list_modules()
    }

    /// The symbols of the module based at `base`, or an empty list.
    #[must_use]
    pub fn module_symbols(&self, base: Address) -> Vec<Symbol>
    {
        self.symbols
            .lock()
            .unwrap()
            .module(base)
            .map(|module| module.symbols.clone())
            .unwrap_or_default()
    }

    fn resolve_symbol_address(&self, name: &str) -> Result<Address>
    {
        {
            let store = self.symbols.lock().unwrap();
            if let Some(symbol) = store.find_by_name(name) {
                return Ok(symbol.address);
            }
        }
        if let Some(backend) = &self.symbol_backend {
            if let Ok(symbol) = backend.resolve_name(name) {
                return Ok(symbol.address);
            }
        }
        Err(DebuggerError::SymbolNotFound(name.to_owned()))
    }

    // ------------------------------------------------------------------
    // Handlers and notifications
    // ------------------------------------------------------------------

    /// Registers a handler for one kind of debug event.
    ///
    /// Must not be called from inside a handler. While an event is being
    /// dispatched (including a stop parked on the gate) this call blocks.
    pub fn register_event_handler(
        &self,
        kind: DebugEventKind,
        handler: EventHandler,
    ) -> HandlerToken<DebugEventKind>
    {
        self.registries.lock().unwrap().events.register(kind, handler)
    }

    /// Removes a previously registered event handler.
    pub fn remove_event_handler(&self, token: HandlerToken<DebugEventKind>) -> bool
    {
        self.registries.lock().unwrap().events.remove(token)
    }

    /// Registers a handler for one exception code.
    ///
    /// Must not be called from inside a handler.
    pub fn register_exception_handler(
        &self,
        code: ExceptionCode,
        handler: EventHandler,
    ) -> HandlerToken<ExceptionCode>
    {
        self.registries.lock().unwrap().exceptions.register(code, handler)
    }

    /// Removes a previously registered exception handler.
    pub fn remove_exception_handler(&self, token: HandlerToken<ExceptionCode>) -> bool
    {
        self.registries.lock().unwrap().exceptions.remove(token)
    }

    /// Opens the session notification stream.
    ///
    /// Only one subscriber is held at a time; subscribing again replaces
    /// the previous receiver.
    pub fn subscribe(&self) -> SessionEventReceiver
    {
        let (tx, rx) = session_channel();
        *self.events_tx.lock().unwrap() = Some(tx);
        rx
    }

    fn publish(&self, event: SessionEvent)
    {
        let mut sender = self.events_tx.lock().unwrap();
        if let Some(tx) = sender.as_ref() {
            if tx.send(event).is_err() {
                *sender = None;
            }
        }
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn memory(&self) -> &dyn ProcessMemory
    {
        &*self.process
    }

    fn patch_enable(&self, breakpoint: &mut Breakpoint) -> Result<()>
    {
        let address = breakpoint.address();
        self.with_patchable(address, |memory| breakpoint.enable(memory))
    }

    fn patch_disable(&self, breakpoint: &mut Breakpoint) -> Result<()>
    {
        let address = breakpoint.address();
        self.with_patchable(address, |memory| breakpoint.disable(memory))
    }

    /// Relaxes page protection around a one-byte patch and restores it
    /// afterwards. Protection changes are best-effort; the patch itself
    /// decides success.
    fn with_patchable<F>(&self, address: Address, operation: F) -> Result<()>
    where
        F: FnOnce(&dyn ProcessMemory) -> Result<()>,
    {
        let prior = match self
            .process
            .protect_memory(address, 1, PageProtection::EXECUTE_READ_WRITE)
        {
            Ok(prior) => Some(prior),
            Err(error) => {
                warn!(%address, %error, "Could not relax page protection");
                None
            }
        };
        let result = operation(self.memory());
        if let Some(prior) = prior {
            if let Err(error) = self.process.protect_memory(address, 1, prior) {
                warn!(%address, %error, "Could not restore page protection");
            }
        }
        result
    }

    fn decode_with_overlay(&self, session: &SessionState, address: Address) -> Result<DecodedInstruction>
    {
        let mut buf = [0u8; MAX_INSTRUCTION_LEN + 1];
        self.process.read_memory(address, &mut buf)?;
        Self::overlay_saved_bytes(session, address, &mut buf);
        self.decoder.decode_one(&buf, address)
    }

    /// Substitutes saved original bytes for any enabled trap bytes that fall
    /// inside `buf`, so the decoder never sees the patches.
    fn overlay_saved_bytes(session: &SessionState, start: Address, buf: &mut [u8])
    {
        let step_point = std::iter::once(&session.step_point);
        for breakpoint in session.breakpoints.iter().chain(step_point) {
            if !breakpoint.is_enabled() {
                continue;
            }
            let Some(byte) = breakpoint.saved_byte() else { continue };
            let Some(offset) = breakpoint.address().value().checked_sub(start.value()) else {
                continue;
            };
            if let Ok(index) = usize::try_from(offset) {
                if index < buf.len() {
                    buf[index] = byte;
                }
            }
        }
    }
}
