//! Debug event model and the session notification channel.
//!
//! The platform event source translates raw OS debug events into
//! [`DebugEvent`] values. The engine dispatches them first by
//! [`DebugEventKind`] and, for exception events, a second time by
//! [`ExceptionCode`]. Session-level notifications (breakpoint hits, step
//! completions, target faults) flow to interactive front ends over a
//! standard mpsc channel so they never have to poll engine state.

use std::fmt;
use std::sync::mpsc;

use crate::types::{Address, ProcessId, ThreadId};

/// Exception codes the engine distinguishes.
///
/// The named variants cover the codes a Win32-style debug facility
/// delivers for hardware faults and debugger-generated events; anything
/// else arrives as `Unknown` with the raw code preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionCode
{
    /// Read/write/execute of an inaccessible page.
    AccessViolation,
    /// Hardware-checked array bounds violation.
    ArrayBoundsExceeded,
    /// Breakpoint instruction executed.
    Breakpoint,
    /// Misaligned access on data that requires alignment.
    DatatypeMisalignment,
    /// Floating-point operand too small to represent.
    FltDenormalOperand,
    /// Floating-point division by zero.
    FltDivideByZero,
    /// Floating-point result not exactly representable.
    FltInexactResult,
    /// Invalid floating-point operation.
    FltInvalidOperation,
    /// Floating-point overflow.
    FltOverflow,
    /// Floating-point stack over/underflow.
    FltStackCheck,
    /// Floating-point underflow.
    FltUnderflow,
    /// Access to a guard page.
    GuardPage,
    /// Invalid or privileged opcode for the current mode.
    IllegalInstruction,
    /// Page-in failure on a memory-mapped access.
    InPageError,
    /// Invalid kernel object handle.
    InvalidHandle,
    /// Integer division by zero.
    IntDivideByZero,
    /// Integer overflow with trapping enabled.
    IntOverflow,
    /// Invalid disposition from an exception filter.
    InvalidDisposition,
    /// Continuation after a noncontinuable exception.
    NoncontinuableException,
    /// Privileged instruction in user mode.
    PrivilegedInstruction,
    /// Trap-flag single step completed.
    SingleStep,
    /// Thread stack exhausted.
    StackOverflow,
    /// Any code without a named variant.
    Unknown(u32),
}

impl ExceptionCode
{
    /// Map a raw OS exception code to a variant.
    #[must_use]
    pub const fn from_raw(code: u32) -> Self
    {
        match code {
            0x8000_0001 => Self::GuardPage,
            0x8000_0002 => Self::DatatypeMisalignment,
            0x8000_0003 => Self::Breakpoint,
            0x8000_0004 => Self::SingleStep,
            0xC000_0005 => Self::AccessViolation,
            0xC000_0006 => Self::InPageError,
            0xC000_0008 => Self::InvalidHandle,
            0xC000_001D => Self::IllegalInstruction,
            0xC000_0025 => Self::NoncontinuableException,
            0xC000_0026 => Self::InvalidDisposition,
            0xC000_008C => Self::ArrayBoundsExceeded,
            0xC000_008D => Self::FltDenormalOperand,
            0xC000_008E => Self::FltDivideByZero,
            0xC000_008F => Self::FltInexactResult,
            0xC000_0090 => Self::FltInvalidOperation,
            0xC000_0091 => Self::FltOverflow,
            0xC000_0092 => Self::FltStackCheck,
            0xC000_0093 => Self::FltUnderflow,
            0xC000_0094 => Self::IntDivideByZero,
            0xC000_0095 => Self::IntOverflow,
            0xC000_0096 => Self::PrivilegedInstruction,
            0xC000_00FD => Self::StackOverflow,
            other => Self::Unknown(other),
        }
    }

    /// Raw OS exception code.
    #[must_use]
    pub const fn raw(self) -> u32
    {
        match self {
            Self::GuardPage => 0x8000_0001,
            Self::DatatypeMisalignment => 0x8000_0002,
            Self::Breakpoint => 0x8000_0003,
            Self::SingleStep => 0x8000_0004,
            Self::AccessViolation => 0xC000_0005,
            Self::InPageError => 0xC000_0006,
            Self::InvalidHandle => 0xC000_0008,
            Self::IllegalInstruction => 0xC000_001D,
            Self::NoncontinuableException => 0xC000_0025,
            Self::InvalidDisposition => 0xC000_0026,
            Self::ArrayBoundsExceeded => 0xC000_008C,
            Self::FltDenormalOperand => 0xC000_008D,
            Self::FltDivideByZero => 0xC000_008E,
            Self::FltInexactResult => 0xC000_008F,
            Self::FltInvalidOperation => 0xC000_0090,
            Self::FltOverflow => 0xC000_0091,
            Self::FltStackCheck => 0xC000_0092,
            Self::FltUnderflow => 0xC000_0093,
            Self::IntDivideByZero => 0xC000_0094,
            Self::IntOverflow => 0xC000_0095,
            Self::PrivilegedInstruction => 0xC000_0096,
            Self::StackOverflow => 0xC000_00FD,
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for ExceptionCode
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::AccessViolation => f.write_str("access violation"),
            Self::ArrayBoundsExceeded => f.write_str("array bounds exceeded"),
            Self::Breakpoint => f.write_str("breakpoint"),
            Self::DatatypeMisalignment => f.write_str("datatype misalignment"),
            Self::FltDenormalOperand => f.write_str("floating-point denormal operand"),
            Self::FltDivideByZero => f.write_str("floating-point divide by zero"),
            Self::FltInexactResult => f.write_str("floating-point inexact result"),
            Self::FltInvalidOperation => f.write_str("floating-point invalid operation"),
            Self::FltOverflow => f.write_str("floating-point overflow"),
            Self::FltStackCheck => f.write_str("floating-point stack check"),
            Self::FltUnderflow => f.write_str("floating-point underflow"),
            Self::GuardPage => f.write_str("guard page violation"),
            Self::IllegalInstruction => f.write_str("illegal instruction"),
            Self::InPageError => f.write_str("in-page error"),
            Self::InvalidHandle => f.write_str("invalid handle"),
            Self::IntDivideByZero => f.write_str("integer divide by zero"),
            Self::IntOverflow => f.write_str("integer overflow"),
            Self::InvalidDisposition => f.write_str("invalid disposition"),
            Self::NoncontinuableException => f.write_str("noncontinuable exception"),
            Self::PrivilegedInstruction => f.write_str("privileged instruction"),
            Self::SingleStep => f.write_str("single step"),
            Self::StackOverflow => f.write_str("stack overflow"),
            Self::Unknown(code) => write!(f, "unknown exception 0x{code:08x}"),
        }
    }
}

/// Details of a target exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionRecord
{
    /// Classified exception code.
    pub code: ExceptionCode,
    /// Address of the faulting or trapping instruction.
    pub address: Address,
}

/// Per-kind data attached to a debug event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEventPayload
{
    /// The target process came under debug control.
    CreateProcess
    {
        /// Load address of the main image.
        image_base: Address,
        /// Entry point of the initial thread.
        start_address: Address,
        /// Path of the main image, when the OS could resolve it.
        image_path: Option<String>,
    },
    /// A new thread started in the target.
    CreateThread
    {
        /// Entry point of the new thread.
        start_address: Address,
    },
    /// The target process exited.
    ExitProcess
    {
        /// Exit code reported by the OS.
        exit_code: u32,
    },
    /// A target thread exited.
    ExitThread
    {
        /// Exit code reported by the OS.
        exit_code: u32,
    },
    /// A module was mapped into the target.
    LoadModule
    {
        /// Load address of the module image.
        base: Address,
        /// Path of the module, when the OS could resolve it.
        image_path: Option<String>,
    },
    /// A module was unmapped from the target.
    UnloadModule
    {
        /// Load address the module occupied.
        base: Address,
    },
    /// The target emitted a debug string.
    ///
    /// The string itself still lives in target memory; `address` and
    /// `length` describe where to read it from.
    OutputString
    {
        /// Location of the string in target memory.
        address: Address,
        /// Length in characters, including the terminator.
        length: usize,
        /// Whether the characters are 16-bit units.
        wide: bool,
    },
    /// The target raised an exception.
    Exception
    {
        /// `false` once the target's own handlers already declined it.
        first_chance: bool,
        /// Code and faulting address.
        record: ExceptionRecord,
    },
    /// The OS reported a debugging error out of band.
    Rip
    {
        /// OS error code.
        error: u32,
        /// Severity of the error, as reported.
        kind: u32,
    },
    /// An event code without a named kind.
    Unknown
    {
        /// Raw OS event code.
        code: u32,
    },
}

/// Discriminant of a [`DebugEventPayload`], used to key event handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugEventKind
{
    CreateProcess,
    CreateThread,
    ExitProcess,
    ExitThread,
    LoadModule,
    UnloadModule,
    OutputString,
    Exception,
    Rip,
    Unknown,
}

impl fmt::Display for DebugEventKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            Self::CreateProcess => "create process",
            Self::CreateThread => "create thread",
            Self::ExitProcess => "exit process",
            Self::ExitThread => "exit thread",
            Self::LoadModule => "load module",
            Self::UnloadModule => "unload module",
            Self::OutputString => "output string",
            Self::Exception => "exception",
            Self::Rip => "rip",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// One debug event delivered by the OS.
///
/// Every event names the process and thread that raised it; resuming the
/// target requires handing exactly these ids back to the OS together with
/// a continuation disposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugEvent
{
    /// Process that raised the event.
    pub process: ProcessId,
    /// Thread that raised the event.
    pub thread: ThreadId,
    /// Kind-specific data.
    pub payload: DebugEventPayload,
}

impl DebugEvent
{
    /// Discriminant used for handler dispatch.
    #[must_use]
    pub const fn kind(&self) -> DebugEventKind
    {
        match self.payload {
            DebugEventPayload::CreateProcess { .. } => DebugEventKind::CreateProcess,
            DebugEventPayload::CreateThread { .. } => DebugEventKind::CreateThread,
            DebugEventPayload::ExitProcess { .. } => DebugEventKind::ExitProcess,
            DebugEventPayload::ExitThread { .. } => DebugEventKind::ExitThread,
            DebugEventPayload::LoadModule { .. } => DebugEventKind::LoadModule,
            DebugEventPayload::UnloadModule { .. } => DebugEventKind::UnloadModule,
            DebugEventPayload::OutputString { .. } => DebugEventKind::OutputString,
            DebugEventPayload::Exception { .. } => DebugEventKind::Exception,
            DebugEventPayload::Rip { .. } => DebugEventKind::Rip,
            DebugEventPayload::Unknown { .. } => DebugEventKind::Unknown,
        }
    }
}

/// Notification published while a debug session runs.
///
/// Front ends consume these to print target activity without reaching into
/// engine state from the event-loop thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent
{
    /// The session attached to the target process.
    ProcessCreated
    {
        /// Target process id.
        process: ProcessId,
        /// Path of the main image, when known.
        image: Option<String>,
    },
    /// The target process exited; the session ends after this.
    ProcessExited
    {
        /// Exit code reported by the OS.
        exit_code: u32,
    },
    /// A thread started in the target.
    ThreadCreated
    {
        /// New thread id.
        thread: ThreadId,
        /// Entry point of the thread.
        start_address: Address,
    },
    /// A target thread exited.
    ThreadExited
    {
        /// Thread id.
        thread: ThreadId,
        /// Exit code reported by the OS.
        exit_code: u32,
    },
    /// A module was mapped and its exports recorded.
    ModuleLoaded
    {
        /// Load address of the module.
        base: Address,
        /// Module path, when known.
        name: Option<String>,
        /// Number of symbols recorded for the module.
        symbols: usize,
    },
    /// A module was unmapped.
    ModuleUnloaded
    {
        /// Load address the module occupied.
        base: Address,
    },
    /// A breakpoint the user planted was hit.
    BreakpointHit
    {
        /// Breakpoint address.
        address: Address,
        /// Thread that hit it.
        thread: ThreadId,
        /// Total hits recorded for this breakpoint so far.
        hits: u64,
    },
    /// A requested step finished.
    StepComplete
    {
        /// Address execution stopped at.
        address: Address,
        /// Thread that stepped.
        thread: ThreadId,
    },
    /// The target raised a fault the engine does not own.
    TargetFault
    {
        /// Classified exception code.
        code: ExceptionCode,
        /// Faulting address.
        address: Address,
        /// Whether the target's handlers have not yet seen it.
        first_chance: bool,
    },
    /// The target emitted a debug string.
    Output
    {
        /// Decoded string contents.
        text: String,
    },
    /// The OS reported a debugging error out of band.
    Rip
    {
        /// OS error code.
        error: u32,
        /// Severity of the error, as reported.
        kind: u32,
    },
}

impl SessionEvent
{
    /// Human-readable description of the event.
    #[must_use]
    pub fn describe(&self) -> String
    {
        match self {
            Self::ProcessCreated { process, image } => match image {
                Some(path) => format!("Attached to process {process} ({path})"),
                None => format!("Attached to process {process}"),
            },
            Self::ProcessExited { exit_code } => {
                format!("Process exited with code {exit_code}")
            }
            Self::ThreadCreated {
                thread,
                start_address,
            } => {
                format!("Thread {thread} started at {start_address}")
            }
            Self::ThreadExited { thread, exit_code } => {
                format!("Thread {thread} exited with code {exit_code}")
            }
            Self::ModuleLoaded {
                base,
                name,
                symbols,
            } => match name {
                Some(name) => format!("Loaded {name} at {base} ({symbols} symbols)"),
                None => format!("Loaded module at {base} ({symbols} symbols)"),
            },
            Self::ModuleUnloaded { base } => format!("Unloaded module at {base}"),
            Self::BreakpointHit {
                address,
                thread,
                hits,
            } => {
                format!("Hit breakpoint at {address} (thread {thread}, hit {hits})")
            }
            Self::StepComplete { address, thread } => {
                format!("Stepped to {address} (thread {thread})")
            }
            Self::TargetFault {
                code,
                address,
                first_chance,
            } => {
                let chance = if *first_chance { "first" } else { "second" };
                format!("Target fault: {code} at {address} ({chance} chance)")
            }
            Self::Output { text } => format!("Debug string: {text}"),
            Self::Rip { error, kind } => {
                format!("RIP event: error {error} (type {kind})")
            }
        }
    }
}

/// Sender side of the session event channel.
pub type SessionEventSender = mpsc::Sender<SessionEvent>;
/// Receiver side of the session event channel.
pub type SessionEventReceiver = mpsc::Receiver<SessionEvent>;

/// Create a new session event channel.
#[must_use]
pub fn session_channel() -> (SessionEventSender, SessionEventReceiver)
{
    mpsc::channel()
}
