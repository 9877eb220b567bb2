//! # Error Types
//!
//! General error handling for the debugger engine.
//!
//! We use `thiserror` to generate `Error` impls and display messages.
//!
//! ## Error Categories
//!
//! 1. **Session errors**: `AttachFailed`, `DetachFailed`, `NotAttached`,
//!    `Terminate`
//! 2. **Fatal loop errors**: `WaitEvent`, `ContinueEvent`, the only class
//!    that ends a debug session; everything else is recoverable by the caller
//! 3. **Target access errors**: `MemoryRead`, `MemoryWrite`,
//!    `ProtectionChange`, `ContextRead`, `ContextWrite`
//! 4. **Breakpoint errors**: `DuplicateBreakpoint`, `NoBreakpoint`,
//!    `Unsupported`
//! 5. **Symbol errors**: `SymbolInit`, `SymbolNotFound`, `SymbolLoad`
//! 6. **Decoder errors**: `Decode`
//! 7. **I/O errors**: `Io`

use thiserror::Error;

/// Main error type for debugger operations.
///
/// Target-side faults (access violations, arithmetic faults, …) are *not*
/// errors of this engine: they travel back to the OS as a "not handled"
/// continuation disposition and the session keeps running. Only failures of
/// the engine's own primitives appear here.
#[derive(Error, Debug)]
pub enum DebuggerError
{
    /// Could not begin debugging the target process.
    ///
    /// Typical causes: the PID does not exist, the target is already being
    /// debugged, or the caller lacks debug rights over it.
    #[error("Failed to attach to process: {0}")]
    AttachFailed(String),

    /// Could not detach from the target process.
    #[error("Failed to detach from process: {0}")]
    DetachFailed(String),

    /// Operation requires an attached target process.
    #[error("Not attached to a process")]
    NotAttached,

    /// Could not forcibly end the target process.
    #[error("Failed to terminate the target process: {0}")]
    Terminate(String),

    /// Operation requires a stopped thread, but no breakpoint or
    /// single-step exception has designated an executing thread yet.
    #[error("No executing thread; the target has not stopped at a breakpoint or step")]
    NoExecutingThread,

    /// The blocking wait for the next debug event failed.
    ///
    /// Fatal: the event loop cannot make progress and the session ends.
    #[error("Waiting for a debug event failed: {0}")]
    WaitEvent(String),

    /// Resuming the target after a debug event failed.
    ///
    /// Fatal: the target thread stays suspended and the session ends.
    #[error("Continuing the debug event failed: {0}")]
    ContinueEvent(String),

    /// Reading target process memory failed.
    #[error("Could not read {len} byte(s) at {address:#018x}: {details}")]
    MemoryRead
    {
        /// Address the read started at.
        address: u64,
        /// Number of bytes requested.
        len: usize,
        /// OS-level failure detail.
        details: String,
    },

    /// Writing target process memory failed.
    #[error("Could not write {len} byte(s) at {address:#018x}: {details}")]
    MemoryWrite
    {
        /// Address the write started at.
        address: u64,
        /// Number of bytes in the write.
        len: usize,
        /// OS-level failure detail.
        details: String,
    },

    /// Changing page protection on target memory failed.
    #[error("Could not change memory protection at {address:#018x}: {details}")]
    ProtectionChange
    {
        /// Address of the affected region.
        address: u64,
        /// OS-level failure detail.
        details: String,
    },

    /// Reading a thread's register context failed.
    #[error("Could not read context for thread {thread}: {details}")]
    ContextRead
    {
        /// OS thread identifier.
        thread: u32,
        /// OS-level failure detail.
        details: String,
    },

    /// Writing a thread's register context failed.
    #[error("Could not write context for thread {thread}: {details}")]
    ContextWrite
    {
        /// OS thread identifier.
        thread: u32,
        /// OS-level failure detail.
        details: String,
    },

    /// A breakpoint already exists at the given address.
    ///
    /// Installing a second trap at the same address would record the trap
    /// opcode as the "original" byte and corrupt the restore path, so the
    /// table rejects the request instead.
    #[error("A breakpoint already exists at {0:#018x}")]
    DuplicateBreakpoint(u64),

    /// No breakpoint at the given address.
    #[error("No breakpoint at address {0:#018x}")]
    NoBreakpoint(u64),

    /// The requested operation is not implemented for this breakpoint kind
    /// or platform.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The symbol backend could not be brought up for this session.
    #[error("Initializing the symbol backend failed: {0}")]
    SymbolInit(String),

    /// No symbol with the given name is known.
    #[error("No symbol named `{0}`")]
    SymbolNotFound(String),

    /// Loading or enumerating symbols for a module failed.
    ///
    /// Non-fatal: debugging continues with partial symbol coverage.
    #[error("Could not load symbols for `{module}`: {details}")]
    SymbolLoad
    {
        /// Module path or display name.
        module: String,
        /// Backend failure detail.
        details: String,
    },

    /// The instruction decoder could not decode at the given address.
    #[error("Could not decode instruction at {address:#018x}: {details}")]
    Decode
    {
        /// Address decoding started at.
        address: u64,
        /// Decoder failure detail.
        details: String,
    },

    /// No native debug facility is available on this platform.
    #[error("Native debugging is not supported on this platform")]
    UnsupportedPlatform,

    /// I/O error (file operations, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, DebuggerError>;
