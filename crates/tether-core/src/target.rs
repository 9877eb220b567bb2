//! Trait boundary between the engine and the OS debug facility.
//!
//! The engine never calls the OS directly. Everything it needs from the
//! target side goes through these traits: reading and writing target
//! memory, reading and writing thread register contexts, and pumping the
//! OS debug-event stream. Platform backends implement them; tests drive
//! the engine with in-process fakes.

use crate::error::{DebuggerError, Result};
use crate::events::DebugEvent;
use crate::types::{Address, ContinueStatus, CpuContext, ProcessId, ThreadId};

/// Page protection attributes, in the OS's raw encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageProtection(pub u32);

impl PageProtection
{
    /// Readable, writable, and executable. Breakpoint patching relaxes a
    /// code page to this before writing and restores the previous value
    /// afterwards.
    pub const EXECUTE_READ_WRITE: PageProtection = PageProtection(0x40);

    /// Raw OS protection value.
    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }
}

/// Read/write access to the target's address space.
pub trait ProcessMemory
{
    /// Fill `buf` from target memory starting at `address`.
    ///
    /// The read is all or nothing; a partially readable range is an
    /// error.
    fn read_memory(&self, address: Address, buf: &mut [u8]) -> Result<()>;

    /// Write `data` into target memory starting at `address`.
    fn write_memory(&self, address: Address, data: &[u8]) -> Result<()>;

    /// Change the protection of the pages covering
    /// `address .. address + len` and return the previous protection.
    fn protect_memory(
        &self,
        address: Address,
        len: usize,
        protection: PageProtection,
    ) -> Result<PageProtection>;
}

/// Access to per-thread register contexts.
pub trait ThreadContext
{
    /// Snapshot the full user-visible register context of `thread`.
    ///
    /// The thread must be suspended by a pending debug event; reading a
    /// running thread's context is racy and the OS may refuse it.
    fn read_context(&self, thread: ThreadId) -> Result<CpuContext>;

    /// Replace the register context of `thread`.
    fn write_context(&self, thread: ThreadId, context: &CpuContext) -> Result<()>;
}

/// Everything the engine needs from the target process itself.
pub trait TargetProcess: ProcessMemory + ThreadContext + Send + Sync
{
    /// OS id of the process under debug.
    fn process_id(&self) -> ProcessId;

    /// Forcibly end the target with `exit_code`.
    fn terminate(&self, exit_code: u32) -> Result<()>;
}

/// Source of debug events for one target process.
///
/// All methods must be called from the same thread; OS debug facilities
/// bind the debugger role to the attaching thread. The engine honors this
/// by driving the source only from its event loop.
pub trait DebugEventSource: Send
{
    /// Begin debugging `process`.
    ///
    /// With `kill_on_detach` set, the OS ends the target when the session
    /// detaches or the debugger exits; otherwise the target keeps
    /// running.
    fn attach(&mut self, process: ProcessId, kill_on_detach: bool) -> Result<()>;

    /// Wait up to `timeout_ms` for the next debug event.
    ///
    /// Returns `Ok(None)` when the wait times out with no event. Any
    /// other failure is fatal to the session.
    fn wait_event(&mut self, timeout_ms: u32) -> Result<Option<DebugEvent>>;

    /// Resume the thread that raised the last event, reporting `status`
    /// for exception events. Failure is fatal to the session.
    fn continue_event(
        &mut self,
        process: ProcessId,
        thread: ThreadId,
        status: ContinueStatus,
    ) -> Result<()>;

    /// Stop debugging the target, leaving it to run (or die, when the
    /// session attached with `kill_on_detach`).
    fn detach(&mut self) -> Result<()>;
}

/// Read a NUL-terminated string out of target memory.
///
/// Debug-string events describe their payload by address and character
/// count; the characters are 8-bit when `wide` is false and UTF-16 code
/// units otherwise. Decoding is lossy so a malformed payload still yields
/// something printable.
pub fn read_target_string(
    memory: &dyn ProcessMemory,
    address: Address,
    length: usize,
    wide: bool,
) -> Result<String>
{
    if length == 0 {
        return Ok(String::new());
    }
    let byte_len = if wide {
        length
            .checked_mul(2)
            .ok_or_else(|| DebuggerError::MemoryRead {
                address: address.value(),
                len: length,
                details: "string length overflows".to_owned(),
            })?
    } else {
        length
    };
    let mut buf = vec![0u8; byte_len];
    memory.read_memory(address, &mut buf)?;

    let text = if wide {
        let units: Vec<u16> = buf
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(&buf).into_owned()
    };
    Ok(text.trim_end_matches('\0').to_owned())
}
