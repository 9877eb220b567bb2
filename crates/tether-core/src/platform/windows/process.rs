//! Target process access: memory, page protection, and thread contexts.
//!
//! All operations go through a process handle opened with
//! `PROCESS_ALL_ACCESS`. Thread contexts additionally open a short-lived
//! thread handle per call, mirroring how the debug facility identifies
//! threads by id in every event.

use std::ffi::c_void;

use tracing::debug;
use windows::Win32::Foundation::{CloseHandle, BOOL, HANDLE};
use windows::Win32::System::Diagnostics::Debug::{
    FlushInstructionCache, GetThreadContext, ReadProcessMemory, SetThreadContext,
    WriteProcessMemory, CONTEXT, CONTEXT_ALL_AMD64,
};
use windows::Win32::System::Memory::{VirtualProtectEx, PAGE_PROTECTION_FLAGS};
use windows::Win32::System::Threading::{
    OpenProcess, OpenThread, TerminateProcess, PROCESS_ALL_ACCESS, THREAD_ALL_ACCESS,
};

use crate::error::{DebuggerError, Result};
use crate::target::{PageProtection, ProcessMemory, TargetProcess, ThreadContext};
use crate::types::{Address, CpuContext, ProcessId, ThreadId};

/// A Win32 process opened for debugging.
///
/// The handle is opened with full access when the session is built and
/// closed when the value drops. Memory and context operations have no
/// thread affinity, so this type is shared freely between the event loop
/// and command threads.
pub struct WindowsProcess
{
    id: ProcessId,
    handle: HANDLE,
}

impl WindowsProcess
{
    /// Open `process` with full access.
    ///
    /// ## Errors
    ///
    /// Returns [`DebuggerError::AttachFailed`] when the process does not
    /// exist or the caller lacks debug rights over it.
    pub fn open(process: ProcessId) -> Result<Self>
    {
        let handle = unsafe { OpenProcess(PROCESS_ALL_ACCESS, BOOL::from(false), process.raw()) }
            .map_err(|error| DebuggerError::AttachFailed(error.to_string()))?;
        Ok(Self {
            id: process,
            handle,
        })
    }

    /// The raw process handle, for APIs keyed by it (DbgHelp).
    #[must_use]
    pub const fn raw_handle(&self) -> HANDLE
    {
        self.handle
    }
}

impl Drop for WindowsProcess
{
    fn drop(&mut self)
    {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

impl ProcessMemory for WindowsProcess
{
    /// Read target memory with `ReadProcessMemory`.
    ///
    /// The read is all-or-nothing: a range that crosses into an unmapped
    /// or inaccessible page fails without partial data.
    fn read_memory(&self, address: Address, buf: &mut [u8]) -> Result<()>
    {
        if buf.is_empty() {
            return Ok(());
        }
        let mut read = 0usize;
        unsafe {
            ReadProcessMemory(
                self.handle,
                address.value() as usize as *const c_void,
                buf.as_mut_ptr().cast(),
                buf.len(),
                Some(&mut read),
            )
        }
        .map_err(|error| DebuggerError::MemoryRead {
            address: address.value(),
            len: buf.len(),
            details: error.to_string(),
        })?;
        if read != buf.len() {
            return Err(DebuggerError::MemoryRead {
                address: address.value(),
                len: buf.len(),
                details: format!("short read of {read} byte(s)"),
            });
        }
        Ok(())
    }

    /// Write target memory with `WriteProcessMemory`.
    ///
    /// The instruction cache is flushed afterwards so patched code bytes
    /// take effect before the target next executes them.
    fn write_memory(&self, address: Address, data: &[u8]) -> Result<()>
    {
        if data.is_empty() {
            return Ok(());
        }
        let mut written = 0usize;
        unsafe {
            WriteProcessMemory(
                self.handle,
                address.value() as usize as *const c_void,
                data.as_ptr().cast(),
                data.len(),
                Some(&mut written),
            )
        }
        .map_err(|error| DebuggerError::MemoryWrite {
            address: address.value(),
            len: data.len(),
            details: error.to_string(),
        })?;
        if written != data.len() {
            return Err(DebuggerError::MemoryWrite {
                address: address.value(),
                len: data.len(),
                details: format!("short write of {written} byte(s)"),
            });
        }
        if let Err(error) = unsafe {
            FlushInstructionCache(
                self.handle,
                Some(address.value() as usize as *const c_void),
                data.len(),
            )
        } {
            debug!(%address, %error, "Instruction cache flush failed");
        }
        Ok(())
    }

    /// Change page protection with `VirtualProtectEx`, returning the prior
    /// protection of the first affected page.
    fn protect_memory(
        &self,
        address: Address,
        len: usize,
        protection: PageProtection,
    ) -> Result<PageProtection>
    {
        let mut prior = PAGE_PROTECTION_FLAGS(0);
        unsafe {
            VirtualProtectEx(
                self.handle,
                address.value() as usize as *const c_void,
                len,
                PAGE_PROTECTION_FLAGS(protection.raw()),
                &mut prior,
            )
        }
        .map_err(|error| DebuggerError::ProtectionChange {
            address: address.value(),
            details: error.to_string(),
        })?;
        Ok(PageProtection(prior.0))
    }
}

impl ThreadContext for WindowsProcess
{
    fn read_context(&self, thread: ThreadId) -> Result<CpuContext>
    {
        let handle = open_thread(thread).map_err(|error| DebuggerError::ContextRead {
            thread: thread.raw(),
            details: error.to_string(),
        })?;
        let mut raw = CONTEXT {
            ContextFlags: CONTEXT_ALL_AMD64,
            ..Default::default()
        };
        unsafe { GetThreadContext(handle.0, &mut raw) }.map_err(|error| {
            DebuggerError::ContextRead {
                thread: thread.raw(),
                details: error.to_string(),
            }
        })?;
        Ok(context_from_raw(&raw))
    }

    /// Write the portable register set into `thread`.
    ///
    /// The OS context holds more state than [`CpuContext`] models (segment
    /// selectors, floating-point state), so the current context is read
    /// first and only the modeled registers are replaced.
    fn write_context(&self, thread: ThreadId, context: &CpuContext) -> Result<()>
    {
        let handle = open_thread(thread).map_err(|error| DebuggerError::ContextWrite {
            thread: thread.raw(),
            details: error.to_string(),
        })?;
        let mut raw = CONTEXT {
            ContextFlags: CONTEXT_ALL_AMD64,
            ..Default::default()
        };
        unsafe { GetThreadContext(handle.0, &mut raw) }.map_err(|error| {
            DebuggerError::ContextWrite {
                thread: thread.raw(),
                details: error.to_string(),
            }
        })?;
        apply_to_raw(context, &mut raw);
        unsafe { SetThreadContext(handle.0, &raw) }.map_err(|error| {
            DebuggerError::ContextWrite {
                thread: thread.raw(),
                details: error.to_string(),
            }
        })
    }
}

impl TargetProcess for WindowsProcess
{
    fn process_id(&self) -> ProcessId
    {
        self.id
    }

    fn terminate(&self, exit_code: u32) -> Result<()>
    {
        unsafe { TerminateProcess(self.handle, exit_code) }
            .map_err(|error| DebuggerError::Terminate(error.to_string()))
    }
}

/// Thread handle that closes itself on drop.
struct OwnedThread(HANDLE);

impl Drop for OwnedThread
{
    fn drop(&mut self)
    {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

fn open_thread(thread: ThreadId) -> windows::core::Result<OwnedThread>
{
    let handle = unsafe { OpenThread(THREAD_ALL_ACCESS, BOOL::from(false), thread.raw()) }?;
    Ok(OwnedThread(handle))
}

fn context_from_raw(raw: &CONTEXT) -> CpuContext
{
    CpuContext {
        rax: raw.Rax,
        rbx: raw.Rbx,
        rcx: raw.Rcx,
        rdx: raw.Rdx,
        rsi: raw.Rsi,
        rdi: raw.Rdi,
        rbp: raw.Rbp,
        rsp: raw.Rsp,
        r8: raw.R8,
        r9: raw.R9,
        r10: raw.R10,
        r11: raw.R11,
        r12: raw.R12,
        r13: raw.R13,
        r14: raw.R14,
        r15: raw.R15,
        rip: raw.Rip,
        rflags: u64::from(raw.EFlags),
    }
}

fn apply_to_raw(context: &CpuContext, raw: &mut CONTEXT)
{
    raw.Rax = context.rax;
    raw.Rbx = context.rbx;
    raw.Rcx = context.rcx;
    raw.Rdx = context.rdx;
    raw.Rsi = context.rsi;
    raw.Rdi = context.rdi;
    raw.Rbp = context.rbp;
    raw.Rsp = context.rsp;
    raw.R8 = context.r8;
    raw.R9 = context.r9;
    raw.R10 = context.r10;
    raw.R11 = context.r11;
    raw.R12 = context.r12;
    raw.R13 = context.r13;
    raw.R14 = context.r14;
    raw.R15 = context.r15;
    raw.Rip = context.rip;
    raw.EFlags = context.rflags as u32;
}
