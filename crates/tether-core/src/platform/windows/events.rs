//! The Win32 debug event pump.
//!
//! `WaitForDebugEvent` hands out raw `DEBUG_EVENT` records whose payload
//! lives in a per-kind union; translation into the engine's
//! [`DebugEvent`] model happens here, including recovering image paths
//! from the file handles the OS attaches to process- and module-load
//! events. Those handles are owned by the debugger and closed as soon as
//! the path is extracted.

use tracing::warn;
use windows::Win32::Foundation::{
    CloseHandle, BOOL, DBG_CONTINUE, DBG_EXCEPTION_NOT_HANDLED, ERROR_SEM_TIMEOUT, HANDLE,
};
use windows::Win32::Storage::FileSystem::{GetFinalPathNameByHandleW, VOLUME_NAME_DOS};
use windows::Win32::System::Diagnostics::Debug::{
    ContinueDebugEvent, DebugActiveProcess, DebugActiveProcessStop, DebugSetProcessKillOnExit,
    WaitForDebugEvent, CREATE_PROCESS_DEBUG_EVENT, CREATE_THREAD_DEBUG_EVENT, DEBUG_EVENT,
    EXCEPTION_DEBUG_EVENT, EXIT_PROCESS_DEBUG_EVENT, EXIT_THREAD_DEBUG_EVENT,
    LOAD_DLL_DEBUG_EVENT, OUTPUT_DEBUG_STRING_EVENT, RIP_EVENT, UNLOAD_DLL_DEBUG_EVENT,
};

use crate::error::{DebuggerError, Result};
use crate::events::{DebugEvent, DebugEventPayload, ExceptionCode, ExceptionRecord};
use crate::target::DebugEventSource;
use crate::types::{Address, ContinueStatus, ProcessId, ThreadId};

/// Debug event source over the Win32 debug facility.
///
/// All methods must run on the thread that attached; the OS rejects wait,
/// continue and detach calls from any other thread.
#[derive(Debug, Default)]
pub struct WindowsEventSource
{
    attached: Option<ProcessId>,
}

impl WindowsEventSource
{
    /// Create a source that is not yet attached to anything.
    #[must_use]
    pub const fn new() -> Self
    {
        Self {
            attached: None,
        }
    }
}

impl DebugEventSource for WindowsEventSource
{
    fn attach(&mut self, process: ProcessId, kill_on_detach: bool) -> Result<()>
    {
        unsafe { DebugActiveProcess(process.raw()) }
            .map_err(|error| DebuggerError::AttachFailed(error.to_string()))?;
        // Best-effort: without it the OS default (kill) applies.
        if let Err(error) = unsafe { DebugSetProcessKillOnExit(BOOL::from(kill_on_detach)) } {
            warn!(%error, "Could not set the kill-on-detach policy");
        }
        self.attached = Some(process);
        Ok(())
    }

    fn wait_event(&mut self, timeout_ms: u32) -> Result<Option<DebugEvent>>
    {
        if self.attached.is_none() {
            return Err(DebuggerError::NotAttached);
        }
        let mut raw = DEBUG_EVENT::default();
        if let Err(error) = unsafe { WaitForDebugEvent(&mut raw, timeout_ms) } {
            if error.code() == ERROR_SEM_TIMEOUT.to_hresult() {
                return Ok(None);
            }
            return Err(DebuggerError::WaitEvent(error.to_string()));
        }
        Ok(Some(translate(&raw)))
    }

    fn continue_event(
        &mut self,
        process: ProcessId,
        thread: ThreadId,
        status: ContinueStatus,
    ) -> Result<()>
    {
        if self.attached.is_none() {
            return Err(DebuggerError::NotAttached);
        }
        let disposition = match status {
            ContinueStatus::Handled => DBG_CONTINUE,
            ContinueStatus::NotHandled => DBG_EXCEPTION_NOT_HANDLED,
        };
        unsafe { ContinueDebugEvent(process.raw(), thread.raw(), disposition) }
            .map_err(|error| DebuggerError::ContinueEvent(error.to_string()))
    }

    fn detach(&mut self) -> Result<()>
    {
        let Some(process) = self.attached.take() else {
            return Ok(());
        };
        unsafe { DebugActiveProcessStop(process.raw()) }
            .map_err(|error| DebuggerError::DetachFailed(error.to_string()))
    }
}

/// Map a raw `DEBUG_EVENT` into the engine's event model.
fn translate(raw: &DEBUG_EVENT) -> DebugEvent
{
    let payload = match raw.dwDebugEventCode {
        EXCEPTION_DEBUG_EVENT => {
            let info = unsafe { raw.u.Exception };
            DebugEventPayload::Exception {
                first_chance: info.dwFirstChance != 0,
                record: ExceptionRecord {
                    code: ExceptionCode::from_raw(info.ExceptionRecord.ExceptionCode.0 as u32),
                    address: Address::new(info.ExceptionRecord.ExceptionAddress as u64),
                },
            }
        }
        CREATE_PROCESS_DEBUG_EVENT => {
            let info = unsafe { raw.u.CreateProcessInfo };
            let image_path = image_path_from_handle(info.hFile);
            close_file_handle(info.hFile);
            DebugEventPayload::CreateProcess {
                image_base: Address::new(info.lpBaseOfImage as u64),
                start_address: info
                    .lpStartAddress
                    .map_or(Address::ZERO, |entry| Address::new(entry as usize as u64)),
                image_path,
            }
        }
        CREATE_THREAD_DEBUG_EVENT => {
            let info = unsafe { raw.u.CreateThread };
            DebugEventPayload::CreateThread {
                start_address: info
                    .lpStartAddress
                    .map_or(Address::ZERO, |entry| Address::new(entry as usize as u64)),
            }
        }
        EXIT_PROCESS_DEBUG_EVENT => {
            let info = unsafe { raw.u.ExitProcess };
            DebugEventPayload::ExitProcess {
                exit_code: info.dwExitCode,
            }
        }
        EXIT_THREAD_DEBUG_EVENT => {
            let info = unsafe { raw.u.ExitThread };
            DebugEventPayload::ExitThread {
                exit_code: info.dwExitCode,
            }
        }
        LOAD_DLL_DEBUG_EVENT => {
            let info = unsafe { raw.u.LoadDll };
            let image_path = image_path_from_handle(info.hFile);
            close_file_handle(info.hFile);
            DebugEventPayload::LoadModule {
                base: Address::new(info.lpBaseOfDll as u64),
                image_path,
            }
        }
        UNLOAD_DLL_DEBUG_EVENT => {
            let info = unsafe { raw.u.UnloadDll };
            DebugEventPayload::UnloadModule {
                base: Address::new(info.lpBaseOfDll as u64),
            }
        }
        OUTPUT_DEBUG_STRING_EVENT => {
            let info = unsafe { raw.u.DebugString };
            DebugEventPayload::OutputString {
                address: Address::new(info.lpDebugStringData.0 as u64),
                length: usize::from(info.nDebugStringLength),
                wide: info.fUnicode != 0,
            }
        }
        RIP_EVENT => {
            let info = unsafe { raw.u.RipInfo };
            DebugEventPayload::Rip {
                error: info.dwError,
                kind: info.dwType.0,
            }
        }
        other => DebugEventPayload::Unknown {
            code: other.0,
        },
    };
    DebugEvent {
        process: ProcessId(raw.dwProcessId),
        thread: ThreadId(raw.dwThreadId),
        payload,
    }
}

/// Recover the file path behind an image handle, normalized to a plain
/// drive-letter path.
fn image_path_from_handle(file: HANDLE) -> Option<String>
{
    if file.is_invalid() {
        return None;
    }
    let mut buf = [0u16; 1024];
    let len = unsafe { GetFinalPathNameByHandleW(file, &mut buf, VOLUME_NAME_DOS) };
    let len = len as usize;
    if len == 0 || len > buf.len() {
        return None;
    }
    let path = String::from_utf16_lossy(&buf[..len]);
    Some(path.trim_start_matches(r"\\?\").to_owned())
}

/// The debugger owns the image file handles the OS attaches to process-
/// and module-load events.
fn close_file_handle(file: HANDLE)
{
    if !file.is_invalid() {
        unsafe {
            let _ = CloseHandle(file);
        }
    }
}
