//! Platform bindings for the engine's target seams.
//!
//! The engine itself is platform-neutral: it talks to the target through
//! the [`TargetProcess`](crate::target::TargetProcess),
//! [`DebugEventSource`](crate::target::DebugEventSource) and
//! [`SymbolBackend`](crate::symbols::SymbolBackend) traits. This module
//! supplies the native implementations of those seams:
//!
//! - **Windows (x86-64)**: the Win32 debug facility (`DebugActiveProcess`,
//!   `WaitForDebugEvent`, `ContinueDebugEvent`), the virtual-memory and
//!   thread-context APIs, and DbgHelp for symbols.
//!
//! Other platforms have no native binding; [`native_session`] reports
//! [`DebuggerError::UnsupportedPlatform`] there. The portable engine and
//! its test doubles still build everywhere.

#[cfg(all(target_os = "windows", target_arch = "x86_64"))]
pub mod windows;

use crate::debugger::{Debugger, SessionOptions};
use crate::error::Result;
use crate::types::ProcessId;

/// Builds a debug session over the native debug facility of this platform.
///
/// Opens the target process, wires up the native event source, the x86-64
/// instruction decoder, and the symbol backend, and hands back an engine
/// ready for [`Debugger::run`]. A symbol backend that fails to initialize
/// is skipped with a warning; debugging works without one, just without
/// names.
///
/// # Errors
///
/// Returns [`DebuggerError::AttachFailed`](crate::error::DebuggerError)
/// when the target process cannot be opened, and
/// [`DebuggerError::UnsupportedPlatform`](crate::error::DebuggerError) on
/// platforms without a native binding.
#[cfg(all(target_os = "windows", target_arch = "x86_64"))]
pub fn native_session(process: ProcessId, options: SessionOptions) -> Result<Debugger>
{
    use tracing::warn;

    use crate::decoder::X86Decoder;
    use crate::symbols::SymbolBackend;

    let target = windows::WindowsProcess::open(process)?;
    let backend: Option<Box<dyn SymbolBackend>> =
        match windows::DbgHelpSymbols::new(target.raw_handle()) {
            Ok(backend) => Some(Box::new(backend)),
            Err(error) => {
                warn!(%error, "Symbol backend unavailable; continuing without names");
                None
            }
        };
    Ok(Debugger::new(
        Box::new(target),
        Box::new(windows::WindowsEventSource::new()),
        Box::new(X86Decoder),
        backend,
        options,
    ))
}

/// Builds a debug session over the native debug facility of this platform.
///
/// This platform has no native binding.
///
/// # Errors
///
/// Always returns
/// [`DebuggerError::UnsupportedPlatform`](crate::error::DebuggerError).
#[cfg(not(all(target_os = "windows", target_arch = "x86_64")))]
pub fn native_session(_process: ProcessId, _options: SessionOptions) -> Result<Debugger>
{
    Err(crate::error::DebuggerError::UnsupportedPlatform)
}
