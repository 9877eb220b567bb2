//! Windows debugging implementation over the Win32 debug facility.
//!
//! Windows exposes debugging as a per-thread event pump: the thread that
//! called `DebugActiveProcess` waits on `WaitForDebugEvent`, the OS
//! suspends the target at each event, and `ContinueDebugEvent` resumes it
//! with a disposition. The engine's event loop maps directly onto this
//! pump.
//!
//! ## Key Win32 APIs used
//!
//! - `DebugActiveProcess` / `DebugActiveProcessStop`: attach and detach
//! - `WaitForDebugEvent` / `ContinueDebugEvent`: the event pump
//! - `ReadProcessMemory` / `WriteProcessMemory` / `VirtualProtectEx`:
//!   target memory and page protection
//! - `GetThreadContext` / `SetThreadContext`: register contexts
//! - DbgHelp (`SymInitializeW`, `SymEnumSymbolsW`, `SymFromAddrW`, ...):
//!   symbol enumeration and name resolution
//!
//! ## Thread affinity
//!
//! The OS binds the debugger role to the thread that attached; wait,
//! continue and detach must all come from that thread. The engine honors
//! this by driving [`WindowsEventSource`] only from its event loop.
//!
//! ## References
//!
//! - [Debugging Events](https://learn.microsoft.com/en-us/windows/win32/debug/debugging-events)
//! - [DbgHelp Functions](https://learn.microsoft.com/en-us/windows/win32/debug/dbghelp-functions)

pub mod events;
pub mod process;
pub mod symbols;

pub use events::WindowsEventSource;
pub use process::WindowsProcess;
pub use symbols::DbgHelpSymbols;
