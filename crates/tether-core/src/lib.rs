//! # tether-core
//!
//! Debug engine for Tether: process control, breakpoints, stepping and
//! symbol resolution over a pluggable platform layer.
//!
//! This crate provides the foundational debugging capabilities, including:
//! - Attaching to a running process and pumping its debug events
//! - Software breakpoints with trap-byte patching and transparent re-arm
//! - Single-step and step-over execution control
//! - Register and memory inspection, disassembly and stack walking
//! - Module tracking with symbol name and source-line resolution
//!
//! ## Platform Support
//!
//! - **Windows (x86-64)**: Uses the Win32 debug facility
//!   (`WaitForDebugEvent`, `ContinueDebugEvent`, etc.) and DbgHelp
//! - **Linux**: Will use `ptrace` (future)
//! - **macOS**: Will use Mach APIs (future)
//!
//! The engine itself is platform-neutral and talks to the target through
//! the traits in [`target`] and [`symbols`]; only [`platform`] touches the
//! operating system.
//!
//! ## Why unsafe code is needed
//!
//! This crate requires `unsafe` code because we're calling low-level system APIs
//! that interact directly with the kernel. These APIs are inherently unsafe
//! because they can:
//! - Access memory of other processes
//! - Modify thread state behind the scheduler's back
//! - Bypass normal Rust safety guarantees
//!
//! We wrap these unsafe calls in safe abstractions, but the underlying system
//! calls themselves must be `unsafe`.

#![allow(unsafe_code)] // Required for low-level system APIs (Win32 debug, DbgHelp)

pub mod breakpoints;
pub mod debugger;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod platform;
pub mod prelude;
pub mod stack;
pub mod symbols;
pub mod sync;
pub mod target;
pub mod types;

pub use debugger::{Debugger, SessionOptions};
// Re-export commonly used types
pub use error::{DebuggerError, Result};
pub use platform::native_session;
pub use types::{Address, CpuContext, ProcessId, ThreadId};
