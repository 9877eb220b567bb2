//! Common module for library exports

pub use crate::breakpoints::{Breakpoint, BreakpointInfo, BreakpointKind};
pub use crate::debugger::{Debugger, EventHandler, SessionOptions};
pub use crate::error::{DebuggerError, Result};
pub use crate::events::{DebugEvent, DebugEventKind, ExceptionCode, SessionEvent};
pub use crate::platform::native_session;
pub use crate::symbols::{ModuleInfo, ResolvedSymbol, Symbol};
pub use crate::types::address::Address;
pub use crate::types::process::{ContinueStatus, ProcessId, ThreadId};
pub use crate::types::registers::{CpuContext, RegisterId, TRAP_FLAG};
