//! # Types
//!
//! Platform-agnostic types used throughout the debugger engine.
//!
//! These types keep the engine's core logic independent of the OS debug
//! facility: addresses, process/thread identifiers, continuation
//! dispositions, and register snapshots are all expressed here and
//! translated at the platform boundary.

pub mod address;
pub mod process;
pub mod registers;

// Re-export all public types
pub use address::Address;
pub use process::{ContinueStatus, ProcessId, ThreadId};
pub use registers::{CpuContext, RegisterId, UnknownRegister, TRAP_FLAG};
