//! CPU register context snapshots for x86-64 targets.

use std::fmt;
use std::str::FromStr;

use super::Address;

/// Trap flag bit in `RFLAGS`.
///
/// While set, the CPU raises a single-step exception after the next
/// instruction retires. The engine sets it on every breakpoint hit so the
/// instruction at the breakpoint address executes once before the
/// breakpoint byte is written back.
pub const TRAP_FLAG: u64 = 0x100;

/// Identifier for an x86-64 user-visible register.
///
/// Covers the sixteen general-purpose registers plus the instruction
/// pointer and the flags register. Parse one from user input with
/// [`RegisterId::from_name`] (case-insensitive) and read it back with
/// [`CpuContext::get`].
///
/// ## Example
///
/// ```rust
/// use tether_core::types::RegisterId;
///
/// assert_eq!(RegisterId::from_name("RIP"), Some(RegisterId::Rip));
/// assert_eq!(RegisterId::Rax.to_string(), "rax");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterId
{
    /// RAX - accumulator (return values)
    Rax,
    /// RBX - base register
    Rbx,
    /// RCX - counter register
    Rcx,
    /// RDX - data register
    Rdx,
    /// RSI - source index
    Rsi,
    /// RDI - destination index
    Rdi,
    /// RBP - frame base pointer
    Rbp,
    /// RSP - stack pointer
    Rsp,
    /// R8 - general purpose (x86-64 extension)
    R8,
    /// R9 - general purpose (x86-64 extension)
    R9,
    /// R10 - general purpose (x86-64 extension)
    R10,
    /// R11 - general purpose (x86-64 extension)
    R11,
    /// R12 - general purpose (x86-64 extension)
    R12,
    /// R13 - general purpose (x86-64 extension)
    R13,
    /// R14 - general purpose (x86-64 extension)
    R14,
    /// R15 - general purpose (x86-64 extension)
    R15,
    /// RIP - instruction pointer
    Rip,
    /// RFLAGS - status flags
    Rflags,
}

impl RegisterId
{
    /// Every register id, in conventional dump order.
    pub const ALL: [RegisterId; 18] = [
        RegisterId::Rax,
        RegisterId::Rbx,
        RegisterId::Rcx,
        RegisterId::Rdx,
        RegisterId::Rsi,
        RegisterId::Rdi,
        RegisterId::Rbp,
        RegisterId::Rsp,
        RegisterId::R8,
        RegisterId::R9,
        RegisterId::R10,
        RegisterId::R11,
        RegisterId::R12,
        RegisterId::R13,
        RegisterId::R14,
        RegisterId::R15,
        RegisterId::Rip,
        RegisterId::Rflags,
    ];

    /// Lowercase conventional name (`"rax"`, `"rip"`, ...).
    #[must_use]
    pub const fn name(self) -> &'static str
    {
        match self {
            RegisterId::Rax => "rax",
            RegisterId::Rbx => "rbx",
            RegisterId::Rcx => "rcx",
            RegisterId::Rdx => "rdx",
            RegisterId::Rsi => "rsi",
            RegisterId::Rdi => "rdi",
            RegisterId::Rbp => "rbp",
            RegisterId::Rsp => "rsp",
            RegisterId::R8 => "r8",
            RegisterId::R9 => "r9",
            RegisterId::R10 => "r10",
            RegisterId::R11 => "r11",
            RegisterId::R12 => "r12",
            RegisterId::R13 => "r13",
            RegisterId::R14 => "r14",
            RegisterId::R15 => "r15",
            RegisterId::Rip => "rip",
            RegisterId::Rflags => "rflags",
        }
    }

    /// Look a register up by name, case-insensitively.
    ///
    /// Returns `None` when the name matches no x86-64 register.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self>
    {
        let lowered = name.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|id| id.name() == lowered.as_str())
    }
}

impl fmt::Display for RegisterId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unrecognized register name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRegister(pub String);

impl fmt::Display for UnknownRegister
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "Unknown register name: {}", self.0)
    }
}

impl std::error::Error for UnknownRegister {}

impl FromStr for RegisterId
{
    type Err = UnknownRegister;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        Self::from_name(s).ok_or_else(|| UnknownRegister(s.to_owned()))
    }
}

/// Snapshot of one thread's user-visible x86-64 registers.
///
/// The engine refreshes the snapshot from the OS whenever an event selects
/// a new executing thread, mutates it locally (instruction pointer rewind,
/// trap flag), and writes it back before the thread resumes. The snapshot
/// therefore always reflects the state the thread will resume with, not
/// necessarily the state it stopped with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuContext
{
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    pub rflags: u64,
}

impl CpuContext
{
    /// Address of the next instruction the thread will execute.
    #[must_use]
    pub const fn instruction_pointer(&self) -> Address
    {
        Address::new(self.rip)
    }

    /// Redirect execution to `address` when the thread resumes.
    pub fn set_instruction_pointer(&mut self, address: Address)
    {
        self.rip = address.value();
    }

    /// Current top of the thread's stack.
    #[must_use]
    pub const fn stack_pointer(&self) -> Address
    {
        Address::new(self.rsp)
    }

    /// Base of the current stack frame.
    #[must_use]
    pub const fn frame_pointer(&self) -> Address
    {
        Address::new(self.rbp)
    }

    /// Whether the trap flag is set in `RFLAGS`.
    #[must_use]
    pub const fn trap_flag(&self) -> bool
    {
        self.rflags & TRAP_FLAG != 0
    }

    /// Arm single-stepping: the next instruction raises a single-step
    /// exception after it retires.
    pub fn set_trap_flag(&mut self)
    {
        self.rflags |= TRAP_FLAG;
    }

    /// Disarm single-stepping.
    pub fn clear_trap_flag(&mut self)
    {
        self.rflags &= !TRAP_FLAG;
    }

    /// Read a register by id.
    #[must_use]
    pub const fn get(&self, id: RegisterId) -> u64
    {
        match id {
            RegisterId::Rax => self.rax,
            RegisterId::Rbx => self.rbx,
            RegisterId::Rcx => self.rcx,
            RegisterId::Rdx => self.rdx,
            RegisterId::Rsi => self.rsi,
            RegisterId::Rdi => self.rdi,
            RegisterId::Rbp => self.rbp,
            RegisterId::Rsp => self.rsp,
            RegisterId::R8 => self.r8,
            RegisterId::R9 => self.r9,
            RegisterId::R10 => self.r10,
            RegisterId::R11 => self.r11,
            RegisterId::R12 => self.r12,
            RegisterId::R13 => self.r13,
            RegisterId::R14 => self.r14,
            RegisterId::R15 => self.r15,
            RegisterId::Rip => self.rip,
            RegisterId::Rflags => self.rflags,
        }
    }

    /// Write a register by id. The change reaches the target thread the
    /// next time the snapshot is flushed back to the OS.
    pub fn set(&mut self, id: RegisterId, value: u64)
    {
        match id {
            RegisterId::Rax => self.rax = value,
            RegisterId::Rbx => self.rbx = value,
            RegisterId::Rcx => self.rcx = value,
            RegisterId::Rdx => self.rdx = value,
            RegisterId::Rsi => self.rsi = value,
            RegisterId::Rdi => self.rdi = value,
            RegisterId::Rbp => self.rbp = value,
            RegisterId::Rsp => self.rsp = value,
            RegisterId::R8 => self.r8 = value,
            RegisterId::R9 => self.r9 = value,
            RegisterId::R10 => self.r10 = value,
            RegisterId::R11 => self.r11 = value,
            RegisterId::R12 => self.r12 = value,
            RegisterId::R13 => self.r13 = value,
            RegisterId::R14 => self.r14 = value,
            RegisterId::R15 => self.r15 = value,
            RegisterId::Rip => self.rip = value,
            RegisterId::Rflags => self.rflags = value,
        }
    }
}

impl fmt::Display for CpuContext
{
    /// Conventional register dump, three columns per row.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        for (index, id) in RegisterId::ALL.into_iter().enumerate() {
            if index > 0 {
                if index % 3 == 0 {
                    writeln!(f)?;
                } else {
                    write!(f, "  ")?;
                }
            }
            write!(f, "{:>6} 0x{:016x}", id.name(), self.get(id))?;
        }
        Ok(())
    }
}
