//! Breakpoint bookkeeping and the byte-patching lifecycle.
//!
//! A breakpoint owns its patch state: the saved original byte and the
//! enabled flag. The table tracks at most one breakpoint per address and
//! leaves memory-protection handling to the engine, which relaxes and
//! restores page protection around enable/disable calls.

use std::collections::BTreeMap;

use crate::error::{DebuggerError, Result};
use crate::target::ProcessMemory;
use crate::types::Address;

/// Opcode patched over the first instruction byte while a software
/// breakpoint is enabled (INT3).
pub const TRAP_OPCODE: u8 = 0xCC;

/// Breakpoint mechanism discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointKind
{
    /// Trap-instruction patch in target memory.
    Software,
    /// CPU debug registers. Reserved; not installable yet.
    Hardware,
}

/// Mechanism-specific breakpoint state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointPayload
{
    /// Byte-patching breakpoint.
    SoftwareInterrupt
    {
        /// Original first byte of the patched instruction. `None` until
        /// the first enable captures it.
        saved_byte: Option<u8>,
    },
    /// Debug-register breakpoint. Carries no state until installation is
    /// supported.
    Hardware,
}

/// One breakpoint and its patch state.
///
/// Two breakpoints are equal when they share a kind and an address;
/// enabled state, hit counts, and saved bytes do not participate.
#[derive(Debug, Clone)]
pub struct Breakpoint
{
    address: Address,
    enabled: bool,
    hits: u64,
    payload: BreakpointPayload,
}

impl Breakpoint
{
    /// New disabled software breakpoint at `address`.
    #[must_use]
    pub const fn new_interrupt(address: Address) -> Self
    {
        Self {
            address,
            enabled: false,
            hits: 0,
            payload: BreakpointPayload::SoftwareInterrupt { saved_byte: None },
        }
    }

    /// New disabled hardware breakpoint at `address`. Enabling one fails
    /// until debug-register support lands.
    #[must_use]
    pub const fn new_hardware(address: Address) -> Self
    {
        Self {
            address,
            enabled: false,
            hits: 0,
            payload: BreakpointPayload::Hardware,
        }
    }

    /// Address the breakpoint traps at.
    #[must_use]
    pub const fn address(&self) -> Address
    {
        self.address
    }

    /// Whether the trap is currently installed.
    #[must_use]
    pub const fn is_enabled(&self) -> bool
    {
        self.enabled
    }

    /// Times this breakpoint has been hit.
    #[must_use]
    pub const fn hits(&self) -> u64
    {
        self.hits
    }

    /// Mechanism discriminant.
    #[must_use]
    pub const fn kind(&self) -> BreakpointKind
    {
        match self.payload {
            BreakpointPayload::SoftwareInterrupt { .. } => BreakpointKind::Software,
            BreakpointPayload::Hardware => BreakpointKind::Hardware,
        }
    }

    /// Original byte hidden by the trap opcode, once captured.
    #[must_use]
    pub const fn saved_byte(&self) -> Option<u8>
    {
        match self.payload {
            BreakpointPayload::SoftwareInterrupt { saved_byte } => saved_byte,
            BreakpointPayload::Hardware => None,
        }
    }

    /// Count a hit and return the new total.
    pub fn record_hit(&mut self) -> u64
    {
        self.hits = self.hits.saturating_add(1);
        self.hits
    }

    /// Install the trap.
    ///
    /// Already enabled is a no-op. The original byte is read and saved,
    /// then the trap opcode is written; the enabled flag flips only after
    /// the write succeeded, so a failed enable leaves the breakpoint
    /// disabled and memory unpatched.
    pub fn enable(&mut self, memory: &dyn ProcessMemory) -> Result<()>
    {
        if self.enabled {
            return Ok(());
        }
        match &mut self.payload {
            BreakpointPayload::SoftwareInterrupt { saved_byte } => {
                let mut original = [0u8; 1];
                memory.read_memory(self.address, &mut original)?;
                memory.write_memory(self.address, &[TRAP_OPCODE])?;
                *saved_byte = Some(original[0]);
            }
            BreakpointPayload::Hardware => {
                return Err(DebuggerError::Unsupported("hardware breakpoints"));
            }
        }
        self.enabled = true;
        Ok(())
    }

    /// Remove the trap and restore the saved byte.
    ///
    /// Already disabled is a no-op. The enabled flag flips only after the
    /// restore succeeded.
    pub fn disable(&mut self, memory: &dyn ProcessMemory) -> Result<()>
    {
        if !self.enabled {
            return Ok(());
        }
        if let BreakpointPayload::SoftwareInterrupt {
            saved_byte: Some(byte),
        } = self.payload
        {
            memory.write_memory(self.address, &[byte])?;
        }
        self.enabled = false;
        Ok(())
    }

    /// Point the breakpoint at a new address.
    ///
    /// Target memory is untouched; callers disable first and re-enable at
    /// the new location. The saved byte belongs to the old address, so it
    /// is discarded.
    pub fn relocate(&mut self, address: Address)
    {
        self.address = address;
        if let BreakpointPayload::SoftwareInterrupt { saved_byte } = &mut self.payload {
            *saved_byte = None;
        }
    }
}

impl PartialEq for Breakpoint
{
    fn eq(&self, other: &Self) -> bool
    {
        self.kind() == other.kind() && self.address == other.address
    }
}

impl Eq for Breakpoint {}

/// Snapshot of one breakpoint for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointInfo
{
    /// Breakpoint address.
    pub address: Address,
    /// Whether the trap is installed.
    pub enabled: bool,
    /// Times the breakpoint has been hit.
    pub hits: u64,
}

impl From<&Breakpoint> for BreakpointInfo
{
    fn from(breakpoint: &Breakpoint) -> Self
    {
        Self {
            address: breakpoint.address(),
            enabled: breakpoint.is_enabled(),
            hits: breakpoint.hits(),
        }
    }
}

/// User breakpoints, at most one per address.
///
/// The engine's internal step point lives outside the table, so listings
/// never show it and users cannot collide with it.
#[derive(Debug, Default)]
pub struct BreakpointTable
{
    entries: BTreeMap<Address, Breakpoint>,
}

impl BreakpointTable
{
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Whether a breakpoint exists at `address`.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool
    {
        self.entries.contains_key(&address)
    }

    /// Insert a breakpoint, rejecting a second one at the same address.
    pub fn insert(&mut self, breakpoint: Breakpoint) -> Result<()>
    {
        let address = breakpoint.address();
        if self.entries.contains_key(&address) {
            return Err(DebuggerError::DuplicateBreakpoint(address.value()));
        }
        self.entries.insert(address, breakpoint);
        Ok(())
    }

    /// Remove and return the breakpoint at `address`, if any.
    pub fn remove(&mut self, address: Address) -> Option<Breakpoint>
    {
        self.entries.remove(&address)
    }

    /// Breakpoint at `address`, if any.
    #[must_use]
    pub fn get(&self, address: Address) -> Option<&Breakpoint>
    {
        self.entries.get(&address)
    }

    /// Mutable breakpoint at `address`, if any.
    pub fn get_mut(&mut self, address: Address) -> Option<&mut Breakpoint>
    {
        self.entries.get_mut(&address)
    }

    /// Number of breakpoints in the table.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Snapshot of every breakpoint, ordered by address.
    #[must_use]
    pub fn list(&self) -> Vec<BreakpointInfo>
    {
        self.entries.values().map(BreakpointInfo::from).collect()
    }

    /// Iterate the breakpoints in address order.
    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint>
    {
        self.entries.values()
    }
}
