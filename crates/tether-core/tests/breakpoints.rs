//! Tests for breakpoint patch state and the breakpoint table.

mod common;

use common::FakeProcess;
use tether_core::breakpoints::{
    Breakpoint, BreakpointInfo, BreakpointKind, BreakpointTable, TRAP_OPCODE,
};
use tether_core::error::DebuggerError;
use tether_core::types::Address;

fn target() -> FakeProcess
{
    FakeProcess::new(Address::new(0x1000), (0..64).map(|i| i as u8).collect())
}

#[test]
fn test_enable_patches_the_trap_byte()
{
    let memory = target();
    let address = Address::new(0x1010);
    let mut breakpoint = Breakpoint::new_interrupt(address);

    assert!(!breakpoint.is_enabled());
    assert_eq!(breakpoint.saved_byte(), None);

    breakpoint.enable(&memory).unwrap();
    assert!(breakpoint.is_enabled());
    assert_eq!(breakpoint.saved_byte(), Some(0x10));
    assert_eq!(memory.byte_at(address), TRAP_OPCODE);
}

#[test]
fn test_disable_restores_the_original_byte()
{
    let memory = target();
    let address = Address::new(0x1010);
    let mut breakpoint = Breakpoint::new_interrupt(address);

    breakpoint.enable(&memory).unwrap();
    breakpoint.disable(&memory).unwrap();

    assert!(!breakpoint.is_enabled());
    assert_eq!(memory.byte_at(address), 0x10);
    // The saved byte survives for the next enable.
    assert_eq!(breakpoint.saved_byte(), Some(0x10));
}

#[test]
fn test_enable_twice_keeps_the_first_saved_byte()
{
    let memory = target();
    let address = Address::new(0x1010);
    let mut breakpoint = Breakpoint::new_interrupt(address);

    breakpoint.enable(&memory).unwrap();
    // A second enable must not read the trap byte back as the original.
    breakpoint.enable(&memory).unwrap();
    assert_eq!(breakpoint.saved_byte(), Some(0x10));

    breakpoint.disable(&memory).unwrap();
    assert_eq!(memory.byte_at(address), 0x10);
}

#[test]
fn test_disable_when_disabled_is_a_no_op()
{
    let memory = target();
    let address = Address::new(0x1010);
    let mut breakpoint = Breakpoint::new_interrupt(address);

    breakpoint.disable(&memory).unwrap();
    assert!(!breakpoint.is_enabled());
    assert_eq!(memory.byte_at(address), 0x10);
}

#[test]
fn test_failed_enable_leaves_the_breakpoint_disabled()
{
    let memory = target();
    // Outside the mapped image, so the original byte cannot be read.
    let mut breakpoint = Breakpoint::new_interrupt(Address::new(0x9000));

    match breakpoint.enable(&memory) {
        Err(DebuggerError::MemoryRead { address, .. }) => assert_eq!(address, 0x9000),
        other => panic!("Expected MemoryRead, got {other:?}"),
    }
    assert!(!breakpoint.is_enabled());
    assert_eq!(breakpoint.saved_byte(), None);
}

#[test]
fn test_hardware_breakpoints_cannot_be_enabled()
{
    let memory = target();
    let mut breakpoint = Breakpoint::new_hardware(Address::new(0x1010));

    assert_eq!(breakpoint.kind(), BreakpointKind::Hardware);
    match breakpoint.enable(&memory) {
        Err(DebuggerError::Unsupported(what)) => assert!(what.contains("hardware")),
        other => panic!("Expected Unsupported, got {other:?}"),
    }
    assert!(!breakpoint.is_enabled());
    assert_eq!(memory.byte_at(Address::new(0x1010)), 0x10);
}

#[test]
fn test_relocate_discards_the_saved_byte()
{
    let memory = target();
    let mut breakpoint = Breakpoint::new_interrupt(Address::new(0x1010));

    breakpoint.enable(&memory).unwrap();
    breakpoint.disable(&memory).unwrap();
    breakpoint.relocate(Address::new(0x1020));

    assert_eq!(breakpoint.address(), Address::new(0x1020));
    // The old saved byte belongs to the old address.
    assert_eq!(breakpoint.saved_byte(), None);

    breakpoint.enable(&memory).unwrap();
    assert_eq!(breakpoint.saved_byte(), Some(0x20));
    assert_eq!(memory.byte_at(Address::new(0x1020)), TRAP_OPCODE);
    assert_eq!(memory.byte_at(Address::new(0x1010)), 0x10);
}

#[test]
fn test_record_hit_counts_up()
{
    let mut breakpoint = Breakpoint::new_interrupt(Address::new(0x1010));
    assert_eq!(breakpoint.hits(), 0);
    assert_eq!(breakpoint.record_hit(), 1);
    assert_eq!(breakpoint.record_hit(), 2);
    assert_eq!(breakpoint.hits(), 2);
}

#[test]
fn test_equality_ignores_patch_state()
{
    let memory = target();
    let mut enabled = Breakpoint::new_interrupt(Address::new(0x1010));
    enabled.enable(&memory).unwrap();
    enabled.record_hit();

    let fresh = Breakpoint::new_interrupt(Address::new(0x1010));
    assert_eq!(enabled, fresh);

    let elsewhere = Breakpoint::new_interrupt(Address::new(0x1020));
    assert_ne!(fresh, elsewhere);

    let hardware = Breakpoint::new_hardware(Address::new(0x1010));
    assert_ne!(fresh, hardware);
}

#[test]
fn test_info_snapshots_the_breakpoint()
{
    let memory = target();
    let mut breakpoint = Breakpoint::new_interrupt(Address::new(0x1010));
    breakpoint.enable(&memory).unwrap();
    breakpoint.record_hit();

    let info = BreakpointInfo::from(&breakpoint);
    assert_eq!(info.address, Address::new(0x1010));
    assert!(info.enabled);
    assert_eq!(info.hits, 1);
}

#[test]
fn test_table_rejects_a_duplicate_address()
{
    let mut table = BreakpointTable::new();
    table.insert(Breakpoint::new_interrupt(Address::new(0x1010))).unwrap();

    match table.insert(Breakpoint::new_interrupt(Address::new(0x1010))) {
        Err(DebuggerError::DuplicateBreakpoint(address)) => assert_eq!(address, 0x1010),
        other => panic!("Expected DuplicateBreakpoint, got {other:?}"),
    }
    assert_eq!(table.len(), 1);
}

#[test]
fn test_table_lists_in_address_order()
{
    let mut table = BreakpointTable::new();
    table.insert(Breakpoint::new_interrupt(Address::new(0x3000))).unwrap();
    table.insert(Breakpoint::new_interrupt(Address::new(0x1000))).unwrap();
    table.insert(Breakpoint::new_interrupt(Address::new(0x2000))).unwrap();

    let addresses: Vec<u64> = table.list().iter().map(|info| info.address.value()).collect();
    assert_eq!(addresses, vec![0x1000, 0x2000, 0x3000]);

    let iterated: Vec<u64> = table.iter().map(|bp| bp.address().value()).collect();
    assert_eq!(iterated, addresses);
}

#[test]
fn test_table_remove_and_contains()
{
    let mut table = BreakpointTable::new();
    assert!(table.is_empty());

    table.insert(Breakpoint::new_interrupt(Address::new(0x1010))).unwrap();
    assert!(table.contains(Address::new(0x1010)));
    assert!(!table.contains(Address::new(0x1020)));
    assert!(table.get(Address::new(0x1010)).is_some());

    let removed = table.remove(Address::new(0x1010)).unwrap();
    assert_eq!(removed.address(), Address::new(0x1010));
    assert!(table.remove(Address::new(0x1010)).is_none());
    assert!(table.is_empty());
}

#[test]
fn test_trap_opcode_is_int3()
{
    assert_eq!(TRAP_OPCODE, 0xCC);
}
