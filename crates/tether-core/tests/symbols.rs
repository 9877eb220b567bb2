//! Tests for the symbol store and frame-pointer stack walking.

mod common;

use common::{symbol, CannedSymbols, FakeProcess};
use tether_core::stack::{walk_stack, FrameSymbol, MAX_FRAMES};
use tether_core::symbols::{ModuleRecord, SymbolStore};
use tether_core::types::{Address, CpuContext};

fn sample_module(base: u64, name: &str, symbols: Vec<(&str, u64)>) -> ModuleRecord
{
    ModuleRecord {
        base: Address::new(base),
        name: name.to_owned(),
        symbols: symbols
            .into_iter()
            .map(|(symbol_name, address)| symbol(symbol_name, address, base))
            .collect(),
    }
}

#[test]
fn test_store_finds_symbols_by_name_and_address()
{
    let mut store = SymbolStore::new();
    store.insert_module(sample_module(
        0x1000,
        "app.exe",
        vec![("main", 0x1040), ("render", 0x1100)],
    ));

    let by_name = store.find_by_name("render").unwrap();
    assert_eq!(by_name.address, Address::new(0x1100));
    assert_eq!(by_name.module_base, Address::new(0x1000));

    let by_address = store.find_by_address(Address::new(0x1040)).unwrap();
    assert_eq!(by_address.name, "main");

    assert!(store.find_by_name("missing").is_none());
    // Lookups are exact match; near misses go to the live backend.
    assert!(store.find_by_address(Address::new(0x1041)).is_none());
}

#[test]
fn test_store_prefers_the_lowest_module_base()
{
    let mut store = SymbolStore::new();
    // Inserted high module first; lookup order follows base order anyway.
    store.insert_module(sample_module(0x2000, "late.dll", vec![("dup", 0x2100)]));
    store.insert_module(sample_module(0x1000, "early.dll", vec![("dup", 0x1040)]));

    let found = store.find_by_name("dup").unwrap();
    assert_eq!(found.address, Address::new(0x1040));
}

#[test]
fn test_store_replaces_a_remapped_module()
{
    let mut store = SymbolStore::new();
    store.insert_module(sample_module(
        0x1000,
        "app.exe",
        vec![("one", 0x1010), ("two", 0x1020)],
    ));
    assert_eq!(store.symbol_count(), 2);

    store.insert_module(sample_module(0x1000, "app.exe", vec![("three", 0x1030)]));
    assert_eq!(store.module_count(), 1);
    assert_eq!(store.symbol_count(), 1);
    assert!(store.find_by_name("one").is_none());
    assert!(store.find_by_name("three").is_some());
}

#[test]
fn test_store_remove_returns_the_record()
{
    let mut store = SymbolStore::new();
    store.insert_module(sample_module(0x1000, "app.exe", vec![("main", 0x1040)]));

    let removed = store.remove_module(Address::new(0x1000)).unwrap();
    assert_eq!(removed.name, "app.exe");
    assert!(store.module(Address::new(0x1000)).is_none());
    assert!(store.remove_module(Address::new(0x1000)).is_none());
    assert_eq!(store.module_count(), 0);
}

#[test]
fn test_store_lists_modules_in_base_order()
{
    let mut store = SymbolStore::new();
    store.insert_module(sample_module(0x3000, "c.dll", vec![]));
    store.insert_module(sample_module(0x1000, "a.exe", vec![("main", 0x1040)]));
    store.insert_module(sample_module(0x2000, "b.dll", vec![("fn1", 0x2010), ("fn2", 0x2020)]));

    let listing = store.list_modules();
    let names: Vec<&str> = listing.iter().map(|module| module.name.as_str()).collect();
    assert_eq!(names, vec!["a.exe", "b.dll", "c.dll"]);
    assert_eq!(listing[0].symbols, 1);
    assert_eq!(listing[1].symbols, 2);
    assert_eq!(listing[2].symbols, 0);
    assert_eq!(store.symbol_count(), 3);
}

fn put_u64(image: &mut [u8], offset: usize, value: u64)
{
    image[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn stack_context(rip: u64, rbp: u64) -> CpuContext
{
    CpuContext {
        rip,
        rbp,
        rsp: rbp.wrapping_sub(0x10),
        ..CpuContext::default()
    }
}

#[test]
fn test_walk_follows_the_frame_chain()
{
    // Three linked frames; the chain ends on a zero return address.
    let mut image = vec![0u8; 0x100];
    put_u64(&mut image, 0x10, 0x7040);
    put_u64(&mut image, 0x18, 0x1105);
    put_u64(&mut image, 0x40, 0x7080);
    put_u64(&mut image, 0x48, 0x0500);
    put_u64(&mut image, 0x80, 0x70f0);
    put_u64(&mut image, 0x88, 0);
    let memory = FakeProcess::new(Address::new(0x7000), image);

    let mut store = SymbolStore::new();
    store.insert_module(sample_module(0x1000, "app.exe", vec![("render_frame", 0x1100)]));
    let backend = CannedSymbols::new(vec![symbol("render_frame", 0x1100, 0x1000)]);

    let context = stack_context(0x1100, 0x7010);
    let frames = walk_stack(&memory, &context, &store, Some(&backend), MAX_FRAMES);

    assert_eq!(frames.len(), 3);

    assert_eq!(frames[0].index, 0);
    assert_eq!(frames[0].pc, Address::new(0x1100));
    assert_eq!(frames[0].frame, Address::new(0x7010));
    // Exact store hit.
    assert_eq!(
        frames[0].symbol,
        Some(FrameSymbol {
            name: "render_frame".to_owned(),
            displacement: 0,
        })
    );

    assert_eq!(frames[1].pc, Address::new(0x1105));
    assert_eq!(frames[1].frame, Address::new(0x7040));
    // Store miss, nearest-symbol backend answer.
    assert_eq!(
        frames[1].symbol,
        Some(FrameSymbol {
            name: "render_frame".to_owned(),
            displacement: 5,
        })
    );

    // Below every known symbol; the frame is still reported.
    assert_eq!(frames[2].pc, Address::new(0x0500));
    assert!(frames[2].symbol.is_none());
}

#[test]
fn test_walk_stops_on_a_null_frame_pointer()
{
    let memory = FakeProcess::new(Address::new(0x7000), vec![0u8; 0x100]);
    let store = SymbolStore::new();

    let context = stack_context(0x1100, 0);
    let frames = walk_stack(&memory, &context, &store, None, MAX_FRAMES);

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].pc, Address::new(0x1100));
    assert!(frames[0].symbol.is_none());
}

#[test]
fn test_walk_stops_on_an_unreadable_frame()
{
    let memory = FakeProcess::new(Address::new(0x7000), vec![0u8; 0x100]);
    let store = SymbolStore::new();

    // The frame pointer aims outside the mapped image.
    let context = stack_context(0x1100, 0x9000);
    let frames = walk_stack(&memory, &context, &store, None, MAX_FRAMES);

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].frame, Address::new(0x9000));
}

#[test]
fn test_walk_stops_on_a_non_increasing_frame_pointer()
{
    let mut image = vec![0u8; 0x100];
    // The frame links to itself; the walk reports it once and stops.
    put_u64(&mut image, 0x10, 0x7010);
    put_u64(&mut image, 0x18, 0x1105);
    let memory = FakeProcess::new(Address::new(0x7000), image);
    let store = SymbolStore::new();

    let context = stack_context(0x1100, 0x7010);
    let frames = walk_stack(&memory, &context, &store, None, MAX_FRAMES);

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].pc, Address::new(0x1105));
}

#[test]
fn test_walk_honors_the_frame_limit()
{
    let mut image = vec![0u8; 0x100];
    put_u64(&mut image, 0x10, 0x7040);
    put_u64(&mut image, 0x18, 0x1105);
    put_u64(&mut image, 0x40, 0x7080);
    put_u64(&mut image, 0x48, 0x1108);
    let memory = FakeProcess::new(Address::new(0x7000), image);
    let store = SymbolStore::new();

    let context = stack_context(0x1100, 0x7010);
    assert!(walk_stack(&memory, &context, &store, None, 0).is_empty());
    assert_eq!(walk_stack(&memory, &context, &store, None, 1).len(), 1);
    assert_eq!(walk_stack(&memory, &context, &store, None, 2).len(), 2);
}
