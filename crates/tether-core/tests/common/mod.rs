//! In-process fakes that stand in for a live debug target.
//!
//! `FakeProcess` models a slab of target memory plus per-thread register
//! contexts, `ScriptedSource` replays a canned debug-event script,
//! `TableDecoder` decodes by lookup table, and `CannedSymbols` answers
//! symbol queries from a fixed list. Together they let the engine run a
//! complete session without an OS debug facility.

#![allow(dead_code)] // Not every test binary uses every fake.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tether_core::decoder::{DecodedInstruction, InstructionDecoder, ListedInstruction};
use tether_core::error::{DebuggerError, Result};
use tether_core::events::{DebugEvent, DebugEventPayload, ExceptionCode, ExceptionRecord};
use tether_core::symbols::{ResolvedSymbol, Symbol, SymbolBackend};
use tether_core::target::{
    DebugEventSource, PageProtection, ProcessMemory, TargetProcess, ThreadContext,
};
use tether_core::types::{Address, ContinueStatus, CpuContext, ProcessId, ThreadId};

/// Process id every fake target reports.
pub const TARGET_PID: ProcessId = ProcessId(4242);

/// Thread id the scripted events run on.
pub const MAIN_THREAD: ThreadId = ThreadId(7);

/// Upper bound on any single wait in a threaded test.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll until `condition` holds, failing the test after a generous
/// deadline. Used where the observable effect trails the notification
/// that triggered it.
pub fn wait_for<F>(condition: F, what: &str)
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

struct FakeState
{
    base: Address,
    memory: Mutex<Vec<u8>>,
    contexts: Mutex<HashMap<u32, CpuContext>>,
    protects: Mutex<Vec<(u64, usize, u32)>>,
    terminated: Mutex<Option<u32>>,
}

/// Fake target process backed by one contiguous slab of memory.
///
/// Cloning shares the underlying state, so a test can hand one handle to
/// the engine and keep another to inspect memory and contexts afterwards.
#[derive(Clone)]
pub struct FakeProcess
{
    state: Arc<FakeState>,
}

impl FakeProcess
{
    /// Target whose readable memory is `image`, mapped at `base`.
    pub fn new(base: Address, image: Vec<u8>) -> Self
    {
        Self {
            state: Arc::new(FakeState {
                base,
                memory: Mutex::new(image),
                contexts: Mutex::new(HashMap::new()),
                protects: Mutex::new(Vec::new()),
                terminated: Mutex::new(None),
            }),
        }
    }

    /// Install or replace the register context of `thread`.
    pub fn set_context(&self, thread: ThreadId, context: CpuContext)
    {
        self.state.contexts.lock().unwrap().insert(thread.raw(), context);
    }

    /// Current register context of `thread`. Panics when the thread was
    /// never given one.
    pub fn context(&self, thread: ThreadId) -> CpuContext
    {
        self.state.contexts.lock().unwrap()[&thread.raw()]
    }

    /// Byte currently stored at `address`. Panics outside the image.
    pub fn byte_at(&self, address: Address) -> u8
    {
        let offset = (address.value() - self.state.base.value()) as usize;
        self.state.memory.lock().unwrap()[offset]
    }

    /// Exit code passed to `terminate`, if it was called.
    pub fn terminated_with(&self) -> Option<u32>
    {
        *self.state.terminated.lock().unwrap()
    }

    /// Number of protection changes requested so far.
    pub fn protect_calls(&self) -> usize
    {
        self.state.protects.lock().unwrap().len()
    }

    fn offset_of(&self, address: Address, len: usize) -> Option<usize>
    {
        let offset = address.value().checked_sub(self.state.base.value())?;
        let offset = usize::try_from(offset).ok()?;
        let end = offset.checked_add(len)?;
        if end <= self.state.memory.lock().unwrap().len() {
            Some(offset)
        } else {
            None
        }
    }
}

impl ProcessMemory for FakeProcess
{
    fn read_memory(&self, address: Address, buf: &mut [u8]) -> Result<()>
    {
        let Some(offset) = self.offset_of(address, buf.len()) else {
            return Err(DebuggerError::MemoryRead {
                address: address.value(),
                len: buf.len(),
                details: "outside the mapped image".to_owned(),
            });
        };
        let memory = self.state.memory.lock().unwrap();
        buf.copy_from_slice(&memory[offset..offset + buf.len()]);
        Ok(())
    }

    fn write_memory(&self, address: Address, data: &[u8]) -> Result<()>
    {
        let Some(offset) = self.offset_of(address, data.len()) else {
            return Err(DebuggerError::MemoryWrite {
                address: address.value(),
                len: data.len(),
                details: "outside the mapped image".to_owned(),
            });
        };
        let mut memory = self.state.memory.lock().unwrap();
        memory[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn protect_memory(
        &self,
        address: Address,
        len: usize,
        protection: PageProtection,
    ) -> Result<PageProtection>
    {
        self.state
            .protects
            .lock()
            .unwrap()
            .push((address.value(), len, protection.raw()));
        Ok(PageProtection(0x20))
    }
}

impl ThreadContext for FakeProcess
{
    fn read_context(&self, thread: ThreadId) -> Result<CpuContext>
    {
        self.state
            .contexts
            .lock()
            .unwrap()
            .get(&thread.raw())
            .copied()
            .ok_or_else(|| DebuggerError::ContextRead {
                thread: thread.raw(),
                details: "unknown thread".to_owned(),
            })
    }

    fn write_context(&self, thread: ThreadId, context: &CpuContext) -> Result<()>
    {
        self.state.contexts.lock().unwrap().insert(thread.raw(), *context);
        Ok(())
    }
}

impl TargetProcess for FakeProcess
{
    fn process_id(&self) -> ProcessId
    {
        TARGET_PID
    }

    fn terminate(&self, exit_code: u32) -> Result<()>
    {
        *self.state.terminated.lock().unwrap() = Some(exit_code);
        Ok(())
    }
}

/// Shared view of a scripted event source: the event queue plus what the
/// source saw the engine do.
pub struct SourceLog
{
    script: Mutex<VecDeque<DebugEvent>>,
    continues: Mutex<Vec<(ProcessId, ThreadId, ContinueStatus)>>,
    attached: Mutex<bool>,
    detached: Mutex<bool>,
}

impl SourceLog
{
    /// Queue another event for delivery while the session runs.
    ///
    /// Staging events one phase at a time keeps the loop idle between
    /// phases, so a test can assert transient state without racing it.
    pub fn queue_event(&self, event: DebugEvent)
    {
        self.script.lock().unwrap().push_back(event);
    }

    /// Number of events the engine has continued.
    pub fn continue_count(&self) -> usize
    {
        self.continues.lock().unwrap().len()
    }

    /// Every continuation delivered so far, in order.
    pub fn continues(&self) -> Vec<(ProcessId, ThreadId, ContinueStatus)>
    {
        self.continues.lock().unwrap().clone()
    }

    /// Whether `attach` was called.
    pub fn was_attached(&self) -> bool
    {
        *self.attached.lock().unwrap()
    }

    /// Whether `detach` was called.
    pub fn was_detached(&self) -> bool
    {
        *self.detached.lock().unwrap()
    }
}

/// Debug-event source that replays a scripted event queue.
///
/// Once the queue is drained, waits report no event (or fail, for loop
/// error tests) until the session stops or the test queues more.
pub struct ScriptedSource
{
    fail_when_drained: bool,
    log: Arc<SourceLog>,
}

impl ScriptedSource
{
    /// Source that delivers `events` in order, then idles.
    ///
    /// The returned log stays with the test while the source itself moves
    /// into the engine.
    pub fn new(events: Vec<DebugEvent>) -> (Self, Arc<SourceLog>)
    {
        let log = Arc::new(SourceLog {
            script: Mutex::new(events.into()),
            continues: Mutex::new(Vec::new()),
            attached: Mutex::new(false),
            detached: Mutex::new(false),
        });
        let source = Self {
            fail_when_drained: false,
            log: Arc::clone(&log),
        };
        (source, log)
    }

    /// Fail the wait once the queue runs out instead of idling.
    #[must_use]
    pub fn fail_when_drained(mut self) -> Self
    {
        self.fail_when_drained = true;
        self
    }
}

impl DebugEventSource for ScriptedSource
{
    fn attach(&mut self, _process: ProcessId, _kill_on_detach: bool) -> Result<()>
    {
        *self.log.attached.lock().unwrap() = true;
        Ok(())
    }

    fn wait_event(&mut self, _timeout_ms: u32) -> Result<Option<DebugEvent>>
    {
        let next = self.log.script.lock().unwrap().pop_front();
        match next {
            Some(event) => Ok(Some(event)),
            None if self.fail_when_drained => Err(DebuggerError::WaitEvent(
                "scripted source drained".to_owned(),
            )),
            None => {
                thread::sleep(Duration::from_millis(1));
                Ok(None)
            }
        }
    }

    fn continue_event(
        &mut self,
        process: ProcessId,
        thread: ThreadId,
        status: ContinueStatus,
    ) -> Result<()>
    {
        self.log.continues.lock().unwrap().push((process, thread, status));
        Ok(())
    }

    fn detach(&mut self) -> Result<()>
    {
        *self.log.detached.lock().unwrap() = true;
        Ok(())
    }
}

/// Decoder that answers from a fixed address table.
///
/// Each entry maps an address to an instruction length and whether the
/// instruction transfers control unconditionally.
#[derive(Default)]
pub struct TableDecoder
{
    instructions: HashMap<u64, (usize, bool)>,
}

impl TableDecoder
{
    /// Decoder with an empty table; every decode fails.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Add an instruction at `address`.
    #[must_use]
    pub fn with_instruction(mut self, address: Address, length: usize, unconditional: bool) -> Self
    {
        self.instructions.insert(address.value(), (length, unconditional));
        self
    }
}

impl InstructionDecoder for TableDecoder
{
    fn decode_one(&self, _code: &[u8], address: Address) -> Result<DecodedInstruction>
    {
        match self.instructions.get(&address.value()) {
            Some(&(length, unconditional_transfer)) => Ok(DecodedInstruction {
                address,
                length,
                unconditional_transfer,
            }),
            None => Err(DebuggerError::Decode {
                address: address.value(),
                details: "not in the instruction table".to_owned(),
            }),
        }
    }

    fn disassemble(&self, code: &[u8], address: Address, count: usize) -> Vec<ListedInstruction>
    {
        let mut listing = Vec::new();
        let mut current = address;
        let mut offset = 0usize;
        while listing.len() < count {
            let Some(&(length, _)) = self.instructions.get(&current.value()) else {
                break;
            };
            if offset + length > code.len() {
                break;
            }
            let bytes = &code[offset..offset + length];
            listing.push(ListedInstruction {
                address: current,
                text: format!("{bytes:02x?}"),
            });
            current = current + length as u64;
            offset += length;
        }
        listing
    }
}

/// Symbol backend that serves a fixed symbol list.
pub struct CannedSymbols
{
    symbols: Vec<Symbol>,
}

impl CannedSymbols
{
    /// Backend knowing exactly `symbols`.
    pub fn new(symbols: Vec<Symbol>) -> Self
    {
        Self { symbols }
    }
}

impl SymbolBackend for CannedSymbols
{
    fn load_module(&self, _path: Option<&str>, base: Address) -> Result<Vec<Symbol>>
    {
        Ok(self
            .symbols
            .iter()
            .filter(|symbol| symbol.module_base == base)
            .cloned()
            .collect())
    }

    fn resolve_address(&self, address: Address) -> Result<ResolvedSymbol>
    {
        self.symbols
            .iter()
            .filter(|symbol| symbol.address <= address)
            .max_by_key(|symbol| symbol.address)
            .map(|symbol| ResolvedSymbol {
                name: symbol.name.clone(),
                address: symbol.address,
                displacement: address.value() - symbol.address.value(),
            })
            .ok_or_else(|| DebuggerError::SymbolNotFound(format!("{address}")))
    }

    fn resolve_name(&self, name: &str) -> Result<Symbol>
    {
        self.symbols
            .iter()
            .find(|symbol| symbol.name == name)
            .cloned()
            .ok_or_else(|| DebuggerError::SymbolNotFound(name.to_owned()))
    }
}

/// Symbol with no source-line information.
pub fn symbol(name: &str, address: u64, module_base: u64) -> Symbol
{
    Symbol {
        name: name.to_owned(),
        address: Address::new(address),
        module_base: Address::new(module_base),
        file: None,
        line: None,
    }
}

/// Event raised by `thread` with the given payload.
pub fn debug_event(thread: ThreadId, payload: DebugEventPayload) -> DebugEvent
{
    DebugEvent {
        process: TARGET_PID,
        thread,
        payload,
    }
}

/// First-chance breakpoint exception at `address`.
pub fn breakpoint_event(thread: ThreadId, address: Address) -> DebugEvent
{
    exception_event(thread, ExceptionCode::Breakpoint, address, true)
}

/// Single-step exception at `address`.
pub fn single_step_event(thread: ThreadId, address: Address) -> DebugEvent
{
    exception_event(thread, ExceptionCode::SingleStep, address, true)
}

/// Exception event with an explicit code and chance.
pub fn exception_event(
    thread: ThreadId,
    code: ExceptionCode,
    address: Address,
    first_chance: bool,
) -> DebugEvent
{
    debug_event(
        thread,
        DebugEventPayload::Exception {
            first_chance,
            record: ExceptionRecord { code, address },
        },
    )
}

/// Module mapped at `base`.
pub fn load_module_event(base: Address, path: Option<&str>) -> DebugEvent
{
    debug_event(
        MAIN_THREAD,
        DebugEventPayload::LoadModule {
            base,
            image_path: path.map(str::to_owned),
        },
    )
}

/// Target process exit with `exit_code`.
pub fn exit_process_event(exit_code: u32) -> DebugEvent
{
    debug_event(MAIN_THREAD, DebugEventPayload::ExitProcess { exit_code })
}

/// Debug string sitting in target memory at `address`.
pub fn output_string_event(address: Address, length: usize, wide: bool) -> DebugEvent
{
    debug_event(
        MAIN_THREAD,
        DebugEventPayload::OutputString {
            address,
            length,
            wide,
        },
    )
}
