//! Frame-pointer stack walking.

use crate::symbols::{SymbolBackend, SymbolStore};
use crate::target::ProcessMemory;
use crate::types::{Address, CpuContext};

/// Upper bound on frames returned by a walk.
pub const MAX_FRAMES: usize = 50;

/// Symbol attribution for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSymbol
{
    /// Name of the enclosing symbol.
    pub name: String,
    /// Distance from the symbol start to the frame's pc.
    pub displacement: u64,
}

/// One frame discovered by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame
{
    /// Position in the trace; 0 is the currently executing frame.
    pub index: usize,
    /// Program counter for the frame. For frames above the first this is
    /// a return address.
    pub pc: Address,
    /// Frame pointer in effect while the frame executes.
    pub frame: Address,
    /// Best-effort symbol attribution.
    pub symbol: Option<FrameSymbol>,
}

/// Walk the frame-pointer chain of the executing thread.
///
/// Starts from the snapshot's rip/rbp and follows saved frame pointers,
/// reading `[rbp]` for the caller's frame pointer and `[rbp + 8]` for the
/// return address. The walk stops at `max_frames`, on a zero or
/// non-increasing frame pointer, on a zero return address, or on the
/// first unreadable frame. Symbol resolution tries the store's exact
/// lookup first and falls back to a live backend query; a frame nobody
/// can name is still reported.
pub fn walk_stack(
    memory: &dyn ProcessMemory,
    context: &CpuContext,
    symbols: &SymbolStore,
    backend: Option<&dyn SymbolBackend>,
    max_frames: usize,
) -> Vec<StackFrame>
{
    let mut frames = Vec::new();
    let limit = max_frames.min(MAX_FRAMES);
    if limit == 0 {
        return frames;
    }

    let pc = context.instruction_pointer();
    let mut fp = context.frame_pointer();
    frames.push(StackFrame {
        index: 0,
        pc,
        frame: fp,
        symbol: resolve_frame(pc, symbols, backend),
    });

    while frames.len() < limit {
        if fp.is_null() {
            break;
        }
        let Some(next_fp) = read_pointer(memory, fp) else {
            break;
        };
        let Some(return_address) = read_pointer(memory, fp + 8u64) else {
            break;
        };
        if return_address.is_null() {
            break;
        }
        frames.push(StackFrame {
            index: frames.len(),
            pc: return_address,
            frame: next_fp,
            symbol: resolve_frame(return_address, symbols, backend),
        });
        // A frame chain grows toward higher addresses; anything else is
        // a corrupt or terminal link.
        if next_fp <= fp {
            break;
        }
        fp = next_fp;
    }

    frames
}

fn read_pointer(memory: &dyn ProcessMemory, address: Address) -> Option<Address>
{
    let mut buf = [0u8; 8];
    memory.read_memory(address, &mut buf).ok()?;
    Some(Address::new(u64::from_le_bytes(buf)))
}

fn resolve_frame(
    pc: Address,
    symbols: &SymbolStore,
    backend: Option<&dyn SymbolBackend>,
) -> Option<FrameSymbol>
{
    if let Some(symbol) = symbols.find_by_address(pc) {
        return Some(FrameSymbol {
            name: symbol.name.clone(),
            displacement: 0,
        });
    }
    let resolved = backend?.resolve_address(pc).ok()?;
    Some(FrameSymbol {
        name: resolved.name,
        displacement: resolved.displacement,
    })
}
