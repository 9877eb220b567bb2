//! Instruction decoding for step-over and disassembly listings.
//!
//! Decoding is a capability the engine is handed at construction, not
//! something it reaches for globally. Decoders work on byte buffers the
//! caller already read (and, where needed, already cleaned of planted
//! breakpoint bytes), so the engine controls exactly what gets decoded.

use iced_x86::{Decoder, DecoderOptions, FlowControl, Formatter, Instruction, IntelFormatter};

use crate::error::{DebuggerError, Result};
use crate::types::Address;

/// Longest legal x86 instruction, in bytes.
pub const MAX_INSTRUCTION_LEN: usize = 15;

/// What stepping needs to know about one decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction
{
    /// Address the instruction was decoded at.
    pub address: Address,
    /// Encoded length in bytes.
    pub length: usize,
    /// True for returns and unconditional jumps, direct or indirect.
    ///
    /// Calls and conditional branches do not count: execution reliably
    /// reaches the following instruction, so a step-over point planted
    /// there will be hit.
    pub unconditional_transfer: bool,
}

impl DecodedInstruction
{
    /// Address of the instruction that follows in memory.
    #[must_use]
    pub fn fall_through(&self) -> Address
    {
        self.address + self.length as u64
    }
}

/// One line of a disassembly listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedInstruction
{
    /// Instruction address.
    pub address: Address,
    /// Formatted mnemonic and operands.
    pub text: String,
}

/// Decoding capability handed to the engine at construction.
pub trait InstructionDecoder: Send + Sync
{
    /// Decode the single instruction at the start of `code`.
    ///
    /// `address` is where `code` was read from; it seeds branch-target
    /// resolution and is echoed back in the result.
    fn decode_one(&self, code: &[u8], address: Address) -> Result<DecodedInstruction>;

    /// Decode and format up to `count` instructions from `code`.
    ///
    /// Stops early at the first undecodable byte or when `code` runs
    /// out.
    fn disassemble(&self, code: &[u8], address: Address, count: usize) -> Vec<ListedInstruction>;
}

/// 64-bit x86 decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct X86Decoder;

impl X86Decoder
{
    const BITNESS: u32 = 64;
}

impl InstructionDecoder for X86Decoder
{
    fn decode_one(&self, code: &[u8], address: Address) -> Result<DecodedInstruction>
    {
        let mut decoder = Decoder::with_ip(
            Self::BITNESS,
            code,
            address.value(),
            DecoderOptions::NONE,
        );
        let mut instruction = Instruction::default();
        decoder.decode_out(&mut instruction);
        if instruction.is_invalid() {
            return Err(DebuggerError::Decode {
                address: address.value(),
                details: format!("{:?}", decoder.last_error()),
            });
        }
        let unconditional_transfer = matches!(
            instruction.flow_control(),
            FlowControl::Return | FlowControl::UnconditionalBranch | FlowControl::IndirectBranch
        );
        Ok(DecodedInstruction {
            address,
            length: instruction.len(),
            unconditional_transfer,
        })
    }

    fn disassemble(&self, code: &[u8], address: Address, count: usize) -> Vec<ListedInstruction>
    {
        let mut decoder = Decoder::with_ip(
            Self::BITNESS,
            code,
            address.value(),
            DecoderOptions::NONE,
        );
        let mut formatter = IntelFormatter::new();
        let mut instruction = Instruction::default();
        let mut listing = Vec::with_capacity(count);
        while decoder.can_decode() && listing.len() < count {
            decoder.decode_out(&mut instruction);
            if instruction.is_invalid() {
                break;
            }
            let mut text = String::new();
            formatter.format(&instruction, &mut text);
            listing.push(ListedInstruction {
                address: Address::new(instruction.ip()),
                text,
            });
        }
        listing
    }
}
