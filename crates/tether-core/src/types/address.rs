//! Memory address type.

use std::fmt;
use std::num::ParseIntError;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// Strongly typed target-process memory address.
///
/// A wrapper around `u64` that keeps addresses from mixing with sizes,
/// lengths, and other numeric values. Breakpoints are keyed by `Address`,
/// so the equality and ordering impls matter: two breakpoints are the same
/// breakpoint exactly when their addresses (and kinds) compare equal.
///
/// ## Example
///
/// ```rust
/// use tether_core::types::Address;
///
/// let addr = Address::from(0x401000);
/// let fall_through = addr + 5; // next instruction after a 5-byte opcode
/// assert_eq!(fall_through.value(), 0x401005);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null address.
    ///
    /// Used as the initial location of the relocatable step breakpoint and
    /// as the stack walker's termination sentinel.
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value (usable in const contexts).
    #[must_use]
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address.
    ///
    /// Use this when handing the address to OS APIs or formatting routines
    /// that expect a plain integer.
    #[must_use]
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Whether this is the null address.
    #[must_use]
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset, returning `None` on overflow.
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Subtract an offset, returning `None` on underflow.
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }

    /// Add an offset, saturating at `u64::MAX`.
    #[must_use]
    pub fn saturating_add(self, offset: u64) -> Self
    {
        Address(self.0.saturating_add(offset))
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}

impl FromStr for Address
{
    type Err = ParseIntError;

    /// Parse an address from user input.
    ///
    /// A `0x`/`0X` prefix selects hexadecimal; anything else is parsed as
    /// decimal. This matches the address syntax the command front end
    /// accepts for breakpoint and memory commands.
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let trimmed = s.trim();
        if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16).map(Address)
        } else {
            trimmed.parse::<u64>().map(Address)
        }
    }
}
