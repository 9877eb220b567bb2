//! Process and thread identifiers, continuation dispositions.

use std::fmt;

/// OS process identifier of the debug target.
///
/// Debug events carry the id of the process that raised them; the engine
/// hands it back unchanged when resuming the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId
{
    /// Raw numeric value (useful for logging / OS calls).
    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }
}

impl From<u32> for ProcessId
{
    fn from(value: u32) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// OS thread identifier within the debug target.
///
/// Exactly one thread is considered "executing" at any time: the thread
/// that raised the most recent breakpoint or single-step exception. All
/// register-context operations address that thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u32);

impl ThreadId
{
    /// Raw numeric value (useful for logging / OS calls).
    #[must_use]
    pub const fn raw(self) -> u32
    {
        self.0
    }
}

impl From<u32> for ThreadId
{
    fn from(value: u32) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for ThreadId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Continuation disposition handed back to the OS debug facility after an
/// event is dispatched.
///
/// `Handled` tells the OS the exception was the debugger's business
/// (breakpoints, single steps) and the thread should simply continue.
/// `NotHandled` passes a genuine target fault on to the target's own
/// exception handling, which may terminate it; the session keeps running
/// either way to observe the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueStatus
{
    /// The event was consumed by the debugger; continue normally.
    Handled,
    /// The fault was not ours; deliver it to the target's handlers.
    NotHandled,
}

impl ContinueStatus
{
    /// `DBG_CONTINUE`.
    const OS_CONTINUE: u32 = 0x0001_0002;
    /// `DBG_EXCEPTION_NOT_HANDLED`.
    const OS_NOT_HANDLED: u32 = 0x8001_0001;

    /// Raw value expected by the OS resume-event primitive.
    #[must_use]
    pub const fn os_value(self) -> u32
    {
        match self {
            Self::Handled => Self::OS_CONTINUE,
            Self::NotHandled => Self::OS_NOT_HANDLED,
        }
    }
}

impl fmt::Display for ContinueStatus
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            Self::Handled => "continue",
            Self::NotHandled => "not handled",
        };
        write!(f, "{label}")
    }
}
