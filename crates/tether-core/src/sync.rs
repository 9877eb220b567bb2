//! Synchronization between the event loop and command threads.

use std::sync::{Condvar, Mutex};

/// Auto-reset gate the event loop parks on while the target is held.
///
/// When a breakpoint or single-step handler decides the target should
/// stay suspended, the loop thread blocks in [`ContinueGate::wait`] with
/// the debug event still pending. A command thread releases it with
/// [`ContinueGate::signal`]; the wakeup consumes the signal, so the next
/// wait blocks again.
///
/// Signals collapse: signaling an already-signaled gate is a no-op, and a
/// signal delivered while nobody waits releases only the next waiter.
/// The session is half duplex, so at most one thread ever waits.
pub struct ContinueGate
{
    signaled: Mutex<bool>,
    wakeup: Condvar,
}

impl ContinueGate
{
    /// Create a gate with no pending signal.
    #[must_use]
    pub const fn new() -> Self
    {
        Self {
            signaled: Mutex::new(false),
            wakeup: Condvar::new(),
        }
    }

    /// Block until the gate is signaled, then consume the signal.
    ///
    /// Returns immediately when a signal is already pending.
    pub fn wait(&self)
    {
        let mut signaled = self.signaled.lock().unwrap();
        while !*signaled {
            signaled = self.wakeup.wait(signaled).unwrap();
        }
        *signaled = false;
    }

    /// Release the waiter, or arm the gate if nobody waits yet.
    pub fn signal(&self)
    {
        let mut signaled = self.signaled.lock().unwrap();
        *signaled = true;
        drop(signaled);
        self.wakeup.notify_one();
    }
}

impl Default for ContinueGate
{
    fn default() -> Self
    {
        Self::new()
    }
}
