//! Keyed handler registries for event dispatch.
//!
//! Both dispatch levels use the same structure: debug events are routed by
//! [`DebugEventKind`](crate::events::DebugEventKind), and exception events
//! are routed a second time by
//! [`ExceptionCode`](crate::events::ExceptionCode). A registry maps each
//! key to the handlers registered for it and invokes them in registration
//! order.
//!
//! Removal is token-based. Tokens stay valid across other removals because
//! a removed handler leaves an empty slot behind instead of shifting its
//! neighbors.

use std::collections::HashMap;
use std::hash::Hash;

/// Ticket returned by [`HandlerRegistry::register`], required to remove
/// the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerToken<K>
{
    key: K,
    slot: usize,
}

impl<K: Copy> HandlerToken<K>
{
    /// Key the handler was registered under.
    #[must_use]
    pub const fn key(&self) -> K
    {
        self.key
    }
}

/// Handlers grouped by key, invoked in registration order.
///
/// `notify_with` on a key nobody registered for is a silent no-op; events
/// without listeners are simply dropped. Handlers must not register or
/// remove handlers on the registry that is currently notifying them; the
/// registry is exclusively borrowed for the duration of the walk.
pub struct HandlerRegistry<K, H>
{
    handlers: HashMap<K, Vec<Option<H>>>,
}

impl<K, H> HandlerRegistry<K, H>
where
    K: Eq + Hash + Copy,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self
    {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` under `key`.
    ///
    /// Handlers registered under the same key run in registration order
    /// when the key is notified.
    pub fn register(&mut self, key: K, handler: H) -> HandlerToken<K>
    {
        let slots = self.handlers.entry(key).or_default();
        slots.push(Some(handler));
        HandlerToken {
            key,
            slot: slots.len() - 1,
        }
    }

    /// Remove the handler identified by `token`.
    ///
    /// Returns `false` only when the token's key has no entry at all.
    /// Removing a handler that is already gone leaves the registry
    /// unchanged and still returns `true`; remaining handlers keep their
    /// tokens.
    pub fn remove(&mut self, token: HandlerToken<K>) -> bool
    {
        match self.handlers.get_mut(&token.key) {
            Some(slots) => {
                if let Some(slot) = slots.get_mut(token.slot) {
                    *slot = None;
                }
                true
            }
            None => false,
        }
    }

    /// Invoke every live handler registered under `key`, in registration
    /// order. A key without an entry is a silent no-op.
    pub fn notify_with<F>(&mut self, key: K, mut invoke: F)
    where
        F: FnMut(&mut H),
    {
        if let Some(slots) = self.handlers.get_mut(&key) {
            for slot in slots.iter_mut() {
                if let Some(handler) = slot.as_mut() {
                    invoke(handler);
                }
            }
        }
    }

    /// Number of live handlers registered under `key`.
    #[must_use]
    pub fn handler_count(&self, key: K) -> usize
    {
        self.handlers
            .get(&key)
            .map_or(0, |slots| slots.iter().filter(|slot| slot.is_some()).count())
    }
}

impl<K, H> Default for HandlerRegistry<K, H>
where
    K: Eq + Hash + Copy,
{
    fn default() -> Self
    {
        Self::new()
    }
}
