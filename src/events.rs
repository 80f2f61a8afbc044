//! Name-keyed listener registry for server-pushed events.
//!
//! Delivery is synchronous and in registration order. A listener that
//! panics is logged and skipped; the rest of the sequence still runs.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use frames::Payload;

/// Callback invoked with the `data` of a pushed event.
pub type Listener = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Handle returned by [`EventDispatcher::subscribe`], used to remove one
/// registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventDispatcher {
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `listener` to the sequence for `event`.
    ///
    /// Registering the same callback twice yields two ids and two deliveries.
    pub fn subscribe(&self, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(event.to_owned())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove one registration, or every listener for `event` when `id` is
    /// `None`. Unknown names and ids are ignored.
    pub fn unsubscribe(&self, event: &str, id: Option<ListenerId>) {
        let mut listeners = self.lock();
        let Some(id) = id else {
            listeners.remove(event);
            return;
        };
        if let Some(sequence) = listeners.get_mut(event) {
            if let Some(index) = sequence.iter().position(|(existing, _)| *existing == id) {
                sequence.remove(index);
            }
            if sequence.is_empty() {
                listeners.remove(event);
            }
        }
    }

    /// Deliver `payload` to every listener for `event`. Returns how many ran
    /// to completion.
    pub fn publish(&self, event: &str, payload: &Payload) -> usize {
        // Snapshot so listeners can (un)subscribe without deadlocking.
        let sequence: Vec<Listener> = match self.lock().get(event) {
            Some(sequence) => sequence.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for listener in sequence {
            match catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    tracing::error!(%event, reason = panic_message(&*panic), "event listener panicked");
                }
            }
        }
        delivered
    }

    pub fn clear_all(&self) {
        self.lock().clear();
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().get(event).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(ListenerId, Listener)>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;
