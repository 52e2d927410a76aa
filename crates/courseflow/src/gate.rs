//! The write gate shared by the manager, its collections, and its entities.
//!
//! The gate is the sole write-protection mechanism of the engine: every
//! entity setter and collection mutator consults it before touching
//! anything. It also buffers pending change events until the next flush
//! and remembers whether the tree has finished its initial load (events
//! enqueued before that point would describe the load itself and are
//! suppressed).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::event::ChangeEvent;

#[derive(Debug, Default)]
pub(crate) struct StateGate {
    locked: AtomicBool,
    ready: AtomicBool,
    pending: Mutex<Vec<ChangeEvent>>,
}

impl StateGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    pub(crate) fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::Relaxed);
    }

    /// Whether the initial load has completed and events should flow.
    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub(crate) fn set_ready(&self) {
        self.ready.store(true, Ordering::Relaxed);
    }

    pub(crate) fn enqueue(&self, events: impl IntoIterator<Item = ChangeEvent>) {
        let mut pending = self.pending.lock().expect("pending queue poisoned");
        pending.extend(events);
    }

    /// Take everything enqueued since the last flush.
    pub(crate) fn drain(&self) -> Vec<ChangeEvent> {
        let mut pending = self.pending.lock().expect("pending queue poisoned");
        std::mem::take(&mut *pending)
    }
}
