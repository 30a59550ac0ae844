//! Cross-context key event queue.
//!
//! The host's input hook can fire on a different thread than the frame tick.
//! Producers append through a cloneable [`KeyEventSender`]; once per frame the
//! tick drains a snapshot and dispatches each event with the numeric state
//! isolated around the callback.

use crate::fpu;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One key transition reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub pressed: bool,
    pub code: i32,
}

impl KeyEvent {
    pub const fn pressed(code: i32) -> Self {
        Self {
            pressed: true,
            code,
        }
    }

    pub const fn released(code: i32) -> Self {
        Self {
            pressed: false,
            code,
        }
    }
}

/// Process-wide FIFO of pending key events.
#[derive(Debug, Default)]
pub struct KeyEventQueue {
    events: Mutex<VecDeque<KeyEvent>>,
}

impl KeyEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<KeyEvent>> {
        // A panicking producer cannot leave the deque half-written.
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, event: KeyEvent) {
        self.lock().push_back(event);
    }

    pub fn push_pressed(&self, code: i32) {
        self.push(KeyEvent::pressed(code));
    }

    pub fn push_released(&self, code: i32) {
        self.push(KeyEvent::released(code));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take every event queued so far, leaving the queue empty.
    pub fn take_snapshot(&self) -> VecDeque<KeyEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Dispatch the current snapshot in enqueue order.
    ///
    /// Each callback runs with the numeric state isolated. Events pushed while
    /// dispatching stay queued for the next call. Returns the number of events
    /// dispatched.
    pub fn dispatch(&self, mut handler: impl FnMut(KeyEvent)) -> usize {
        let snapshot = self.take_snapshot();
        let count = snapshot.len();
        for event in snapshot {
            fpu::isolated(|| handler(event));
        }
        if count > 0 {
            tracing::trace!(count, "dispatched key events");
        }
        count
    }
}

/// Producer handle for the host's input hook.
#[derive(Debug, Clone)]
pub struct KeyEventSender {
    queue: Arc<KeyEventQueue>,
}

impl KeyEventSender {
    pub fn new(queue: Arc<KeyEventQueue>) -> Self {
        Self { queue }
    }

    pub fn push_pressed(&self, code: i32) {
        self.queue.push_pressed(code);
    }

    pub fn push_released(&self, code: i32) {
        self.queue.push_released(code);
    }
}
