//! Mock hotkey backend for unit testing.
//!
//! Records every registration call and lets tests inject synthetic presses
//! without OS hotkey registrations or a message loop.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use monoswitch_core::KeyCombination;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::{HotkeyApiError, HotkeyBackend, HotkeyPress};

/// A mock implementation of [`HotkeyBackend`] driven entirely by the test.
#[derive(Default)]
pub struct MockHotkeyBackend {
    sender: Mutex<Option<UnboundedSender<HotkeyPress>>>,
    registered: Mutex<Vec<(i32, KeyCombination)>>,
    unregistered: Mutex<Vec<i32>>,
    rejected_combos: Mutex<HashSet<KeyCombination>>,
    register_delay: Mutex<Option<Duration>>,
    shutdown_calls: Mutex<u32>,
}

impl MockHotkeyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// `combo` will be refused, as if another application owned it.
    pub fn reject_combination(&self, combo: KeyCombination) {
        self.rejected_combos
            .lock()
            .expect("lock poisoned")
            .insert(combo);
    }

    /// Every `register` call blocks for `delay` (for contention tests).
    pub fn delay_register(&self, delay: Duration) {
        *self.register_delay.lock().expect("lock poisoned") = Some(delay);
    }

    /// Injects a synthetic press, as if the OS delivered one.
    ///
    /// Panics if `start()` has not been called or the backend was shut down.
    pub fn inject_press(&self, registration_id: i32) {
        let guard = self.sender.lock().expect("lock poisoned");
        let sender = guard
            .as_ref()
            .expect("MockHotkeyBackend::inject_press called before start()");
        sender
            .send(HotkeyPress { registration_id })
            .expect("receiver has been dropped");
    }

    pub fn register_count(&self) -> usize {
        self.registered.lock().expect("lock poisoned").len()
    }

    pub fn registered(&self) -> Vec<(i32, KeyCombination)> {
        self.registered.lock().expect("lock poisoned").clone()
    }

    pub fn unregistered(&self) -> Vec<i32> {
        self.unregistered.lock().expect("lock poisoned").clone()
    }

    pub fn shutdown_count(&self) -> u32 {
        *self.shutdown_calls.lock().expect("lock poisoned")
    }
}

impl HotkeyBackend for MockHotkeyBackend {
    fn start(&self) -> Result<UnboundedReceiver<HotkeyPress>, HotkeyApiError> {
        let (tx, rx) = unbounded_channel();
        *self.sender.lock().expect("lock poisoned") = Some(tx);
        Ok(rx)
    }

    fn register(&self, id: i32, combo: &KeyCombination) -> Result<(), HotkeyApiError> {
        let delay = *self.register_delay.lock().expect("lock poisoned");
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self
            .rejected_combos
            .lock()
            .expect("lock poisoned")
            .contains(combo)
        {
            return Err(HotkeyApiError::Rejected);
        }
        self.registered
            .lock()
            .expect("lock poisoned")
            .push((id, *combo));
        Ok(())
    }

    fn unregister(&self, id: i32) -> Result<(), HotkeyApiError> {
        self.unregistered.lock().expect("lock poisoned").push(id);
        Ok(())
    }

    fn shutdown(&self) {
        *self.shutdown_calls.lock().expect("lock poisoned") += 1;
        // Drop the sender to close the press channel.
        *self.sender.lock().expect("lock poisoned") = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
