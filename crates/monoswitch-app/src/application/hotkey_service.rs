//! Hotkey registration and dispatch service.
//!
//! Owns the registration table (combination → registration id → profile) and
//! sits between callers and the OS-level [`HotkeyBackend`].  Registrations
//! move `Unregistered → Registered → Unregistered`; asking for a combination
//! that is already registered short-circuits as a no-op rather than issuing
//! a second OS call.
//!
//! Concurrency rules:
//!
//! - Only one registration may be in flight at a time.  A caller that cannot
//!   get its turn within a bounded wait fails with
//!   [`HotkeyError::RegistrationBusy`] instead of queueing indefinitely.
//! - Presses are consumed by one waiter at a time through
//!   [`await_next_press`](HotkeyService::await_next_press).  Cancelling a
//!   wait detaches it deterministically: a press arriving afterwards is
//!   delivered to the next waiter, never to the cancelled one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use monoswitch_core::{KeyCombination, ProfileId};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::application::cancel::CancelSignal;
use crate::infrastructure::hotkey::{HotkeyApiError, HotkeyBackend, HotkeyPress};

/// Bounded wait for the single-registration-in-flight gate.
const REGISTRATION_WAIT: Duration = Duration::from_millis(500);

/// Error type for hotkey service operations.
#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("another hotkey registration is already in flight")]
    RegistrationBusy,

    #[error("the system refused hotkey {combo}; another application may own it")]
    RegistrationRejected { combo: KeyCombination },

    #[error("received a key press for unknown registration id {id}")]
    UnknownRegistration { id: i32 },

    #[error("wait for key press was cancelled")]
    Cancelled,

    #[error("hotkey service has been shut down")]
    ServiceStopped,

    #[error(transparent)]
    Backend(#[from] HotkeyApiError),
}

#[derive(Default)]
struct RegistrationTable {
    by_combo: HashMap<KeyCombination, i32>,
    by_id: HashMap<i32, (ProfileId, KeyCombination)>,
    next_id: i32,
    shut_down: bool,
}

/// Global hotkey registration and dispatch.
///
/// Constructed once by the composition root and shared; all state lives in
/// this instance, not in globals.
pub struct HotkeyService {
    backend: Arc<dyn HotkeyBackend>,
    /// Single consumer of raw presses.
    events: AsyncMutex<UnboundedReceiver<HotkeyPress>>,
    table: StdMutex<RegistrationTable>,
    /// Serializes registrations, including the OS call itself.
    registration_gate: AsyncMutex<()>,
    registration_wait: Duration,
}

impl HotkeyService {
    /// Starts the backend and wraps it in a service.
    pub fn new(backend: Arc<dyn HotkeyBackend>) -> Result<Self, HotkeyError> {
        let events = backend.start()?;
        Ok(Self {
            backend,
            events: AsyncMutex::new(events),
            table: StdMutex::new(RegistrationTable::default()),
            registration_gate: AsyncMutex::new(()),
            registration_wait: REGISTRATION_WAIT,
        })
    }

    #[cfg(test)]
    fn with_registration_wait(mut self, wait: Duration) -> Self {
        self.registration_wait = wait;
        self
    }

    /// Registers `combo` on behalf of `profile_id`.
    ///
    /// # Errors
    ///
    /// [`HotkeyError::RegistrationBusy`] when another registration holds the
    /// gate past the bounded wait, [`HotkeyError::RegistrationRejected`] when
    /// the OS refuses the combination.
    pub async fn register_hotkey(
        &self,
        profile_id: ProfileId,
        combo: KeyCombination,
    ) -> Result<(), HotkeyError> {
        let _gate = tokio::time::timeout(self.registration_wait, self.registration_gate.lock())
            .await
            .map_err(|_| HotkeyError::RegistrationBusy)?;

        let id = {
            let mut table = self.table.lock().expect("registration table lock poisoned");
            if table.shut_down {
                return Err(HotkeyError::ServiceStopped);
            }
            if let Some(existing) = table.by_combo.get(&combo) {
                debug!(%combo, id = existing, "combination already registered; skipping");
                return Ok(());
            }
            table.next_id += 1;
            table.next_id
        };

        self.backend.register(id, &combo).map_err(|e| match e {
            HotkeyApiError::Rejected => HotkeyError::RegistrationRejected { combo },
            other => HotkeyError::Backend(other),
        })?;

        let mut table = self.table.lock().expect("registration table lock poisoned");
        table.by_combo.insert(combo, id);
        table.by_id.insert(id, (profile_id, combo));
        info!(%combo, id, profile_id, "hotkey registered");
        Ok(())
    }

    /// Suspends until a registered combination is pressed, resolving to the
    /// owning profile and the combination.
    ///
    /// # Errors
    ///
    /// [`HotkeyError::Cancelled`] when `cancel` fires first,
    /// [`HotkeyError::ServiceStopped`] when the backend is gone, and
    /// [`HotkeyError::UnknownRegistration`] when the OS delivers an id the
    /// table does not know (an internal error, never silently resolved).
    pub async fn await_next_press(
        &self,
        cancel: &CancelSignal,
    ) -> Result<(ProfileId, KeyCombination), HotkeyError> {
        let mut cancel = cancel.clone();

        // Racing the lock acquisition too: a cancelled caller must not sit
        // behind another waiter that currently owns the receiver.
        let mut events = tokio::select! {
            _ = cancel.cancelled() => return Err(HotkeyError::Cancelled),
            events = self.events.lock() => events,
        };

        let press = tokio::select! {
            _ = cancel.cancelled() => return Err(HotkeyError::Cancelled),
            press = events.recv() => press.ok_or(HotkeyError::ServiceStopped)?,
        };
        drop(events);

        let table = self.table.lock().expect("registration table lock poisoned");
        match table.by_id.get(&press.registration_id) {
            Some(&(profile_id, combo)) => {
                debug!(%combo, profile_id, "hotkey press dispatched");
                Ok((profile_id, combo))
            }
            None => {
                warn!(id = press.registration_id, "press for unknown registration id");
                Err(HotkeyError::UnknownRegistration {
                    id: press.registration_id,
                })
            }
        }
    }

    /// Unregisters everything and releases the backend.  Idempotent.
    pub fn shutdown(&self) {
        let ids: Vec<(i32, KeyCombination)> = {
            let mut table = self.table.lock().expect("registration table lock poisoned");
            if table.shut_down {
                return;
            }
            table.shut_down = true;
            table.by_combo.clear();
            table.by_id.drain().map(|(id, (_, combo))| (id, combo)).collect()
        };

        for (id, combo) in ids {
            if let Err(e) = self.backend.unregister(id) {
                warn!(%combo, id, error = %e, "failed to unregister hotkey during shutdown");
            }
        }
        self.backend.shutdown();
        info!("hotkey service shut down");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cancel::cancel_pair;
    use crate::infrastructure::hotkey::mock::MockHotkeyBackend;
    use monoswitch_core::{Key, Modifiers};
    use std::sync::Arc;

    fn combo(vk: u32) -> KeyCombination {
        KeyCombination::new(
            Modifiers::none()
                .with(Modifiers::CONTROL)
                .with(Modifiers::ALT),
            Key(vk),
        )
    }

    fn service() -> (Arc<HotkeyService>, Arc<MockHotkeyBackend>) {
        let backend = Arc::new(MockHotkeyBackend::new());
        let service = HotkeyService::new(backend.clone() as Arc<dyn HotkeyBackend>)
            .expect("service starts");
        (Arc::new(service), backend)
    }

    // ── Registration ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_duplicate_combination_issues_one_os_registration() {
        let (service, backend) = service();

        service.register_hotkey(1, combo(0x31)).await.unwrap();
        service.register_hotkey(2, combo(0x31)).await.unwrap();

        assert_eq!(backend.register_count(), 1);
    }

    #[tokio::test]
    async fn test_distinct_combinations_each_register() {
        let (service, backend) = service();

        service.register_hotkey(1, combo(0x31)).await.unwrap();
        service.register_hotkey(2, combo(0x32)).await.unwrap();

        assert_eq!(backend.register_count(), 2);
    }

    #[tokio::test]
    async fn test_os_refusal_maps_to_registration_rejected() {
        let (service, backend) = service();
        backend.reject_combination(combo(0x31));

        let err = service.register_hotkey(1, combo(0x31)).await.unwrap_err();

        assert!(matches!(err, HotkeyError::RegistrationRejected { .. }));
        // The refused combination is not in the table: retrying is allowed.
        backend.reject_combination(combo(0x31));
        let err = service.register_hotkey(1, combo(0x31)).await.unwrap_err();
        assert!(matches!(err, HotkeyError::RegistrationRejected { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_registration_is_declined_as_busy() {
        let backend = Arc::new(MockHotkeyBackend::new());
        backend.delay_register(Duration::from_millis(300));
        let service = Arc::new(
            HotkeyService::new(backend.clone() as Arc<dyn HotkeyBackend>)
                .expect("service starts")
                .with_registration_wait(Duration::from_millis(50)),
        );

        let slow = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.register_hotkey(1, combo(0x31)).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let err = service.register_hotkey(2, combo(0x32)).await.unwrap_err();

        assert!(matches!(err, HotkeyError::RegistrationBusy));
        slow.await.unwrap().unwrap();
    }

    // ── Press dispatch ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_press_resolves_to_owning_profile() {
        let (service, backend) = service();
        service.register_hotkey(7, combo(0x31)).await.unwrap();
        let id = backend.registered()[0].0;
        let (_handle, signal) = cancel_pair();

        backend.inject_press(id);
        let (profile_id, pressed) = service.await_next_press(&signal).await.unwrap();

        assert_eq!(profile_id, 7);
        assert_eq!(pressed, combo(0x31));
    }

    #[tokio::test]
    async fn test_unknown_registration_id_is_an_error() {
        let (service, backend) = service();
        let (_handle, signal) = cancel_pair();

        backend.inject_press(999);
        let err = service.await_next_press(&signal).await.unwrap_err();

        assert!(matches!(err, HotkeyError::UnknownRegistration { id: 999 }));
    }

    #[tokio::test]
    async fn test_cancelled_wait_returns_cancelled() {
        let (service, _backend) = service();
        let (handle, signal) = cancel_pair();
        handle.cancel();

        let err = service.await_next_press(&signal).await.unwrap_err();

        assert!(matches!(err, HotkeyError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_wait_leaves_no_stale_listener() {
        let (service, backend) = service();
        service.register_hotkey(7, combo(0x31)).await.unwrap();
        let id = backend.registered()[0].0;

        // A wait that gets cancelled mid-flight...
        let (handle, signal) = cancel_pair();
        let waiter = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.await_next_press(&signal).await })
        };
        tokio::task::yield_now().await;
        handle.cancel();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, HotkeyError::Cancelled));

        // ...must not consume a press fired afterwards: the next waiter gets it.
        backend.inject_press(id);
        let (_handle2, signal2) = cancel_pair();
        let (profile_id, _) = service.await_next_press(&signal2).await.unwrap();
        assert_eq!(profile_id, 7);
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_shutdown_unregisters_everything_once() {
        let (service, backend) = service();
        service.register_hotkey(1, combo(0x31)).await.unwrap();
        service.register_hotkey(2, combo(0x32)).await.unwrap();

        service.shutdown();
        service.shutdown(); // idempotent

        assert_eq!(backend.unregistered().len(), 2);
        assert_eq!(backend.shutdown_count(), 1);
    }

    #[tokio::test]
    async fn test_register_after_shutdown_fails() {
        let (service, _backend) = service();
        service.shutdown();

        let err = service.register_hotkey(1, combo(0x31)).await.unwrap_err();

        assert!(matches!(err, HotkeyError::ServiceStopped));
    }

    #[tokio::test]
    async fn test_wait_after_shutdown_reports_service_stopped() {
        let (service, _backend) = service();
        service.shutdown();
        let (_handle, signal) = cancel_pair();

        let err = service.await_next_press(&signal).await.unwrap_err();

        assert!(matches!(err, HotkeyError::ServiceStopped));
    }
}
