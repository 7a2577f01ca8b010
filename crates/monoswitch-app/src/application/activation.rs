//! Profile activation orchestration.
//!
//! `ActivationService` is the single boundary where every lower-layer error
//! becomes a plain success/failure answer for the caller (tray UI or hotkey
//! loop).  It serializes activations through one lock: the configuration
//! engine's snapshot-then-mutate sequence is not safe under concurrent
//! mutation, so at most one apply runs at a time system-wide, no matter who
//! triggered it.
//!
//! Lock acquisition is bounded (~2 s by default) and raced against the
//! caller's cancellation signal; a busy system declines cleanly instead of
//! queueing work the user has probably moved past.  The lock guard is
//! released by RAII on every path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use monoswitch_core::{Profile, ProfileId};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use crate::application::apply_profile::{ApplyError, ApplyOutcome};
use crate::application::cancel::CancelSignal;
use crate::application::hotkey_service::{HotkeyError, HotkeyService};

/// Default bounded wait for the activation lock.
pub const DEFAULT_ACTIVATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Port for the display configuration engine.
///
/// The production implementation is
/// [`DisplayConfigurator`](crate::application::apply_profile::DisplayConfigurator);
/// tests inject recording implementations to observe call ordering.
#[async_trait]
pub trait ProfileApplier: Send + Sync {
    async fn apply(&self, profile: &Profile) -> Result<ApplyOutcome, ApplyError>;

    /// Re-applies the most recent pre-apply arrangement.
    async fn revert(&self) -> Result<ApplyOutcome, ApplyError>;
}

/// Serializes "apply a profile now" requests and owns the profile lookup.
pub struct ActivationService {
    /// Immutable, validated profile set supplied at startup.
    profiles: Vec<Profile>,
    applier: Arc<dyn ProfileApplier>,
    activation_lock: AsyncMutex<()>,
    lock_timeout: Duration,
}

impl ActivationService {
    pub fn new(profiles: Vec<Profile>, applier: Arc<dyn ProfileApplier>) -> Self {
        Self::with_lock_timeout(profiles, applier, DEFAULT_ACTIVATION_TIMEOUT)
    }

    pub fn with_lock_timeout(
        profiles: Vec<Profile>,
        applier: Arc<dyn ProfileApplier>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            profiles,
            applier,
            activation_lock: AsyncMutex::new(()),
            lock_timeout,
        }
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    fn profile(&self, profile_id: ProfileId) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == profile_id)
    }

    /// Applies the profile with `profile_id`.  Returns `true` on success;
    /// every failure (busy, cancelled, unknown profile, engine error) is
    /// logged and reported as `false`, never as a panic or an error value.
    pub async fn activate_profile(&self, profile_id: ProfileId, cancel: &CancelSignal) -> bool {
        let Some(_guard) = self.acquire_lock(cancel).await else {
            warn!(profile_id, "activation declined: another activation is in progress");
            return false;
        };

        let Some(profile) = self.profile(profile_id) else {
            warn!(profile_id, "activation failed: no such profile");
            return false;
        };

        info!(profile_id, name = %profile.name, "activating profile");
        match self.applier.apply(profile).await {
            Ok(outcome) => {
                report_outcome(&outcome);
                true
            }
            Err(e) => {
                error!(profile_id, error = %e, "profile activation failed");
                false
            }
        }
        // _guard drops here on every path.
    }

    /// Reverts to the arrangement recorded before the most recent apply.
    pub async fn revert_last(&self, cancel: &CancelSignal) -> bool {
        let Some(_guard) = self.acquire_lock(cancel).await else {
            warn!("revert declined: another activation is in progress");
            return false;
        };

        match self.applier.revert().await {
            Ok(outcome) => {
                report_outcome(&outcome);
                true
            }
            Err(ApplyError::NothingToRevert) => {
                info!("nothing to revert");
                false
            }
            Err(e) => {
                error!(error = %e, "revert failed");
                false
            }
        }
    }

    /// Registers every profile-declared hotkey, then forwards presses to
    /// [`activate_profile`](Self::activate_profile) until `cancel` fires.
    pub async fn run_hotkey_loop(&self, hotkeys: &HotkeyService, cancel: &CancelSignal) {
        for profile in &self.profiles {
            let Some(combo) = profile.hot_key else { continue };
            if let Err(e) = hotkeys.register_hotkey(profile.id, combo).await {
                // One unusable hotkey must not take the others down.
                warn!(profile_id = profile.id, %combo, error = %e, "hotkey registration failed");
            }
        }

        loop {
            if cancel.is_cancelled() {
                return;
            }
            match hotkeys.await_next_press(cancel).await {
                Ok((profile_id, combo)) => {
                    info!(%combo, profile_id, "hotkey activation requested");
                    self.activate_profile(profile_id, cancel).await;
                }
                Err(HotkeyError::Cancelled) | Err(HotkeyError::ServiceStopped) => return,
                Err(e) => {
                    error!(error = %e, "hotkey wait failed");
                }
            }
        }
    }

    async fn acquire_lock(
        &self,
        cancel: &CancelSignal,
    ) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        let mut cancel = cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => None,
            acquired = tokio::time::timeout(self.lock_timeout, self.activation_lock.lock()) => {
                acquired.ok()
            }
        }
    }
}

fn report_outcome(outcome: &ApplyOutcome) {
    for skip in &outcome.skipped {
        warn!(
            display_id = skip.display_id,
            reason = %skip.reason,
            "setting skipped"
        );
    }
    info!(
        staged = outcome.staged,
        committed = outcome.committed,
        color_changes = outcome.color_changes,
        skipped = outcome.skipped.len(),
        "activation finished"
    );
}

// ── Tests ─────────────────────────────────────────────────────────────────────
