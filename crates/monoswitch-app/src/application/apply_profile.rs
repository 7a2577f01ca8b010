//! Display configuration engine.
//!
//! Applies a [`Profile`] to the live display configuration through the
//! two-phase stage/commit protocol:
//!
//! 1. Take a fresh snapshot.
//! 2. Stage primary and refresh-rate changes (registry writes, nothing
//!    visible yet).  A primary change re-bases the whole desktop coordinate
//!    space: the new primary moves to (0, 0) and every other display shifts
//!    by the same delta, so the invariant "primary is at the origin" holds.
//!    Refresh changes are test-staged first; a refusal restores the
//!    in-memory rate and is reported per display instead of failing the
//!    profile.
//! 3. Commit everything staged in ONE call.  Each commit is a full
//!    desktop-wide mode set, so committing per display would flicker the
//!    screen once per change and redo work the OS batches anyway.
//! 4. Apply HDR changes immediately – advanced color has no staged variant
//!    and must not be folded into the commit above.
//! 5. Take a final snapshot so the state seen by subsequent callers is
//!    post-change.
//!
//! Partial success is the policy: a display that cannot honour one setting
//! is reported in [`ApplyOutcome::skipped`] while the rest of the profile
//! still applies.  There is no rollback.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use monoswitch_core::{DisplaySetting, DisplaySnapshot, Profile};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::activation::ProfileApplier;
use crate::application::snapshot::{take_snapshot, SnapshotError};
use crate::infrastructure::display_api::{
    DeviceMode, DisplayApi, DisplayApiError, ModeChangeStatus, StageOptions,
};

/// Why one display's setting was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The display id matched nothing in the snapshot (unplugged, or a stale
    /// profile).
    DisplayNotFound,
    /// The display refused the requested refresh rate.
    RefreshRateUnsupported { requested_hz: u32 },
    /// The display has no advanced color support (or no path metadata).
    ColorModeUnavailable,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DisplayNotFound => write!(f, "display not found"),
            SkipReason::RefreshRateUnsupported { requested_hz } => {
                write!(f, "refresh rate {requested_hz} Hz unsupported")
            }
            SkipReason::ColorModeUnavailable => write!(f, "advanced color unavailable"),
        }
    }
}

/// One skipped per-display setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedSetting {
    pub display_id: u32,
    pub reason: SkipReason,
}

/// What an application run actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Number of mode changes written to the staging area.
    pub staged: usize,
    /// Whether a commit ran (exactly once when anything was staged).
    pub committed: bool,
    /// Number of immediate advanced-color switches.
    pub color_changes: usize,
    /// Per-display settings that could not be honoured.
    pub skipped: Vec<SkippedSetting>,
}

/// Error type for profile application.  Everything here is fatal to the
/// activation; per-display capability problems are data in [`ApplyOutcome`].
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Api(#[from] DisplayApiError),

    /// A non-test stage call was refused, which the preceding test said
    /// could not happen.
    #[error("staging unexpectedly rejected for {device}")]
    StageRejected { device: String },

    #[error("no arrangement recorded to revert to")]
    NothingToRevert,
}

/// The display configuration engine.
///
/// Holds the native adapter and the single retained pre-apply snapshot used
/// by [`revert_last`](DisplayConfigurator::revert_last).
pub struct DisplayConfigurator {
    api: Arc<dyn DisplayApi>,
    last_arrangement: Mutex<Option<DisplaySnapshot>>,
}

impl DisplayConfigurator {
    pub fn new(api: Arc<dyn DisplayApi>) -> Self {
        Self {
            api,
            last_arrangement: Mutex::new(None),
        }
    }

    /// Applies `profile` to the live configuration.
    ///
    /// # Errors
    ///
    /// Fails on snapshot inconsistencies and native call failures; see
    /// [`ApplyError`].  Capability refusals and missing displays are
    /// reported in the returned [`ApplyOutcome`] instead.
    pub fn apply_profile(&self, profile: &Profile) -> Result<ApplyOutcome, ApplyError> {
        let mut current = take_snapshot(self.api.as_ref())?;
        let before = current.clone();

        let mut outcome = ApplyOutcome::default();
        let mut staged_any = false;

        // ── Staged pass: primary and refresh-rate changes ─────────────────────
        let mut primary_claimed = false;
        for setting in &profile.display_settings {
            if current.find(setting.display_id).is_none() {
                if !setting.is_noop() {
                    warn!(
                        display_id = setting.display_id,
                        "profile references a display that is not attached; skipping"
                    );
                    outcome.skipped.push(SkippedSetting {
                        display_id: setting.display_id,
                        reason: SkipReason::DisplayNotFound,
                    });
                }
                continue;
            }

            if setting.primary == Some(true) {
                if primary_claimed {
                    // Only the first primary request is honoured.
                    warn!(
                        display_id = setting.display_id,
                        "profile requests a second primary display; ignoring"
                    );
                } else {
                    primary_claimed = true;
                    staged_any |=
                        self.stage_primary_change(&mut current, setting.display_id, &mut outcome)?;
                }
            }

            if let Some(rate) = setting.refresh_rate_hz {
                if rate != 0 {
                    staged_any |=
                        self.stage_refresh_change(&mut current, setting.display_id, rate, &mut outcome)?;
                }
            }
        }

        // One desktop-wide mode set for everything staged above.
        if staged_any {
            self.api.commit_staged_changes()?;
            outcome.committed = true;
        }

        // ── Immediate pass: advanced color ────────────────────────────────────
        for setting in &profile.display_settings {
            if let Some(enable) = setting.enable_hdr {
                self.apply_color_change(&current, setting.display_id, enable, &mut outcome)?;
            }
        }

        // Refresh state for subsequent callers; the OS may have adjusted more
        // than what was staged.
        let after = take_snapshot(self.api.as_ref())?;
        debug!(displays = after.len(), "post-activation snapshot taken");

        *self
            .last_arrangement
            .lock()
            .expect("last arrangement lock poisoned") = Some(before);

        info!(
            staged = outcome.staged,
            committed = outcome.committed,
            color_changes = outcome.color_changes,
            skipped = outcome.skipped.len(),
            "profile application finished"
        );
        Ok(outcome)
    }

    /// Re-applies the arrangement recorded before the most recent successful
    /// apply.  One level only; the recorded arrangement is consumed.
    pub fn revert_last(&self) -> Result<ApplyOutcome, ApplyError> {
        let saved = self
            .last_arrangement
            .lock()
            .expect("last arrangement lock poisoned")
            .take()
            .ok_or(ApplyError::NothingToRevert)?;

        let settings: Vec<DisplaySetting> = saved
            .records()
            .iter()
            .map(|r| DisplaySetting {
                display_id: r.display_id,
                primary: if r.is_primary { Some(true) } else { None },
                enable_hdr: r.color.as_ref().map(|c| c.advanced_color_enabled),
                refresh_rate_hz: Some(r.refresh_rate_hz),
            })
            .collect();
        let restore = Profile {
            id: 0,
            name: "previous arrangement".to_string(),
            hot_key: None,
            display_settings: settings,
        };

        info!("reverting to the previous display arrangement");
        self.apply_profile(&restore)
    }

    /// Stages a primary-display change plus the coordinate re-base of every
    /// other display.  Returns whether anything was staged.
    fn stage_primary_change(
        &self,
        current: &mut DisplaySnapshot,
        display_id: u32,
        outcome: &mut ApplyOutcome,
    ) -> Result<bool, ApplyError> {
        let (dx, dy) = {
            let Some(record) = current.find(display_id) else {
                return Ok(false);
            };
            if record.is_primary {
                debug!(display_id, "display is already primary; nothing to stage");
                return Ok(false);
            }
            (record.geometry.x, record.geometry.y)
        };

        info!(display_id, dx, dy, "changing primary display");

        // The new primary moves to the origin and carries the primary flag.
        if let Some(record) = current.find_mut(display_id) {
            record.geometry.x = 0;
            record.geometry.y = 0;
            record.is_primary = true;
            let mode = mode_of(record);
            let device = record.adapter_device_name.clone();
            self.stage_checked(
                &device,
                &mode,
                StageOptions {
                    set_primary: true,
                    test_only: false,
                },
            )?;
            outcome.staged += 1;
        }

        // Every other display shifts by the same delta so the desktop stays
        // arranged identically around the new origin.
        for record in current.records_mut() {
            if record.display_id == display_id {
                continue;
            }
            record.is_primary = false;
            record.geometry = record.geometry.shifted(-dx, -dy);
            let mode = mode_of(record);
            let device = record.adapter_device_name.clone();
            self.stage_checked(&device, &mode, StageOptions::default())?;
            outcome.staged += 1;
        }

        Ok(true)
    }

    /// Stages a refresh-rate change.  Returns whether anything was staged.
    fn stage_refresh_change(
        &self,
        current: &mut DisplaySnapshot,
        display_id: u32,
        requested_hz: u32,
        outcome: &mut ApplyOutcome,
    ) -> Result<bool, ApplyError> {
        let Some(record) = current.find_mut(display_id) else {
            return Ok(false);
        };
        if record.refresh_rate_hz == requested_hz {
            debug!(display_id, requested_hz, "refresh rate already active; nothing to stage");
            return Ok(false);
        }

        let previous_hz = record.refresh_rate_hz;
        record.refresh_rate_hz = requested_hz;
        let mode = mode_of(record);
        let device = record.adapter_device_name.clone();

        // Probe first: an unsupported rate is expected on mixed hardware and
        // must not abort the rest of the profile.
        let probe = self.api.stage_mode_change(
            &device,
            &mode,
            StageOptions {
                set_primary: false,
                test_only: true,
            },
        )?;
        if probe == ModeChangeStatus::Unsupported {
            record.refresh_rate_hz = previous_hz;
            warn!(display_id, requested_hz, "display refused refresh rate; skipping");
            outcome.skipped.push(SkippedSetting {
                display_id,
                reason: SkipReason::RefreshRateUnsupported { requested_hz },
            });
            return Ok(false);
        }

        info!(display_id, previous_hz, requested_hz, "changing refresh rate");
        self.stage_checked(&device, &mode, StageOptions::default())?;
        outcome.staged += 1;
        Ok(true)
    }

    /// Applies one advanced-color change immediately (no stage/commit).
    fn apply_color_change(
        &self,
        current: &DisplaySnapshot,
        display_id: u32,
        enable: bool,
        outcome: &mut ApplyOutcome,
    ) -> Result<(), ApplyError> {
        let Some(record) = current.find(display_id) else {
            // Already reported as DisplayNotFound in the staged pass.
            return Ok(());
        };

        let (output, color) = match (record.output, record.color) {
            (Some(output), Some(color)) if color.supports_advanced_color => (output, color),
            _ => {
                warn!(display_id, "display has no advanced color support; skipping");
                outcome.skipped.push(SkippedSetting {
                    display_id,
                    reason: SkipReason::ColorModeUnavailable,
                });
                return Ok(());
            }
        };

        if color.advanced_color_enabled == enable {
            debug!(display_id, enable, "advanced color already in requested state");
            return Ok(());
        }

        info!(display_id, enable, "switching advanced color");
        self.api.set_advanced_color(&output, enable)?;
        outcome.color_changes += 1;
        Ok(())
    }

    /// Non-test stage that treats an `Unsupported` outcome as an error: the
    /// caller either probed already or is staging a geometry the display
    /// currently runs.
    fn stage_checked(
        &self,
        device: &str,
        mode: &DeviceMode,
        options: StageOptions,
    ) -> Result<(), ApplyError> {
        match self.api.stage_mode_change(device, mode, options)? {
            ModeChangeStatus::Applied => Ok(()),
            ModeChangeStatus::Unsupported => Err(ApplyError::StageRejected {
                device: device.to_string(),
            }),
        }
    }
}

fn mode_of(record: &monoswitch_core::DisplayRecord) -> DeviceMode {
    DeviceMode {
        width: record.geometry.width,
        height: record.geometry.height,
        x: record.geometry.x,
        y: record.geometry.y,
        refresh_hz: record.refresh_rate_hz,
    }
}

#[async_trait]
impl ProfileApplier for DisplayConfigurator {
    async fn apply(&self, profile: &Profile) -> Result<ApplyOutcome, ApplyError> {
        self.apply_profile(profile)
    }

    async fn revert(&self) -> Result<ApplyOutcome, ApplyError> {
        self.revert_last()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
