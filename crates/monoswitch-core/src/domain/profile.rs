//! User-defined display profiles.
//!
//! A profile is a *partial overlay*: every `Option` field left as `None`
//! means "leave this attribute unchanged".  Applying a profile therefore only
//! ever touches the attributes the user asked about.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::keys::KeyCombination;

/// Unique identifier for a profile, assigned in the config file.
pub type ProfileId = u32;

/// Desired settings for one display within a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySetting {
    /// Enumeration ordinal of the display this entry targets.
    pub display_id: u32,
    /// `Some(true)` makes this display primary.  `Some(false)` is accepted
    /// but has no effect on its own (another entry must claim primary).
    pub primary: Option<bool>,
    /// Desired advanced color (HDR) state.
    pub enable_hdr: Option<bool>,
    /// Desired refresh rate.  `Some(0)` is treated like `None`.
    pub refresh_rate_hz: Option<u32>,
}

impl DisplaySetting {
    /// `true` when the entry requests no change at all.
    pub fn is_noop(&self) -> bool {
        self.primary != Some(true)
            && self.enable_hdr.is_none()
            && !matches!(self.refresh_rate_hz, Some(rate) if rate != 0)
    }
}

/// A named target configuration, optionally bound to a global hotkey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub hot_key: Option<KeyCombination>,
    pub display_settings: Vec<DisplaySetting>,
}

/// Errors detected when validating a profile set at load time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileValidationError {
    #[error("duplicate profile id {0}")]
    DuplicateProfileId(ProfileId),

    #[error("profiles {first} and {second} both use hotkey {combo}")]
    DuplicateHotkey {
        first: ProfileId,
        second: ProfileId,
        combo: String,
    },

    #[error("profile {profile} lists display {display} more than once")]
    DuplicateDisplayId { profile: ProfileId, display: u32 },

    #[error("profile {profile} marks more than one display as primary")]
    MultiplePrimaries { profile: ProfileId },
}

/// Validates an entire profile set before it is handed to the rest of the
/// system: profile ids unique, hotkeys unique across profiles, display ids
/// unique within a profile, at most one primary per profile.
pub fn validate_profiles(profiles: &[Profile]) -> Result<(), ProfileValidationError> {
    let mut seen_ids = HashSet::new();
    let mut seen_hotkeys: HashMap<KeyCombination, ProfileId> = HashMap::new();

    for profile in profiles {
        if !seen_ids.insert(profile.id) {
            return Err(ProfileValidationError::DuplicateProfileId(profile.id));
        }

        if let Some(combo) = profile.hot_key {
            if let Some(&first) = seen_hotkeys.get(&combo) {
                return Err(ProfileValidationError::DuplicateHotkey {
                    first,
                    second: profile.id,
                    combo: combo.to_string(),
                });
            }
            seen_hotkeys.insert(combo, profile.id);
        }

        let mut seen_displays = HashSet::new();
        let mut primaries = 0;
        for setting in &profile.display_settings {
            if !seen_displays.insert(setting.display_id) {
                return Err(ProfileValidationError::DuplicateDisplayId {
                    profile: profile.id,
                    display: setting.display_id,
                });
            }
            if setting.primary == Some(true) {
                primaries += 1;
            }
        }
        if primaries > 1 {
            return Err(ProfileValidationError::MultiplePrimaries {
                profile: profile.id,
            });
        }
    }

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
