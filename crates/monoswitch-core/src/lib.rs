//! # monoswitch-core
//!
//! Shared domain model for MonoSwitch: display profiles, display snapshots,
//! and hotkey combinations.
//!
//! MonoSwitch lets a user define named "display profiles" (which monitor is
//! primary, what refresh rate it runs at, whether HDR is on) and switch the
//! live Windows display configuration to match a profile, either directly or
//! via a global keyboard shortcut.
//!
//! This crate is the OS-independent foundation.  It defines:
//!
//! - **`domain::display`** – what the machine's displays look like at one
//!   instant: `DisplayRecord` and the atomic `DisplaySnapshot` that owns them.
//!
//! - **`domain::profile`** – the user's desired configuration: a `Profile` is
//!   a *partial overlay* (unset fields mean "leave that attribute alone"),
//!   plus validation for a whole profile set.
//!
//! - **`domain::keys`** – key combinations (`Ctrl+Alt+1`) with parsing and
//!   formatting, used both by the config file and the hotkey service.
//!
//! It has zero dependencies on OS APIs, async runtimes, or UI frameworks.

pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `monoswitch_core::Profile` instead of `monoswitch_core::domain::profile::Profile`.
pub use domain::display::{
    ColorCapability, DisplayRecord, DisplaySnapshot, Geometry, OutputPath,
};
pub use domain::keys::{Key, KeyCombination, KeyParseError, Modifiers};
pub use domain::profile::{
    validate_profiles, DisplaySetting, Profile, ProfileId, ProfileValidationError,
};
