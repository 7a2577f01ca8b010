//! Global hotkey backend boundary.
//!
//! On Windows, system-wide hotkeys are registered with the OS and delivered
//! as messages to the queue of the thread that registered them.  The
//! production backend therefore runs a dedicated message-loop thread; raw
//! presses arrive on an unbounded channel and are consumed by the Tokio
//! async runtime.
//!
//! # Testability
//!
//! The [`HotkeyBackend`] trait allows unit tests to inject synthetic presses
//! without OS hotkey registrations; see [`mock::MockHotkeyBackend`].

use monoswitch_core::KeyCombination;
use tokio::sync::mpsc::UnboundedReceiver;

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

/// A raw hotkey press as delivered by the OS: just the registration id the
/// press was routed to.  Mapping back to a profile happens one layer up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyPress {
    pub registration_id: i32,
}

/// Error type for native hotkey operations.
#[derive(Debug, thiserror::Error)]
pub enum HotkeyApiError {
    /// The OS refused the registration, typically because another
    /// application already owns the combination.
    #[error("the system refused the hotkey registration")]
    Rejected,

    /// The message pump thread is not running or stopped responding.
    #[error("hotkey message pump is unavailable")]
    PumpUnavailable,

    /// A native call failed; carries the raw OS status code.
    #[error("hotkey call failed with code {code}")]
    Os { code: i32 },
}

/// Trait abstracting OS-level hotkey registration and press delivery.
pub trait HotkeyBackend: Send + Sync {
    /// Starts the backend and returns the single stream of raw presses.
    fn start(&self) -> Result<UnboundedReceiver<HotkeyPress>, HotkeyApiError>;

    /// Registers `combo` under `id` with the OS.
    fn register(&self, id: i32, combo: &KeyCombination) -> Result<(), HotkeyApiError>;

    /// Releases the OS registration for `id`.
    fn unregister(&self, id: i32) -> Result<(), HotkeyApiError>;

    /// Stops the backend and releases the event-receiving resource.
    fn shutdown(&self);
}
