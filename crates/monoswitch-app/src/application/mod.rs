//! Application use cases: snapshotting displays, applying profiles,
//! registering/dispatching hotkeys, and serializing activations.
//!
//! Every use case depends only on traits and domain types; infrastructure
//! implementations are injected at construction time.

pub mod activation;
pub mod apply_profile;
pub mod cancel;
pub mod hotkey_service;
pub mod snapshot;
