//! Display query/mutation adapter boundary.
//!
//! The [`DisplayApi`] trait is a thin, stateless mapping onto the OS display
//! primitives.  It translates OS return codes into typed outcomes and does
//! nothing else – interpretation (what to change, in what order) belongs to
//! the snapshot builder and the configurator above it.
//!
//! Two protocols live behind this trait and must not be conflated:
//!
//! - **Stage/commit** – mode changes (`stage_mode_change`) are written to a
//!   pending area and become visible only when `commit_staged_changes` runs,
//!   which applies every staged change for every device in one desktop-wide
//!   mode set.
//! - **Immediate** – advanced color (`set_advanced_color`) takes effect right
//!   away; the OS offers no staged variant for it.
//!
//! A refusal to apply a mode ("this panel cannot do 144 Hz") is an expected,
//! common condition, so it is reported as [`ModeChangeStatus::Unsupported`],
//! never as an error.
//!
//! # Testability
//!
//! The production implementation is [`windows::WindowsDisplayApi`]; tests use
//! [`mock::FakeDisplayApi`], which honours the same stage/commit semantics
//! against an in-memory display set.

use monoswitch_core::{ColorCapability, OutputPath};
use thiserror::Error;

pub mod mock;

#[cfg(target_os = "windows")]
pub mod windows;

/// One enumerated display adapter device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// GDI device name, e.g. `\\.\DISPLAY1`.
    pub device_name: String,
    /// Adapter description string.
    pub device_string: String,
    /// `true` if the device is part of the desktop.  Detached devices are
    /// still enumerated (they occupy an index) but carry no mode.
    pub attached_to_desktop: bool,
    pub is_primary: bool,
}

/// A display mode as staged or queried: resolution, desktop position, rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMode {
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    pub refresh_hz: u32,
}

/// One active source→target path from the extended display topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathInfo {
    /// Source identifier; correlates with the GDI enumeration index.
    pub source_id: u32,
    /// Adapter/target pair used for per-output device-info calls.
    pub output: OutputPath,
}

/// How a mode change is staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageOptions {
    /// Also mark the device as the primary display.
    pub set_primary: bool,
    /// Validate feasibility only; stage nothing.
    pub test_only: bool,
}

/// Outcome of a stage (or test-stage) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChangeStatus {
    Applied,
    /// The device cannot run the requested mode.  Expected and common; the
    /// caller decides how to degrade.
    Unsupported,
}

/// Error type for native display calls.
#[derive(Debug, Error)]
pub enum DisplayApiError {
    /// The OS reports no current mode for an attached device.
    #[error("no active mode reported for device {device}")]
    ModeUnavailable { device: String },

    /// A native call failed; carries the raw OS status code.
    #[error("{call} failed with code {code}")]
    Os { call: &'static str, code: i32 },
}

/// Trait abstracting the OS display enumeration and mutation primitives.
pub trait DisplayApi: Send + Sync {
    /// Pure query of the device at `index`.  `Ok(None)` terminates
    /// enumeration: there is no device at this or any higher index.
    fn enumerate_display(&self, index: u32) -> Result<Option<DeviceInfo>, DisplayApiError>;

    /// Current mode of an attached device.
    ///
    /// # Errors
    ///
    /// [`DisplayApiError::ModeUnavailable`] when the OS reports no mode.
    fn current_mode(&self, device_name: &str) -> Result<DeviceMode, DisplayApiError>;

    /// Currently active source→target paths.
    fn query_active_paths(&self) -> Result<Vec<PathInfo>, DisplayApiError>;

    /// GDI device name the path's source maps to.
    fn query_source_name(&self, path: &PathInfo) -> Result<String, DisplayApiError>;

    /// Monitor friendly name for the path's target (may be empty).
    fn query_target_name(&self, path: &PathInfo) -> Result<String, DisplayApiError>;

    /// Advanced color capability and state for the path's target.
    fn query_color_info(&self, path: &PathInfo) -> Result<ColorCapability, DisplayApiError>;

    /// Writes a mode change to the staging area (or, with
    /// `StageOptions::test_only`, validates it without staging).
    fn stage_mode_change(
        &self,
        device_name: &str,
        mode: &DeviceMode,
        options: StageOptions,
    ) -> Result<ModeChangeStatus, DisplayApiError>;

    /// Makes all previously staged changes visible in one atomic step.
    fn commit_staged_changes(&self) -> Result<(), DisplayApiError>;

    /// Switches advanced color on or off for one output.  Immediate; not
    /// part of the stage/commit pipeline.
    fn set_advanced_color(&self, output: &OutputPath, enable: bool)
        -> Result<(), DisplayApiError>;
}
