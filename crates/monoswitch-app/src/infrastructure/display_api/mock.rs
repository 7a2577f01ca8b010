//! Fake display adapter for unit testing.
//!
//! Models an in-memory display set with the same observable semantics as the
//! OS: staged mode changes stay invisible until `commit_staged_changes`,
//! advanced color flips immediately, and enumeration walks device indexes in
//! order.  Every mutating call is recorded so tests can assert exact call
//! counts (idempotence, batching, no-ops).
//!
//! Faults can be scripted per device: refresh rates the "hardware" refuses,
//! devices that report no mode, paths whose source name disagrees with the
//! enumeration, and orphan paths whose source has disappeared.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use monoswitch_core::{ColorCapability, OutputPath};

use super::{
    DeviceInfo, DeviceMode, DisplayApi, DisplayApiError, ModeChangeStatus, PathInfo, StageOptions,
};

/// Scripted state for one fake display device.
#[derive(Debug, Clone)]
pub struct FakeDisplay {
    pub device_name: String,
    pub monitor_name: String,
    pub attached: bool,
    pub primary: bool,
    pub mode: DeviceMode,
    /// Whether the device appears in the extended topology.
    pub has_path: bool,
    pub color: ColorCapability,
}

impl FakeDisplay {
    /// A 1920x1080 @ 60 Hz attached display at the given position.
    /// The device name is assigned from the slot index by [`FakeDisplayApi::new`].
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            device_name: String::new(),
            monitor_name: String::new(),
            attached: true,
            primary: false,
            mode: DeviceMode {
                width: 1920,
                height: 1080,
                x,
                y,
                refresh_hz: 60,
            },
            has_path: true,
            color: ColorCapability {
                supports_advanced_color: false,
                advanced_color_enabled: false,
                bits_per_channel: 8,
            },
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn refresh(mut self, hz: u32) -> Self {
        self.mode.refresh_hz = hz;
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.mode.width = width;
        self.mode.height = height;
        self
    }

    pub fn hdr(mut self, supported: bool, enabled: bool) -> Self {
        self.color = ColorCapability {
            supports_advanced_color: supported,
            advanced_color_enabled: enabled,
            bits_per_channel: if supported { 10 } else { 8 },
        };
        self
    }

    pub fn detached(mut self) -> Self {
        self.attached = false;
        self
    }

    pub fn without_path(mut self) -> Self {
        self.has_path = false;
        self
    }
}

/// One recorded stage (or test-stage) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCall {
    pub device: String,
    pub mode: DeviceMode,
    pub set_primary: bool,
}

#[derive(Debug, Default)]
struct CallLog {
    stage_calls: Vec<StageCall>,
    test_calls: Vec<StageCall>,
    commits: u32,
    color_sets: Vec<(OutputPath, bool)>,
}

#[derive(Debug, Clone)]
struct PendingChange {
    device: String,
    mode: DeviceMode,
    set_primary: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    slots: Vec<FakeDisplay>,
    pending: Vec<PendingChange>,
    unsupported_rates: HashSet<(String, u32)>,
    no_mode_devices: HashSet<String>,
    misreported_sources: HashMap<u32, String>,
    orphan_paths: Vec<PathInfo>,
}

/// A fake implementation of [`DisplayApi`] over an in-memory display set.
pub struct FakeDisplayApi {
    state: Mutex<FakeState>,
    log: Mutex<CallLog>,
}

impl FakeDisplayApi {
    pub fn new(displays: Vec<FakeDisplay>) -> Self {
        let slots = displays
            .into_iter()
            .enumerate()
            .map(|(i, mut d)| {
                if d.device_name.is_empty() {
                    d.device_name = format!("\\\\.\\DISPLAY{}", i + 1);
                }
                if d.monitor_name.is_empty() {
                    d.monitor_name = format!("Fake Monitor {i}");
                }
                d
            })
            .collect();
        Self {
            state: Mutex::new(FakeState {
                slots,
                ..FakeState::default()
            }),
            log: Mutex::new(CallLog::default()),
        }
    }

    // ── Fault scripting ───────────────────────────────────────────────────────

    /// The device at `slot` will refuse `rate` when test-staged.
    pub fn mark_rate_unsupported(&self, slot: usize, rate: u32) {
        let mut state = self.lock_state();
        let name = state.slots[slot].device_name.clone();
        state.unsupported_rates.insert((name, rate));
    }

    /// The device at `slot` will report no active mode.
    pub fn fail_mode_query(&self, slot: usize) {
        let mut state = self.lock_state();
        let name = state.slots[slot].device_name.clone();
        state.no_mode_devices.insert(name);
    }

    /// The path with `source_id` will report `name` as its source device.
    pub fn misreport_source(&self, source_id: u32, name: &str) {
        self.lock_state()
            .misreported_sources
            .insert(source_id, name.to_string());
    }

    /// Adds a path whose source id matches no enumerable display.
    pub fn add_orphan_path(&self, source_id: u32) {
        self.lock_state().orphan_paths.push(PathInfo {
            source_id,
            output: OutputPath {
                adapter_id: 1,
                target_id: 900 + source_id,
            },
        });
    }

    // ── Assertions ────────────────────────────────────────────────────────────

    pub fn display(&self, slot: usize) -> FakeDisplay {
        self.lock_state().slots[slot].clone()
    }

    pub fn stage_call_count(&self) -> usize {
        self.lock_log().stage_calls.len()
    }

    pub fn stage_calls(&self) -> Vec<StageCall> {
        self.lock_log().stage_calls.clone()
    }

    pub fn test_call_count(&self) -> usize {
        self.lock_log().test_calls.len()
    }

    pub fn test_calls(&self) -> Vec<StageCall> {
        self.lock_log().test_calls.clone()
    }

    pub fn commit_count(&self) -> u32 {
        self.lock_log().commits
    }

    pub fn color_set_count(&self) -> usize {
        self.lock_log().color_sets.len()
    }

    pub fn color_sets(&self) -> Vec<(OutputPath, bool)> {
        self.lock_log().color_sets.clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake display state lock poisoned")
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, CallLog> {
        self.log.lock().expect("fake display log lock poisoned")
    }
}

impl DisplayApi for FakeDisplayApi {
    fn enumerate_display(&self, index: u32) -> Result<Option<DeviceInfo>, DisplayApiError> {
        let state = self.lock_state();
        Ok(state.slots.get(index as usize).map(|d| DeviceInfo {
            device_name: d.device_name.clone(),
            device_string: d.monitor_name.clone(),
            attached_to_desktop: d.attached,
            is_primary: d.primary,
        }))
    }

    fn current_mode(&self, device_name: &str) -> Result<DeviceMode, DisplayApiError> {
        let state = self.lock_state();
        if state.no_mode_devices.contains(device_name) {
            return Err(DisplayApiError::ModeUnavailable {
                device: device_name.to_string(),
            });
        }
        state
            .slots
            .iter()
            .find(|d| d.device_name == device_name && d.attached)
            .map(|d| d.mode)
            .ok_or(DisplayApiError::Os {
                call: "current_mode",
                code: -1,
            })
    }

    fn query_active_paths(&self) -> Result<Vec<PathInfo>, DisplayApiError> {
        let state = self.lock_state();
        let mut paths: Vec<PathInfo> = state
            .slots
            .iter()
            .enumerate()
            .filter(|(_, d)| d.attached && d.has_path)
            .map(|(i, _)| PathInfo {
                source_id: i as u32,
                output: OutputPath {
                    adapter_id: 1,
                    target_id: i as u32,
                },
            })
            .collect();
        paths.extend(state.orphan_paths.iter().copied());
        Ok(paths)
    }

    fn query_source_name(&self, path: &PathInfo) -> Result<String, DisplayApiError> {
        let state = self.lock_state();
        if let Some(name) = state.misreported_sources.get(&path.source_id) {
            return Ok(name.clone());
        }
        state
            .slots
            .get(path.source_id as usize)
            .map(|d| d.device_name.clone())
            .ok_or(DisplayApiError::Os {
                call: "query_source_name",
                code: -1,
            })
    }

    fn query_target_name(&self, path: &PathInfo) -> Result<String, DisplayApiError> {
        let state = self.lock_state();
        state
            .slots
            .get(path.source_id as usize)
            .map(|d| d.monitor_name.clone())
            .ok_or(DisplayApiError::Os {
                call: "query_target_name",
                code: -1,
            })
    }

    fn query_color_info(&self, path: &PathInfo) -> Result<ColorCapability, DisplayApiError> {
        let state = self.lock_state();
        state
            .slots
            .get(path.source_id as usize)
            .map(|d| d.color)
            .ok_or(DisplayApiError::Os {
                call: "query_color_info",
                code: -1,
            })
    }

    fn stage_mode_change(
        &self,
        device_name: &str,
        mode: &DeviceMode,
        options: StageOptions,
    ) -> Result<ModeChangeStatus, DisplayApiError> {
        let mut state = self.lock_state();
        let call = StageCall {
            device: device_name.to_string(),
            mode: *mode,
            set_primary: options.set_primary,
        };
        let unsupported = state
            .unsupported_rates
            .contains(&(device_name.to_string(), mode.refresh_hz));

        {
            let mut log = self.lock_log();
            if options.test_only {
                log.test_calls.push(call);
                return Ok(if unsupported {
                    ModeChangeStatus::Unsupported
                } else {
                    ModeChangeStatus::Applied
                });
            }
            log.stage_calls.push(call);
        }

        if unsupported {
            return Ok(ModeChangeStatus::Unsupported);
        }
        state.pending.push(PendingChange {
            device: device_name.to_string(),
            mode: *mode,
            set_primary: options.set_primary,
        });
        Ok(ModeChangeStatus::Applied)
    }

    fn commit_staged_changes(&self) -> Result<(), DisplayApiError> {
        let mut state = self.lock_state();
        let pending = std::mem::take(&mut state.pending);
        for change in pending {
            if change.set_primary {
                for d in &mut state.slots {
                    d.primary = false;
                }
            }
            if let Some(d) = state
                .slots
                .iter_mut()
                .find(|d| d.device_name == change.device)
            {
                d.mode = change.mode;
                if change.set_primary {
                    d.primary = true;
                }
            }
        }
        self.lock_log().commits += 1;
        Ok(())
    }

    fn set_advanced_color(
        &self,
        output: &OutputPath,
        enable: bool,
    ) -> Result<(), DisplayApiError> {
        let mut state = self.lock_state();
        let slot = state
            .slots
            .iter_mut()
            .enumerate()
            .find(|(i, d)| d.has_path && *i as u32 == output.target_id)
            .map(|(_, d)| d)
            .ok_or(DisplayApiError::Os {
                call: "set_advanced_color",
                code: -1,
            })?;
        slot.color.advanced_color_enabled = enable;
        self.lock_log().color_sets.push((*output, enable));
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
