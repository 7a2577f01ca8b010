//! Windows display configuration adapter.
//!
//! Maps the [`DisplayApi`](super::DisplayApi) contract onto the Win32 display
//! primitives: `EnumDisplayDevicesW` / `EnumDisplaySettingsExW` for the GDI
//! view, `ChangeDisplaySettingsExW` for the stage/commit mode pipeline, and
//! the `QueryDisplayConfig` / `DisplayConfig{Get,Set}DeviceInfo` family for
//! topology paths and advanced color.
//!
//! Staging uses `CDS_UPDATEREGISTRY | CDS_NORESET` (write the registry,
//! change nothing on screen), optionally with `CDS_SET_PRIMARY`; a commit is
//! a `ChangeDisplaySettingsExW` call with a null device and no mode, which
//! applies every pending registry write in one desktop-wide mode set.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.  No raw
//! Win32 type escapes this module.

#![cfg(target_os = "windows")]

use monoswitch_core::{ColorCapability, OutputPath};
use windows::core::PCWSTR;
use windows::Win32::Devices::Display::{
    DisplayConfigGetDeviceInfo, DisplayConfigSetDeviceInfo, GetDisplayConfigBufferSizes,
    QueryDisplayConfig, DISPLAYCONFIG_DEVICE_INFO_GET_ADVANCED_COLOR_INFO,
    DISPLAYCONFIG_DEVICE_INFO_GET_SOURCE_NAME, DISPLAYCONFIG_DEVICE_INFO_GET_TARGET_NAME,
    DISPLAYCONFIG_DEVICE_INFO_HEADER, DISPLAYCONFIG_DEVICE_INFO_SET_ADVANCED_COLOR_STATE,
    DISPLAYCONFIG_DEVICE_INFO_TYPE, DISPLAYCONFIG_GET_ADVANCED_COLOR_INFO,
    DISPLAYCONFIG_MODE_INFO, DISPLAYCONFIG_PATH_INFO, DISPLAYCONFIG_SET_ADVANCED_COLOR_STATE,
    DISPLAYCONFIG_SOURCE_DEVICE_NAME, DISPLAYCONFIG_TARGET_DEVICE_NAME, QDC_ONLY_ACTIVE_PATHS,
};
use windows::Win32::Foundation::{ERROR_SUCCESS, LUID, POINTL};
use windows::Win32::Graphics::Gdi::{
    ChangeDisplaySettingsExW, EnumDisplayDevicesW, EnumDisplaySettingsExW, CDS_NORESET,
    CDS_SET_PRIMARY, CDS_TEST, CDS_TYPE, CDS_UPDATEREGISTRY, DEVMODEW, DISPLAY_DEVICEW,
    DISP_CHANGE_BADMODE, DISP_CHANGE_SUCCESSFUL, DM_DISPLAYFREQUENCY, DM_PELSHEIGHT,
    DM_PELSWIDTH, DM_POSITION, ENUM_CURRENT_SETTINGS, ENUM_DISPLAY_SETTINGS_FLAGS,
};

use super::{
    DeviceInfo, DeviceMode, DisplayApi, DisplayApiError, ModeChangeStatus, PathInfo, StageOptions,
};

const DISPLAY_DEVICE_ATTACHED_TO_DESKTOP: u32 = 0x0000_0001;
const DISPLAY_DEVICE_PRIMARY_DEVICE: u32 = 0x0000_0004;

/// Bit layout of `DISPLAYCONFIG_GET_ADVANCED_COLOR_INFO.value`.
const ADVANCED_COLOR_SUPPORTED: u32 = 0x1;
const ADVANCED_COLOR_ENABLED: u32 = 0x2;

/// Windows implementation of [`DisplayApi`].  Stateless; every call maps to
/// exactly one native call (plus the buffer-size handshake for topology
/// queries).
pub struct WindowsDisplayApi;

impl WindowsDisplayApi {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsDisplayApi {
    fn default() -> Self {
        Self::new()
    }
}

fn wide_trimmed(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn split_adapter_id(adapter_id: u64) -> LUID {
    LUID {
        LowPart: (adapter_id & 0xFFFF_FFFF) as u32,
        HighPart: (adapter_id >> 32) as i32,
    }
}

fn join_adapter_id(luid: LUID) -> u64 {
    ((luid.HighPart as u32 as u64) << 32) | luid.LowPart as u64
}

fn device_info_header(
    ty: DISPLAYCONFIG_DEVICE_INFO_TYPE,
    size: usize,
    adapter_id: u64,
    id: u32,
) -> DISPLAYCONFIG_DEVICE_INFO_HEADER {
    DISPLAYCONFIG_DEVICE_INFO_HEADER {
        r#type: ty,
        size: size as u32,
        adapterId: split_adapter_id(adapter_id),
        id,
    }
}

impl DisplayApi for WindowsDisplayApi {
    fn enumerate_display(&self, index: u32) -> Result<Option<DeviceInfo>, DisplayApiError> {
        let mut device = DISPLAY_DEVICEW {
            cb: std::mem::size_of::<DISPLAY_DEVICEW>() as u32,
            ..Default::default()
        };
        // SAFETY: `device` is a properly sized DISPLAY_DEVICEW; a null device
        // name enumerates display adapters by index.
        let found = unsafe { EnumDisplayDevicesW(PCWSTR::null(), index, &mut device, 0) };
        if !found.as_bool() {
            // No device at this or any higher index: enumeration is over.
            return Ok(None);
        }
        Ok(Some(DeviceInfo {
            device_name: wide_trimmed(&device.DeviceName),
            device_string: wide_trimmed(&device.DeviceString),
            attached_to_desktop: device.StateFlags & DISPLAY_DEVICE_ATTACHED_TO_DESKTOP != 0,
            is_primary: device.StateFlags & DISPLAY_DEVICE_PRIMARY_DEVICE != 0,
        }))
    }

    fn current_mode(&self, device_name: &str) -> Result<DeviceMode, DisplayApiError> {
        let wide = to_wide(device_name);
        let mut devmode = DEVMODEW {
            dmSize: std::mem::size_of::<DEVMODEW>() as u16,
            ..Default::default()
        };
        // SAFETY: `wide` is a nul-terminated UTF-16 string that outlives the
        // call; `devmode` has dmSize initialised as the API requires.
        let ok = unsafe {
            EnumDisplaySettingsExW(
                PCWSTR(wide.as_ptr()),
                ENUM_CURRENT_SETTINGS,
                &mut devmode,
                ENUM_DISPLAY_SETTINGS_FLAGS(0),
            )
        };
        if !ok.as_bool() {
            return Err(DisplayApiError::ModeUnavailable {
                device: device_name.to_string(),
            });
        }
        // SAFETY: for display devices the union selects the printer-free
        // layout whose first member is dmPosition.
        let position = unsafe { devmode.Anonymous1.Anonymous2.dmPosition };
        Ok(DeviceMode {
            width: devmode.dmPelsWidth,
            height: devmode.dmPelsHeight,
            x: position.x,
            y: position.y,
            refresh_hz: devmode.dmDisplayFrequency,
        })
    }

    fn query_active_paths(&self) -> Result<Vec<PathInfo>, DisplayApiError> {
        let mut num_paths = 0u32;
        let mut num_modes = 0u32;
        // SAFETY: out-parameters are valid pointers to zeroed counters.
        let rc = unsafe {
            GetDisplayConfigBufferSizes(QDC_ONLY_ACTIVE_PATHS, &mut num_paths, &mut num_modes)
        };
        if rc != ERROR_SUCCESS {
            return Err(DisplayApiError::Os {
                call: "GetDisplayConfigBufferSizes",
                code: rc.0 as i32,
            });
        }

        let mut paths = vec![DISPLAYCONFIG_PATH_INFO::default(); num_paths as usize];
        let mut modes = vec![DISPLAYCONFIG_MODE_INFO::default(); num_modes as usize];
        // SAFETY: the buffers were sized by the call above; the API shrinks
        // the counters if fewer elements were written.
        let rc = unsafe {
            QueryDisplayConfig(
                QDC_ONLY_ACTIVE_PATHS,
                &mut num_paths,
                paths.as_mut_ptr(),
                &mut num_modes,
                modes.as_mut_ptr(),
                None,
            )
        };
        if rc != ERROR_SUCCESS {
            return Err(DisplayApiError::Os {
                call: "QueryDisplayConfig",
                code: rc.0 as i32,
            });
        }
        paths.truncate(num_paths as usize);

        Ok(paths
            .iter()
            .map(|p| PathInfo {
                source_id: p.sourceInfo.id,
                output: OutputPath {
                    adapter_id: join_adapter_id(p.targetInfo.adapterId),
                    target_id: p.targetInfo.id,
                },
            })
            .collect())
    }

    fn query_source_name(&self, path: &PathInfo) -> Result<String, DisplayApiError> {
        let mut info = DISPLAYCONFIG_SOURCE_DEVICE_NAME {
            header: device_info_header(
                DISPLAYCONFIG_DEVICE_INFO_GET_SOURCE_NAME,
                std::mem::size_of::<DISPLAYCONFIG_SOURCE_DEVICE_NAME>(),
                path.output.adapter_id,
                path.source_id,
            ),
            ..Default::default()
        };
        // SAFETY: the header describes the enclosing struct's type and size.
        let rc = unsafe { DisplayConfigGetDeviceInfo(&mut info.header) };
        if rc != 0 {
            return Err(DisplayApiError::Os {
                call: "DisplayConfigGetDeviceInfo(source name)",
                code: rc,
            });
        }
        Ok(wide_trimmed(&info.viewGdiDeviceName))
    }

    fn query_target_name(&self, path: &PathInfo) -> Result<String, DisplayApiError> {
        let mut info = DISPLAYCONFIG_TARGET_DEVICE_NAME {
            header: device_info_header(
                DISPLAYCONFIG_DEVICE_INFO_GET_TARGET_NAME,
                std::mem::size_of::<DISPLAYCONFIG_TARGET_DEVICE_NAME>(),
                path.output.adapter_id,
                path.output.target_id,
            ),
            ..Default::default()
        };
        // SAFETY: the header describes the enclosing struct's type and size.
        let rc = unsafe { DisplayConfigGetDeviceInfo(&mut info.header) };
        if rc != 0 {
            return Err(DisplayApiError::Os {
                call: "DisplayConfigGetDeviceInfo(target name)",
                code: rc,
            });
        }
        Ok(wide_trimmed(&info.monitorFriendlyDeviceName))
    }

    fn query_color_info(&self, path: &PathInfo) -> Result<ColorCapability, DisplayApiError> {
        let mut info = DISPLAYCONFIG_GET_ADVANCED_COLOR_INFO {
            header: device_info_header(
                DISPLAYCONFIG_DEVICE_INFO_GET_ADVANCED_COLOR_INFO,
                std::mem::size_of::<DISPLAYCONFIG_GET_ADVANCED_COLOR_INFO>(),
                path.output.adapter_id,
                path.output.target_id,
            ),
            ..Default::default()
        };
        // SAFETY: the header describes the enclosing struct's type and size.
        let rc = unsafe { DisplayConfigGetDeviceInfo(&mut info.header) };
        if rc != 0 {
            return Err(DisplayApiError::Os {
                call: "DisplayConfigGetDeviceInfo(advanced color)",
                code: rc,
            });
        }
        // SAFETY: reading the raw bitfield view of the union.
        let flags = unsafe { info.Anonymous.value };
        Ok(ColorCapability {
            supports_advanced_color: flags & ADVANCED_COLOR_SUPPORTED != 0,
            advanced_color_enabled: flags & ADVANCED_COLOR_ENABLED != 0,
            bits_per_channel: info.bitsPerColorChannel,
        })
    }

    fn stage_mode_change(
        &self,
        device_name: &str,
        mode: &DeviceMode,
        options: StageOptions,
    ) -> Result<ModeChangeStatus, DisplayApiError> {
        let wide = to_wide(device_name);
        let mut devmode = DEVMODEW {
            dmSize: std::mem::size_of::<DEVMODEW>() as u16,
            dmFields: DM_POSITION | DM_PELSWIDTH | DM_PELSHEIGHT | DM_DISPLAYFREQUENCY,
            dmPelsWidth: mode.width,
            dmPelsHeight: mode.height,
            dmDisplayFrequency: mode.refresh_hz,
            ..Default::default()
        };
        // SAFETY: writing the display-device member of the union; dmFields
        // declares DM_POSITION so the API reads this layout.
        unsafe {
            devmode.Anonymous1.Anonymous2.dmPosition = POINTL {
                x: mode.x,
                y: mode.y,
            };
        }

        let flags = if options.test_only {
            CDS_TEST
        } else if options.set_primary {
            CDS_SET_PRIMARY | CDS_UPDATEREGISTRY | CDS_NORESET
        } else {
            CDS_UPDATEREGISTRY | CDS_NORESET
        };

        // SAFETY: `wide` and `devmode` outlive the call; hwnd and lparam are
        // reserved and must be null.
        let rc = unsafe {
            ChangeDisplaySettingsExW(PCWSTR(wide.as_ptr()), Some(&devmode), None, flags, None)
        };
        if rc == DISP_CHANGE_SUCCESSFUL {
            Ok(ModeChangeStatus::Applied)
        } else if rc == DISP_CHANGE_BADMODE {
            Ok(ModeChangeStatus::Unsupported)
        } else {
            Err(DisplayApiError::Os {
                call: "ChangeDisplaySettingsExW",
                code: rc.0,
            })
        }
    }

    fn commit_staged_changes(&self) -> Result<(), DisplayApiError> {
        // SAFETY: a null device with no mode applies all pending registry
        // writes in one desktop-wide mode set.
        let rc = unsafe { ChangeDisplaySettingsExW(PCWSTR::null(), None, None, CDS_TYPE(0), None) };
        if rc != DISP_CHANGE_SUCCESSFUL {
            return Err(DisplayApiError::Os {
                call: "ChangeDisplaySettingsExW(commit)",
                code: rc.0,
            });
        }
        Ok(())
    }

    fn set_advanced_color(
        &self,
        output: &OutputPath,
        enable: bool,
    ) -> Result<(), DisplayApiError> {
        let mut state = DISPLAYCONFIG_SET_ADVANCED_COLOR_STATE {
            header: device_info_header(
                DISPLAYCONFIG_DEVICE_INFO_SET_ADVANCED_COLOR_STATE,
                std::mem::size_of::<DISPLAYCONFIG_SET_ADVANCED_COLOR_STATE>(),
                output.adapter_id,
                output.target_id,
            ),
            ..Default::default()
        };
        // SAFETY: writing the raw bitfield view; bit 0 is enableAdvancedColor.
        unsafe {
            state.Anonymous.value = u32::from(enable);
        }
        // SAFETY: the header describes the enclosing struct's type and size.
        let rc = unsafe { DisplayConfigSetDeviceInfo(&state.header) };
        if rc != 0 {
            return Err(DisplayApiError::Os {
                call: "DisplayConfigSetDeviceInfo(advanced color)",
                code: rc,
            });
        }
        Ok(())
    }
}
