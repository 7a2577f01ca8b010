//! TOML-based configuration for the MonoSwitch daemon.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\MonoSwitch\config.toml`
//! - Linux:    `~/.config/monoswitch/config.toml`
//! - macOS:    `~/Library/Application Support/MonoSwitch/config.toml`
//!
//! The file holds the daemon settings plus the full profile list.  A profile
//! entry looks like:
//!
//! ```toml
//! [[profiles]]
//! id = 1
//! name = "Docked"
//! hotkey = "Ctrl+Alt+1"
//!
//! [[profiles.displays]]
//! display_id = 0
//! primary = true
//! refresh_rate_hz = 144
//! hdr = true
//! ```
//!
//! Any field omitted from a display entry means "leave that attribute
//! unchanged" when the profile is applied.
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file, so the daemon
//! works on first run (before a config file exists) and when upgrading from
//! an older file that is missing newer fields.
//!
//! Profiles are parsed into [`monoswitch_core::Profile`] values and validated
//! once at startup; the rest of the system only ever sees the validated,
//! immutable result.

use std::path::PathBuf;

use monoswitch_core::{
    validate_profiles, DisplaySetting, KeyCombination, KeyParseError, Profile,
    ProfileValidationError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A profile's hotkey string is not a valid combination.
    #[error("profile {profile} has an invalid hotkey: {source}")]
    InvalidHotkey {
        profile: u32,
        #[source]
        source: KeyParseError,
    },

    /// The profile set violates a uniqueness rule.
    #[error(transparent)]
    Invalid(#[from] ProfileValidationError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub profiles: Vec<ProfileEntry>,
}

/// General daemon behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How long an activation waits for a concurrent activation to finish
    /// before declining, in milliseconds.
    #[serde(default = "default_activation_timeout_ms")]
    pub activation_timeout_ms: u64,
}

/// One profile as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileEntry {
    pub id: u32,
    pub name: String,
    /// Global hotkey, e.g. `"Ctrl+Alt+1"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotkey: Option<String>,
    #[serde(default)]
    pub displays: Vec<DisplayEntry>,
}

/// Desired settings for one display within a profile entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DisplayEntry {
    pub display_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_rate_hz: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdr: Option<bool>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_activation_timeout_ms() -> u64 {
    2000
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            activation_timeout_ms: default_activation_timeout_ms(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from disk, returning `AppConfig::default()` if the file
/// does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = config_file_path()?;

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to disk, creating the config directory if needed.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Converts the raw config entries into validated domain profiles.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidHotkey`] for an unparseable hotkey string
/// and [`ConfigError::Invalid`] when the set violates a uniqueness rule.
pub fn profiles_from_config(config: &AppConfig) -> Result<Vec<Profile>, ConfigError> {
    let mut profiles = Vec::with_capacity(config.profiles.len());
    for entry in &config.profiles {
        let hot_key = entry
            .hotkey
            .as_deref()
            .map(KeyCombination::parse)
            .transpose()
            .map_err(|source| ConfigError::InvalidHotkey {
                profile: entry.id,
                source,
            })?;
        profiles.push(Profile {
            id: entry.id,
            name: entry.name.clone(),
            hot_key,
            display_settings: entry
                .displays
                .iter()
                .map(|d| DisplaySetting {
                    display_id: d.display_id,
                    primary: d.primary,
                    enable_hdr: d.hdr,
                    refresh_rate_hz: d.refresh_rate_hz,
                })
                .collect(),
        });
    }
    validate_profiles(&profiles)?;
    Ok(profiles)
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %APPDATA% e.g. C:\Users\<user>\AppData\Roaming
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("MonoSwitch"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("monoswitch"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("MonoSwitch")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use monoswitch_core::{Key, Modifiers};

    const SAMPLE: &str = r#"
[daemon]
log_level = "debug"

[[profiles]]
id = 1
name = "Docked"
hotkey = "Ctrl+Alt+1"

[[profiles.displays]]
display_id = 0
primary = true
refresh_rate_hz = 144
hdr = true

[[profiles.displays]]
display_id = 1
refresh_rate_hz = 60

[[profiles]]
id = 2
name = "Presentation"
"#;

    #[test]
    fn test_sample_config_parses_and_converts() {
        let cfg: AppConfig = toml::from_str(SAMPLE).expect("parse");
        assert_eq!(cfg.daemon.log_level, "debug");
        // Unspecified fields keep their defaults
        assert_eq!(cfg.daemon.activation_timeout_ms, 2000);

        let profiles = profiles_from_config(&cfg).expect("convert");
        assert_eq!(profiles.len(), 2);

        let docked = &profiles[0];
        assert_eq!(
            docked.hot_key,
            Some(KeyCombination::new(
                Modifiers::none()
                    .with(Modifiers::CONTROL)
                    .with(Modifiers::ALT),
                Key('1' as u32),
            ))
        );
        assert_eq!(docked.display_settings[0].primary, Some(true));
        assert_eq!(docked.display_settings[0].enable_hdr, Some(true));
        assert_eq!(docked.display_settings[1].refresh_rate_hz, Some(60));
        assert_eq!(docked.display_settings[1].primary, None);

        assert!(profiles[1].hot_key.is_none());
        assert!(profiles[1].display_settings.is_empty());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("parse empty");
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.daemon.log_level, "info");
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn test_invalid_hotkey_is_reported_with_profile_id() {
        let cfg: AppConfig = toml::from_str(
            r#"
[[profiles]]
id = 9
name = "Broken"
hotkey = "Hyper+Q"
"#,
        )
        .expect("parse");

        let err = profiles_from_config(&cfg).expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidHotkey { profile: 9, .. }));
    }

    #[test]
    fn test_duplicate_hotkeys_are_rejected() {
        let cfg: AppConfig = toml::from_str(
            r#"
[[profiles]]
id = 1
name = "A"
hotkey = "Ctrl+Alt+1"

[[profiles]]
id = 2
name = "B"
hotkey = "Ctrl+Alt+1"
"#,
        )
        .expect("parse");

        let err = profiles_from_config(&cfg).expect_err("must fail");
        assert!(matches!(
            err,
            ConfigError::Invalid(ProfileValidationError::DuplicateHotkey { .. })
        ));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let cfg = AppConfig {
            daemon: DaemonConfig {
                log_level: "trace".to_string(),
                activation_timeout_ms: 500,
            },
            profiles: vec![ProfileEntry {
                id: 3,
                name: "Gaming".to_string(),
                hotkey: Some("Ctrl+Shift+G".to_string()),
                displays: vec![DisplayEntry {
                    display_id: 1,
                    primary: Some(true),
                    refresh_rate_hz: Some(240),
                    hdr: None,
                }],
            }],
        };

        let text = toml::to_string_pretty(&cfg).expect("serialize");
        // None fields must be omitted entirely
        assert!(!text.contains("hdr"));
        let restored: AppConfig = toml::from_str(&text).expect("deserialize");
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let result: Result<AppConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }
}
