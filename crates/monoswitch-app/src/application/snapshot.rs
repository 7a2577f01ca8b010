//! Display snapshot builder.
//!
//! Produces a complete, internally consistent [`DisplaySnapshot`] in one
//! logical operation.  The OS does not guarantee a previous view stays valid
//! after a mode change, so callers re-run this immediately before AND after
//! any mutation; snapshots are never cached.
//!
//! The build is a three-step merge:
//!
//! 1. Walk device indexes from 0 until the adapter reports no device.
//!    Unattached devices keep their index (so `display_id`s line up with
//!    what the OS shows the user) but produce no record.
//! 2. Fetch the current mode of every attached device.  An attached device
//!    with no mode means the OS's own views disagree; there is no safe
//!    partial result, so the whole snapshot fails.
//! 3. Merge the extended topology: for each active path whose source id
//!    matches a collected record, pull the monitor name and advanced color
//!    info.  A path whose source has vanished is skipped with a warning (the
//!    device disappeared mid-query); a path whose reported source name
//!    disagrees with step 1 means the enumeration-order assumption was
//!    violated by a concurrent topology change, which also fails the whole
//!    snapshot.

use monoswitch_core::{DisplayRecord, DisplaySnapshot, Geometry};
use thiserror::Error;
use tracing::{debug, warn};

use crate::infrastructure::display_api::{DisplayApi, DisplayApiError};

/// Error type for snapshot construction.
///
/// `MissingMode` and `SourceNameMismatch` are internal-consistency failures:
/// the OS's enumeration and topology views disagree, and the activation that
/// requested the snapshot must abort.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("display state inconsistent: attached device {device} has no active mode")]
    MissingMode { device: String },

    #[error(
        "display state inconsistent: path source {source_id} reports device {reported} \
         but enumeration recorded {recorded}"
    )]
    SourceNameMismatch {
        source_id: u32,
        reported: String,
        recorded: String,
    },

    #[error(transparent)]
    Api(#[from] DisplayApiError),
}

/// Builds a fresh snapshot of all attached displays.
pub fn take_snapshot(api: &dyn DisplayApi) -> Result<DisplaySnapshot, SnapshotError> {
    let mut records: Vec<DisplayRecord> = Vec::new();

    let mut index = 0u32;
    while let Some(device) = api.enumerate_display(index)? {
        if device.attached_to_desktop {
            let mode = match api.current_mode(&device.device_name) {
                Ok(mode) => mode,
                Err(DisplayApiError::ModeUnavailable { device }) => {
                    return Err(SnapshotError::MissingMode { device });
                }
                Err(e) => return Err(e.into()),
            };
            records.push(DisplayRecord {
                display_id: index,
                adapter_device_name: device.device_name,
                // Adapter description; replaced by the monitor name below
                // when the topology knows better.
                friendly_monitor_name: device.device_string,
                is_attached: true,
                is_primary: device.is_primary,
                geometry: Geometry {
                    x: mode.x,
                    y: mode.y,
                    width: mode.width,
                    height: mode.height,
                },
                refresh_rate_hz: mode.refresh_hz,
                color: None,
                output: None,
            });
        }
        index += 1;
    }

    for path in api.query_active_paths()? {
        let Some(record) = records.iter_mut().find(|r| r.display_id == path.source_id) else {
            warn!(
                source_id = path.source_id,
                "active path references a display that is no longer enumerable; skipping"
            );
            continue;
        };

        let source_name = api.query_source_name(&path)?;
        if source_name != record.adapter_device_name {
            return Err(SnapshotError::SourceNameMismatch {
                source_id: path.source_id,
                reported: source_name,
                recorded: record.adapter_device_name.clone(),
            });
        }

        let target_name = api.query_target_name(&path)?;
        if !target_name.is_empty() {
            record.friendly_monitor_name = target_name;
        }
        record.color = Some(api.query_color_info(&path)?);
        record.output = Some(path.output);
    }

    debug!(displays = records.len(), "snapshot taken");
    Ok(DisplaySnapshot::new(records))
}

/// Human-readable dump of the current display state, for the user to
/// hand-author profile entries against.
pub fn current_display_information(api: &dyn DisplayApi) -> Result<String, SnapshotError> {
    Ok(take_snapshot(api)?.to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::display_api::mock::{FakeDisplay, FakeDisplayApi};

    #[test]
    fn test_snapshot_collects_attached_displays_in_index_order() {
        // Arrange
        let api = FakeDisplayApi::new(vec![
            FakeDisplay::at(0, 0).primary(),
            FakeDisplay::at(1920, 0).refresh(144),
        ]);

        // Act
        let snapshot = take_snapshot(&api).expect("snapshot");

        // Assert
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.records()[0].display_id, 0);
        assert!(snapshot.records()[0].is_primary);
        assert_eq!(snapshot.records()[1].display_id, 1);
        assert_eq!(snapshot.records()[1].refresh_rate_hz, 144);
        assert!(snapshot.has_single_primary());
    }

    #[test]
    fn test_detached_device_keeps_its_index_but_produces_no_record() {
        // Display at index 1 is detached; the display after it must still be
        // known as display 2.
        let api = FakeDisplayApi::new(vec![
            FakeDisplay::at(0, 0).primary(),
            FakeDisplay::at(0, 0).detached(),
            FakeDisplay::at(1920, 0),
        ]);

        let snapshot = take_snapshot(&api).expect("snapshot");

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.find(1).is_none());
        assert_eq!(snapshot.find(2).unwrap().geometry.x, 1920);
    }

    #[test]
    fn test_topology_merge_fills_monitor_name_and_color() {
        let api = FakeDisplayApi::new(vec![FakeDisplay::at(0, 0).primary().hdr(true, true)]);

        let snapshot = take_snapshot(&api).expect("snapshot");

        let record = snapshot.find(0).unwrap();
        assert_eq!(record.friendly_monitor_name, "Fake Monitor 0");
        let color = record.color.expect("color info merged");
        assert!(color.supports_advanced_color);
        assert!(color.advanced_color_enabled);
        assert!(record.output.is_some());
    }

    #[test]
    fn test_display_without_path_keeps_adapter_string_and_no_color() {
        let api = FakeDisplayApi::new(vec![
            FakeDisplay::at(0, 0).primary(),
            FakeDisplay::at(1920, 0).without_path(),
        ]);

        let snapshot = take_snapshot(&api).expect("snapshot");

        let record = snapshot.find(1).unwrap();
        assert!(record.color.is_none());
        assert!(record.output.is_none());
    }

    #[test]
    fn test_missing_mode_is_fatal() {
        let api = FakeDisplayApi::new(vec![FakeDisplay::at(0, 0).primary()]);
        api.fail_mode_query(0);

        let err = take_snapshot(&api).expect_err("must fail");

        assert!(matches!(err, SnapshotError::MissingMode { .. }));
    }

    #[test]
    fn test_source_name_mismatch_is_fatal() {
        let api = FakeDisplayApi::new(vec![FakeDisplay::at(0, 0).primary()]);
        api.misreport_source(0, "\\\\.\\DISPLAY9");

        let err = take_snapshot(&api).expect_err("must fail");

        assert!(matches!(
            err,
            SnapshotError::SourceNameMismatch { source_id: 0, .. }
        ));
    }

    #[test]
    fn test_orphan_path_is_skipped_not_fatal() {
        let api = FakeDisplayApi::new(vec![FakeDisplay::at(0, 0).primary()]);
        api.add_orphan_path(5);

        let snapshot = take_snapshot(&api).expect("snapshot despite orphan path");

        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_information_dump_lists_displays() {
        let api = FakeDisplayApi::new(vec![FakeDisplay::at(0, 0).primary()]);

        let dump = current_display_information(&api).expect("dump");

        assert!(dump.contains("display 0"));
        assert!(dump.contains("[primary]"));
    }
}
