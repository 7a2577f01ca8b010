//! Display records and snapshots.
//!
//! A `DisplaySnapshot` is a fully-enumerated, internally consistent view of
//! all attached displays at one instant.  Snapshots are rebuilt in full for
//! every query or mutation; records are never partially mutated in place, so
//! from a caller's perspective a snapshot is atomic even though producing one
//! requires several sequential native calls.
//!
//! `display_id` is an enumeration ordinal: it equals the OS device index at
//! which the attached display was found.  It is stable only within a single
//! snapshot – a display may be attached or detached between snapshots.

use std::fmt;

/// Position and size of a display in desktop coordinates.
///
/// The primary display is always at (0, 0); other displays may have negative
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// X coordinate of the top-left corner (may be negative).
    pub x: i32,
    /// Y coordinate of the top-left corner (may be negative).
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Geometry {
    /// Returns this geometry moved by (dx, dy).
    pub fn shifted(&self, dx: i32, dy: i32) -> Geometry {
        Geometry {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

/// Advanced color (HDR / wide gamut) capability and state for one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorCapability {
    /// `true` if the output can be switched into advanced color mode.
    pub supports_advanced_color: bool,
    /// `true` if advanced color is currently enabled.
    pub advanced_color_enabled: bool,
    /// Bits per color channel currently in use.
    pub bits_per_channel: u32,
}

/// Adapter/target identifier pair for one active output.
///
/// This is the correlation key the OS uses for per-output device-info calls
/// (advanced color get/set).  Kept as plain integers so no raw FFI type leaks
/// out of the native adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputPath {
    pub adapter_id: u64,
    pub target_id: u32,
}

/// One physical/logical display as currently known to the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRecord {
    /// Enumeration ordinal; stable only within one snapshot.
    pub display_id: u32,
    /// GDI adapter device name, e.g. `\\.\DISPLAY1`.
    pub adapter_device_name: String,
    /// Human-readable monitor name (EDID friendly name when available).
    pub friendly_monitor_name: String,
    pub is_attached: bool,
    pub is_primary: bool,
    pub geometry: Geometry,
    pub refresh_rate_hz: u32,
    /// Advanced color info; `None` when the output had no active path data.
    pub color: Option<ColorCapability>,
    /// Output correlation key; `None` when the output had no active path data.
    pub output: Option<OutputPath>,
}

impl fmt::Display for DisplayRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "display {}: {} (\"{}\"){} {}x{} at ({}, {}), {} Hz",
            self.display_id,
            self.adapter_device_name,
            self.friendly_monitor_name,
            if self.is_primary { " [primary]" } else { "" },
            self.geometry.width,
            self.geometry.height,
            self.geometry.x,
            self.geometry.y,
            self.refresh_rate_hz,
        )?;
        match &self.color {
            Some(c) if c.supports_advanced_color => write!(
                f,
                ", HDR {} ({} bpc)",
                if c.advanced_color_enabled { "on" } else { "off" },
                c.bits_per_channel,
            ),
            Some(_) => write!(f, ", HDR unsupported"),
            None => Ok(()),
        }
    }
}

/// A fully-enumerated view of all attached displays at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplaySnapshot {
    records: Vec<DisplayRecord>,
}

impl DisplaySnapshot {
    pub fn new(records: Vec<DisplayRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[DisplayRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [DisplayRecord] {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, display_id: u32) -> Option<&DisplayRecord> {
        self.records.iter().find(|r| r.display_id == display_id)
    }

    pub fn find_mut(&mut self, display_id: u32) -> Option<&mut DisplayRecord> {
        self.records.iter_mut().find(|r| r.display_id == display_id)
    }

    /// The record currently marked primary.
    ///
    /// Whenever at least one display is attached, exactly one record is
    /// primary; `has_single_primary` checks that invariant.
    pub fn primary(&self) -> Option<&DisplayRecord> {
        self.records.iter().find(|r| r.is_primary)
    }

    pub fn has_single_primary(&self) -> bool {
        self.records.iter().filter(|r| r.is_primary).count() == 1
    }
}

impl fmt::Display for DisplaySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.records.is_empty() {
            return write!(f, "no attached displays");
        }
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{record}")?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, x: i32, y: i32, primary: bool) -> DisplayRecord {
        DisplayRecord {
            display_id: id,
            adapter_device_name: format!("\\\\.\\DISPLAY{}", id + 1),
            friendly_monitor_name: format!("Monitor {id}"),
            is_attached: true,
            is_primary: primary,
            geometry: Geometry {
                x,
                y,
                width: 1920,
                height: 1080,
            },
            refresh_rate_hz: 60,
            color: None,
            output: None,
        }
    }

    #[test]
    fn test_shifted_moves_origin() {
        let g = Geometry {
            x: 1920,
            y: 1080,
            width: 2560,
            height: 1440,
        };
        let moved = g.shifted(-1920, -1080);
        assert_eq!(moved.x, 0);
        assert_eq!(moved.y, 0);
        assert_eq!(moved.width, 2560);
        assert_eq!(moved.height, 1440);
    }

    #[test]
    fn test_find_returns_matching_record() {
        let snapshot = DisplaySnapshot::new(vec![record(0, 0, 0, true), record(2, 1920, 0, false)]);
        assert_eq!(snapshot.find(2).unwrap().geometry.x, 1920);
        assert!(snapshot.find(1).is_none());
    }

    #[test]
    fn test_primary_invariant_helper() {
        let good = DisplaySnapshot::new(vec![record(0, 0, 0, true), record(1, 1920, 0, false)]);
        assert!(good.has_single_primary());
        assert_eq!(good.primary().unwrap().display_id, 0);

        let bad = DisplaySnapshot::new(vec![record(0, 0, 0, true), record(1, 1920, 0, true)]);
        assert!(!bad.has_single_primary());
    }

    #[test]
    fn test_display_dump_mentions_every_display() {
        let mut with_hdr = record(1, 1920, 0, false);
        with_hdr.color = Some(ColorCapability {
            supports_advanced_color: true,
            advanced_color_enabled: false,
            bits_per_channel: 10,
        });
        let snapshot = DisplaySnapshot::new(vec![record(0, 0, 0, true), with_hdr]);
        let dump = snapshot.to_string();
        assert!(dump.contains("display 0"));
        assert!(dump.contains("[primary]"));
        assert!(dump.contains("HDR off (10 bpc)"));
    }

    #[test]
    fn test_empty_snapshot_dump() {
        assert_eq!(DisplaySnapshot::default().to_string(), "no attached displays");
    }
}
