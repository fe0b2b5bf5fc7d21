//! GPX export of recorded points.
//!
//! Output is one `<trk>` with one `<trkseg>`, one `<trkpt>` per input point in
//! the order given. Floats are written with Rust's shortest round-trip formatting,
//! so parsing the output again yields bit-identical coordinates.

use std::io::Write;

use chrono::SecondsFormat;
use quick_xml::escape::escape;

use crate::{ExportError, TrackPoint};

/// File extension for exported tracks.
pub const GPX_EXTENSION: &str = "gpx";

/// Configuration for GPX export.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportConfig {
    /// Value of the `creator` attribute on the root element.
    /// Default: "Trail Navigator"
    pub creator: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            creator: "Trail Navigator".to_string(),
        }
    }
}

/// Serialize points into a GPX 1.1 document with the default [`ExportConfig`].
///
/// # Example
/// ```
/// use trail_navigator::{export_track, TrackPoint};
///
/// let gpx = export_track("Morning run", &[TrackPoint::new(45.9, 6.8).with_elevation(1035.0)]).unwrap();
/// assert!(gpx.contains(r#"<trkpt lat="45.9" lon="6.8">"#));
/// assert!(gpx.contains("<ele>1035</ele>"));
/// ```
pub fn export_track(name: &str, points: &[TrackPoint]) -> Result<String, ExportError> {
    export_track_with_config(name, points, &ExportConfig::default())
}

/// Serialize points into a GPX 1.1 document.
///
/// Fails with [`ExportError::NoPoints`] when `points` is empty.
pub fn export_track_with_config(
    name: &str,
    points: &[TrackPoint],
    config: &ExportConfig,
) -> Result<String, ExportError> {
    if points.is_empty() {
        return Err(ExportError::NoPoints);
    }

    let mut gpx = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="{}" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>{}</name>
    <trkseg>
"#,
        escape(config.creator.as_str()),
        escape(name)
    );

    for p in points {
        gpx.push_str(&format!(
            "      <trkpt lat=\"{}\" lon=\"{}\">\n",
            p.latitude, p.longitude
        ));
        if let Some(ele) = p.elevation {
            gpx.push_str(&format!("        <ele>{}</ele>\n", ele));
        }
        if let Some(time) = p.timestamp {
            gpx.push_str(&format!(
                "        <time>{}</time>\n",
                time.to_rfc3339_opts(SecondsFormat::Millis, true)
            ));
        }
        gpx.push_str("      </trkpt>\n");
    }

    gpx.push_str("    </trkseg>\n  </trk>\n</gpx>\n");
    Ok(gpx)
}

/// Write a GPX document for `points` into `writer`.
pub fn write_track<W: Write>(writer: &mut W, name: &str, points: &[TrackPoint]) -> Result<(), ExportError> {
    let gpx = export_track(name, points)?;
    writer.write_all(gpx.as_bytes())?;
    Ok(())
}

/// File name for an exported track: `base` plus the GPX extension.
pub fn gpx_filename(base: &str) -> String {
    format!("{}.{}", base, GPX_EXTENSION)
}
