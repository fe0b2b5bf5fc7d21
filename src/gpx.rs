//! GPX document reading.
//!
//! Streams the document with `quick-xml` and collects every `trkpt` in document
//! order. Element names are matched on their local part, so `gpx:trkpt` and
//! `trkpt` are treated alike.
//!
//! Only structural problems are errors: bad nesting, bad attributes, a missing or
//! foreign root element. Missing or unreadable values are tolerated: coordinates
//! fall back to 0.0, and elevation or time becomes absent.

use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::{ParseError, Track, TrackConfig, TrackPoint};

/// Parse a GPX document with the default [`TrackConfig`].
///
/// # Example
/// ```
/// use trail_navigator::parse_track;
///
/// let track = parse_track(r#"<gpx><trk><trkseg>
///     <trkpt lat="45.0" lon="6.0"/>
///     <trkpt lat="45.001" lon="6.0"/>
/// </trkseg></trk></gpx>"#).unwrap();
///
/// assert_eq!(track.name(), "Unnamed Track");
/// assert_eq!(track.distance_km(), 0.11);
/// ```
pub fn parse_track(document: &str) -> Result<Track, ParseError> {
    parse_track_with_config(document, &TrackConfig::default())
}

/// Parse a GPX document into a [`Track`] with its metrics computed.
pub fn parse_track_with_config(document: &str, config: &TrackConfig) -> Result<Track, ParseError> {
    let contents = read_document(document)?;
    let name = contents
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| config.default_name.clone());

    let track = Track::from_points(name, contents.points, config);
    debug!(
        "Parsed GPX '{}': {} points, {:.2}km, +{}m/-{}m",
        track.name(),
        track.points().len(),
        track.distance_km(),
        track.elevation_gain_m(),
        track.elevation_loss_m()
    );
    Ok(track)
}

/// Raw contents pulled out of a document before metrics are computed.
#[derive(Debug, Default)]
struct GpxContents {
    /// Text of the first `<name>` inside a `<trk>`, possibly empty
    name: Option<String>,
    points: Vec<TrackPoint>,
}

/// Which element's text is being collected.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Capture {
    Name,
    Elevation,
    Time,
}

impl Capture {
    fn element(self) -> &'static [u8] {
        match self {
            Capture::Name => b"name",
            Capture::Elevation => b"ele",
            Capture::Time => b"time",
        }
    }
}

fn read_document(document: &str) -> Result<GpxContents, ParseError> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut contents = GpxContents::default();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut seen_root = false;

    let mut current: Option<TrackPoint> = None;
    let mut capture: Option<Capture> = None;
    let mut text = String::new();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => return Err(xml_error(&reader, e)),
        };

        match event {
            Event::Start(e) => {
                let local = e.local_name().as_ref().to_vec();
                check_root(&local, &stack, &mut seen_root)?;

                if local == b"trkpt" {
                    current = Some(read_coordinates(&e, &reader)?);
                } else if capture.is_none() {
                    capture = capture_for(&local, &stack, &contents, current.as_ref());
                    text.clear();
                }
                stack.push(local);
            }
            Event::Empty(e) => {
                let local = e.local_name().as_ref().to_vec();
                check_root(&local, &stack, &mut seen_root)?;

                if local == b"trkpt" {
                    contents.points.push(read_coordinates(&e, &reader)?);
                } else if local == b"name" && in_track(&stack) && contents.name.is_none() {
                    contents.name = Some(String::new());
                }
            }
            Event::End(e) => {
                let local = e.local_name().as_ref().to_vec();
                stack.pop();

                if capture.map(Capture::element) == Some(local.as_slice()) {
                    finish_capture(capture.take(), &text, &mut contents, current.as_mut());
                }
                if local == b"trkpt" {
                    if let Some(point) = current.take() {
                        contents.points.push(point);
                    }
                }
            }
            Event::Text(t) => {
                let value = t.unescape().map_err(|e| xml_error(&reader, e))?;
                if stack.is_empty() {
                    if !value.trim().is_empty() {
                        return Err(ParseError::TrailingContent);
                    }
                } else if capture.is_some() {
                    text.push_str(&value);
                }
            }
            Event::CData(c) => {
                if capture.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::Unclosed(String::from_utf8_lossy(open).into_owned()));
    }
    if !seen_root {
        return Err(ParseError::Empty);
    }

    Ok(contents)
}

fn xml_error(reader: &Reader<&[u8]>, err: impl std::fmt::Display) -> ParseError {
    ParseError::Xml {
        position: reader.buffer_position() as u64,
        message: err.to_string(),
    }
}

/// A new element at depth 0 must be the one and only `<gpx>` root.
fn check_root(local: &[u8], stack: &[Vec<u8>], seen_root: &mut bool) -> Result<(), ParseError> {
    if !stack.is_empty() {
        return Ok(());
    }
    if *seen_root {
        return Err(ParseError::TrailingContent);
    }
    *seen_root = true;
    if local != b"gpx" {
        return Err(ParseError::UnexpectedRoot(String::from_utf8_lossy(local).into_owned()));
    }
    Ok(())
}

fn in_track(stack: &[Vec<u8>]) -> bool {
    stack.iter().any(|el| el == b"trk")
}

fn capture_for(
    local: &[u8],
    stack: &[Vec<u8>],
    contents: &GpxContents,
    point: Option<&TrackPoint>,
) -> Option<Capture> {
    match (local, point) {
        (b"ele", Some(p)) if p.elevation.is_none() => Some(Capture::Elevation),
        (b"time", Some(p)) if p.timestamp.is_none() => Some(Capture::Time),
        (b"name", _) if contents.name.is_none() && in_track(stack) => Some(Capture::Name),
        _ => None,
    }
}

fn finish_capture(
    capture: Option<Capture>,
    text: &str,
    contents: &mut GpxContents,
    point: Option<&mut TrackPoint>,
) {
    let text = text.trim();
    match (capture, point) {
        (Some(Capture::Name), _) => contents.name = Some(text.to_string()),
        (Some(Capture::Elevation), Some(p)) => p.elevation = parse_number(text),
        (Some(Capture::Time), Some(p)) => p.timestamp = parse_time(text),
        _ => {}
    }
}

fn read_coordinates(e: &BytesStart, reader: &Reader<&[u8]>) -> Result<TrackPoint, ParseError> {
    let mut latitude = 0.0;
    let mut longitude = 0.0;

    for attr in e.attributes() {
        let attr = attr.map_err(|err| xml_error(reader, err))?;
        let value = attr.unescape_value().map_err(|err| xml_error(reader, err))?;
        match attr.key.local_name().as_ref() {
            b"lat" => latitude = parse_number(&value).unwrap_or(0.0),
            b"lon" => longitude = parse_number(&value).unwrap_or(0.0),
            _ => {}
        }
    }

    Ok(TrackPoint::new(latitude, longitude))
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// RFC 3339, or an `xsd:dateTime` without offset, which is read as UTC.
fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Some(naive.and_utc()),
        Err(e) => {
            debug!("Ignoring unreadable GPX time '{}': {}", s, e);
            None
        }
    }
}
