// src/gps/nmea.rs
//! NMEA sentence classification and field dispatch

use super::convert::{self, ConversionError, CoordinateFormat};
use super::data::{Measurement, SentenceKind};

/// Lines shorter than this are reported instead of dispatched
pub const MIN_LINE_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SentenceError {
    #[error("unexpected short line: {0}")]
    Short(String),

    #[error("unexpected line: {0}")]
    Unrecognized(String),

    #[error("{kind} sentence has {found} fields, at least {expected} required")]
    Malformed {
        kind: SentenceKind,
        expected: usize,
        found: usize,
    },
}

/// Result of dispatching one line
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub kind: SentenceKind,
    pub field_count: usize,
    /// Measurements in publishing order
    pub measurements: Vec<Measurement>,
    /// Fields whose conversion failed; these are not published
    pub rejected: Vec<(&'static str, ConversionError)>,
}

impl Sentence {
    fn new(kind: SentenceKind, field_count: usize) -> Self {
        Self {
            kind,
            field_count,
            measurements: Vec::new(),
            rejected: Vec::new(),
        }
    }

    /// Value of a measurement produced for this sentence
    pub fn value(&self, field: &str) -> Option<&str> {
        self.measurements
            .iter()
            .find(|m| m.field == field)
            .map(|m| m.value.as_str())
    }

    fn push(&mut self, field: &'static str, value: &str) {
        self.measurements.push(Measurement::new(self.kind, field, value));
    }

    fn push_converted(&mut self, field: &'static str, value: Result<String, ConversionError>) {
        match value {
            Ok(value) => self.measurements.push(Measurement::new(self.kind, field, value)),
            Err(e) => self.rejected.push((field, e)),
        }
    }

    fn push_coordinates(&mut self, fields: &[&str], lat: usize, lon: usize) {
        for (name, format, index) in [
            ("lat_dms", CoordinateFormat::Dms, lat),
            ("lon_dms", CoordinateFormat::Dms, lon),
            ("lat_dd", CoordinateFormat::Dd, lat),
            ("lon_dd", CoordinateFormat::Dd, lon),
        ] {
            let value = convert::coordinate_to(format, fields[index], fields[index + 1]);
            self.push_converted(name, value);
        }
    }
}

/// Classify a trimmed line and decode its fields.
///
/// Checksums are not verified; a trailing `*hh` is only cut off so it does
/// not end up in the last published field.
pub fn parse_sentence(line: &str) -> Result<Sentence, SentenceError> {
    if line.chars().count() < MIN_LINE_LEN {
        return Err(SentenceError::Short(line.to_string()));
    }

    let fields: Vec<&str> = strip_checksum(line).split(',').collect();
    let kind = SentenceKind::from_tag(fields[0])
        .ok_or_else(|| SentenceError::Unrecognized(line.to_string()))?;

    if fields.len() < kind.min_fields() {
        return Err(SentenceError::Malformed {
            kind,
            expected: kind.min_fields(),
            found: fields.len(),
        });
    }

    let mut sentence = Sentence::new(kind, fields.len());
    match kind {
        SentenceKind::Gga => decode_gpgga(&mut sentence, &fields),
        SentenceKind::Rmc => decode_gprmc(&mut sentence, &fields),
        SentenceKind::Gsa => decode_gpgsa(&mut sentence, &fields),
        SentenceKind::Gsv => decode_gpgsv(&mut sentence),
        SentenceKind::Vtg => decode_gpvtg(&mut sentence, &fields),
    }

    Ok(sentence)
}

fn strip_checksum(line: &str) -> &str {
    match line.rsplit_once('*') {
        Some((body, sum)) if sum.len() == 2 && sum.bytes().all(|b| b.is_ascii_hexdigit()) => body,
        _ => line,
    }
}

/// GPGGA (Global Positioning System Fix Data)
fn decode_gpgga(sentence: &mut Sentence, fields: &[&str]) {
    sentence.push_converted("utc", convert::time_of_day_to_utc(fields[1]));
    sentence.push_coordinates(fields, 2, 4);
    sentence.push("quality", fields[6]);
    sentence.push("sats", fields[7]);
    sentence.push("hdop", fields[8]);
    sentence.push("alt", fields[9]);
    sentence.push("alt_unit", fields[10]);
    // undulation and differential data are not published
}

/// GPRMC (Recommended Minimum Specific GNSS Data)
fn decode_gprmc(sentence: &mut Sentence, fields: &[&str]) {
    sentence.push_converted("time", convert::time_of_day_to_utc(fields[1]));
    sentence.push_coordinates(fields, 3, 5);
    sentence.push_converted("speed_kmh", convert::knots_to_kmh(fields[7]));

    match convert::date_and_time_to_instant(fields[9], fields[1]) {
        Ok(instant) => {
            sentence.push_converted("date_time", Ok(convert::format_utc(&instant)));
            sentence.push_converted("date_time_local", Ok(convert::format_local(&instant)));
        }
        Err(e) => {
            sentence.rejected.push(("date_time", e.clone()));
            sentence.rejected.push(("date_time_local", e));
        }
    }
}

/// GPGSA (DOP and Active Satellites)
fn decode_gpgsa(sentence: &mut Sentence, fields: &[&str]) {
    let count = sentence.field_count.to_string();
    sentence.push("field_length", &count);
    sentence.push("mode_ma", fields[1]);
    sentence.push("mode_123", fields[2]);
    // fields 3-14 hold the PRNs used in the fix
    sentence.push("pdop", fields[15]);
    sentence.push("hdop", fields[16]);
    sentence.push("vdop", fields[17]);
}

/// GPGSV (Satellites in View), only the field count is published
fn decode_gpgsv(sentence: &mut Sentence) {
    let count = sentence.field_count.to_string();
    sentence.push("field_length", &count);
}

/// GPVTG (Course Over Ground and Ground Speed)
fn decode_gpvtg(sentence: &mut Sentence, fields: &[&str]) {
    sentence.push("track_true", fields[1]);
    sentence.push("track_mag", fields[3]);
    sentence.push("speed_kn", fields[5]);
    sentence.push("speed_kmh", fields[7]);
    sentence.push("mode_indicator", fields[9]);
}
