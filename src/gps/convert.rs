// src/gps/convert.rs
//! Conversion of GPS-native field encodings into conventional representations
//!
//! Receivers in the field produce garbage often enough that none of these
//! functions panic: every malformed input maps to a [`ConversionError`].

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::str::FromStr;

/// Format used when publishing a combined date and time
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const KNOTS_TO_KMH: f64 = 1.852;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("invalid time of day {0:?}")]
    InvalidTime(String),

    #[error("invalid date {0:?}")]
    InvalidDate(String),

    #[error("invalid coordinate {0:?}")]
    InvalidCoordinate(String),

    #[error("unknown hemisphere {0:?}")]
    UnknownHemisphere(String),

    #[error("unknown coordinate system {0:?}")]
    UnknownSystem(String),

    #[error("invalid number {0:?}")]
    InvalidNumber(String),
}

impl ConversionError {
    /// Short marker for log lines
    pub fn code(&self) -> &'static str {
        match self {
            ConversionError::InvalidTime(_) => "ETIME",
            ConversionError::InvalidDate(_) => "EDATE",
            ConversionError::InvalidCoordinate(_) => "ECOORD",
            ConversionError::UnknownHemisphere(_) => "EDIR",
            ConversionError::UnknownSystem(_) => "ESYSTEM",
            ConversionError::InvalidNumber(_) => "ENUM",
        }
    }
}

type Result<T> = std::result::Result<T, ConversionError>;

/// Hemisphere letter that follows every coordinate field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    pub fn letter(self) -> char {
        match self {
            Hemisphere::North => 'N',
            Hemisphere::South => 'S',
            Hemisphere::East => 'E',
            Hemisphere::West => 'W',
        }
    }

    /// Latitudes carry two degree digits, longitudes three
    pub fn degree_digits(self) -> usize {
        match self {
            Hemisphere::North | Hemisphere::South => 2,
            Hemisphere::East | Hemisphere::West => 3,
        }
    }

    pub fn is_negative(self) -> bool {
        matches!(self, Hemisphere::South | Hemisphere::West)
    }
}

impl FromStr for Hemisphere {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "N" => Ok(Hemisphere::North),
            "S" => Ok(Hemisphere::South),
            "E" => Ok(Hemisphere::East),
            "W" => Ok(Hemisphere::West),
            other => Err(ConversionError::UnknownHemisphere(other.to_string())),
        }
    }
}

/// Output representation for a coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateFormat {
    /// Degrees, minutes and seconds, e.g. `N48°07'2.280000"`
    Dms,
    /// Signed decimal degrees, e.g. `-48.117300`
    Dd,
}

impl FromStr for CoordinateFormat {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DMS" => Ok(CoordinateFormat::Dms),
            "DD" => Ok(CoordinateFormat::Dd),
            other => Err(ConversionError::UnknownSystem(other.to_string())),
        }
    }
}

/// Convert a packed `hhmmss.ss` time of day into `hh:mm:ss`.
///
/// Receivers that omit the fractional seconds send plain `hhmmss`; that form
/// is accepted as well. Any other length is rejected rather than guessed at.
pub fn time_of_day_to_utc(raw: &str) -> Result<String> {
    let invalid = || ConversionError::InvalidTime(raw.to_string());
    let bytes = raw.as_bytes();

    let well_formed = match bytes.len() {
        9 => bytes[6] == b'.' && all_digits(&raw[7..]),
        6 => true,
        _ => false,
    };
    if !well_formed || !raw.is_char_boundary(6) || !all_digits(&raw[..6]) {
        return Err(invalid());
    }

    Ok(format!("{}:{}:{}", &raw[..2], &raw[2..4], &raw[4..6]))
}

/// Combine a `ddmmyy` date with a packed time of day into a UTC instant
pub fn date_and_time_to_instant(raw_date: &str, raw_time: &str) -> Result<DateTime<Utc>> {
    if raw_date.len() != 6 || !all_digits(raw_date) {
        return Err(ConversionError::InvalidDate(raw_date.to_string()));
    }
    let time = time_of_day_to_utc(raw_time)?;

    let composed = format!(
        "{}-{}-{} {}",
        &raw_date[4..6],
        &raw_date[2..4],
        &raw_date[..2],
        time
    );
    let naive = NaiveDateTime::parse_from_str(&composed, "%y-%m-%d %H:%M:%S")
        .map_err(|_| ConversionError::InvalidDate(format!("{} {}", raw_date, raw_time)))?;

    Ok(Utc.from_utc_datetime(&naive))
}

/// Render an instant in UTC
pub fn format_utc(instant: &DateTime<Utc>) -> String {
    instant.format(DATE_TIME_FORMAT).to_string()
}

/// Render an instant in the local time zone of the process
pub fn format_local(instant: &DateTime<Utc>) -> String {
    instant.with_timezone(&Local).format(DATE_TIME_FORMAT).to_string()
}

/// Convert a degrees-minutes coordinate in the requested output format
pub fn coordinate_to(format: CoordinateFormat, raw: &str, hemisphere: &str) -> Result<String> {
    match format {
        CoordinateFormat::Dms => coordinate_to_dms(raw, hemisphere),
        CoordinateFormat::Dd => coordinate_to_dd(raw, hemisphere),
    }
}

/// `DDMM.MMMM` / `DDDMM.MMMM` to `<hemisphere><deg>°<min>'<sec>"`
pub fn coordinate_to_dms(raw: &str, hemisphere: &str) -> Result<String> {
    let coord = RawCoordinate::parse(raw, hemisphere)?;

    let fraction: f64 = format!("0.{}", coord.fraction)
        .parse()
        .map_err(|_| ConversionError::InvalidCoordinate(raw.to_string()))?;
    let seconds = fraction * 60.0;

    Ok(format!(
        "{}{}°{}'{:.6}\"",
        coord.hemisphere.letter(),
        coord.degrees,
        &coord.minutes[..2],
        seconds
    ))
}

/// `DDMM.MMMM` / `DDDMM.MMMM` to signed decimal degrees
pub fn coordinate_to_dd(raw: &str, hemisphere: &str) -> Result<String> {
    let coord = RawCoordinate::parse(raw, hemisphere)?;
    let invalid = |_| ConversionError::InvalidCoordinate(raw.to_string());

    let degrees: f64 = coord.degrees.parse().map_err(invalid)?;
    let minutes: f64 = format!("{}.{}", coord.minutes, coord.fraction)
        .parse()
        .map_err(invalid)?;

    let sign = if coord.hemisphere.is_negative() { "-" } else { "" };
    Ok(format!("{}{:.6}", sign, degrees + minutes / 60.0))
}

/// Speed over ground in knots to km/h
pub fn knots_to_kmh(raw: &str) -> Result<String> {
    let knots: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ConversionError::InvalidNumber(raw.to_string()))?;
    if !knots.is_finite() {
        return Err(ConversionError::InvalidNumber(raw.to_string()));
    }

    Ok(format!("{:.6}", knots * KNOTS_TO_KMH))
}

/// A coordinate field split into its digit groups
struct RawCoordinate<'a> {
    hemisphere: Hemisphere,
    degrees: &'a str,
    minutes: &'a str, // whole minutes, at least two digits
    fraction: &'a str,
}

impl<'a> RawCoordinate<'a> {
    fn parse(raw: &'a str, hemisphere: &str) -> Result<Self> {
        let hemisphere: Hemisphere = hemisphere.parse()?;
        let invalid = || ConversionError::InvalidCoordinate(raw.to_string());

        let (whole, fraction) = raw.split_once('.').ok_or_else(invalid)?;
        let width = hemisphere.degree_digits();

        if whole.len() < width + 2 || !all_digits(whole) {
            return Err(invalid());
        }
        if fraction.len() < 2 || !all_digits(fraction) {
            return Err(invalid());
        }

        let (degrees, minutes) = whole.split_at(width);
        Ok(Self {
            hemisphere,
            degrees,
            minutes,
            fraction,
        })
    }
}

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset;

    #[test]
    fn test_time_of_day() {
        assert_eq!(time_of_day_to_utc("123519.00").unwrap(), "12:35:19");
        assert_eq!(time_of_day_to_utc("000000.50").unwrap(), "00:00:00");
        assert_eq!(time_of_day_to_utc("123519").unwrap(), "12:35:19");
    }

    #[test]
    fn test_time_of_day_rejects_other_lengths() {
        for raw in ["", "1235", "1235190", "123519.0", "123519.000", "12:35:19.00"] {
            assert!(
                matches!(time_of_day_to_utc(raw), Err(ConversionError::InvalidTime(_))),
                "accepted {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_time_of_day_non_ascii() {
        // Nine bytes, but slicing at six would split a character
        assert!(time_of_day_to_utc("12345é.0").is_err());
        assert!(time_of_day_to_utc("1234é").is_err());
    }

    #[test]
    fn test_date_and_time() {
        let instant = date_and_time_to_instant("230394", "123519").unwrap();
        assert_eq!(format_utc(&instant), "1994-03-23 12:35:19");

        let instant = date_and_time_to_instant("010124", "235959.99").unwrap();
        assert_eq!(format_utc(&instant), "2024-01-01 23:59:59");
    }

    #[test]
    fn test_local_rendering_is_same_instant() {
        let instant = date_and_time_to_instant("230394", "123519").unwrap();
        let local = NaiveDateTime::parse_from_str(&format_local(&instant), DATE_TIME_FORMAT).unwrap();
        let offset = instant.with_timezone(&Local).offset().fix().local_minus_utc();
        assert_eq!(local - chrono::Duration::seconds(offset as i64), instant.naive_utc());
    }

    #[test]
    fn test_date_and_time_invalid() {
        assert!(matches!(
            date_and_time_to_instant("2303", "123519"),
            Err(ConversionError::InvalidDate(_))
        ));
        assert!(matches!(
            date_and_time_to_instant("310294", "123519"),
            Err(ConversionError::InvalidDate(_))
        ));
        assert!(matches!(
            date_and_time_to_instant("230394", "12351"),
            Err(ConversionError::InvalidTime(_))
        ));
        assert!(matches!(
            date_and_time_to_instant("230394", "996019"),
            Err(ConversionError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_coordinate_dms() {
        assert_eq!(coordinate_to_dms("4807.038", "N").unwrap(), "N48°07'2.280000\"");
        assert_eq!(coordinate_to_dms("01131.000", "E").unwrap(), "E011°31'0.000000\"");
        assert_eq!(coordinate_to_dms("3345.50", "S").unwrap(), "S33°45'30.000000\"");
    }

    #[test]
    fn test_coordinate_dd() {
        assert_eq!(coordinate_to_dd("4807.038", "N").unwrap(), "48.117300");
        assert_eq!(coordinate_to_dd("01131.000", "E").unwrap(), "11.516667");
        assert_eq!(coordinate_to_dd("4807.038", "S").unwrap(), "-48.117300");
        assert_eq!(coordinate_to_dd("01131.000", "W").unwrap(), "-11.516667");
    }

    #[test]
    fn test_coordinate_shape() {
        // Longitudes need five integer digits, latitudes four
        assert!(coordinate_to_dd("1131.000", "E").is_err());
        assert!(coordinate_to_dd("807.038", "N").is_err());
        assert!(coordinate_to_dd("4807.0", "N").is_err());
        assert!(coordinate_to_dd("4807", "N").is_err());
        assert!(coordinate_to_dd("", "N").is_err());
        assert!(coordinate_to_dms("48a7.038", "N").is_err());
    }

    #[test]
    fn test_unknown_hemisphere_and_system() {
        let err = coordinate_to_dd("4807.038", "X").unwrap_err();
        assert_eq!(err.code(), "EDIR");
        assert_eq!(coordinate_to_dms("4807.038", "").unwrap_err().code(), "EDIR");

        let err = "UTM".parse::<CoordinateFormat>().unwrap_err();
        assert_eq!(err.code(), "ESYSTEM");
        assert_eq!("DD".parse::<CoordinateFormat>(), Ok(CoordinateFormat::Dd));
    }

    #[test]
    fn test_dd_and_dms_agree() {
        let samples = [
            ("4807.038", "N"),
            ("4807.038", "S"),
            ("0000.01", "S"),
            ("8959.9999", "N"),
            ("3345.50", "S"),
        ];

        for (raw, hemisphere) in samples {
            let dd: f64 = coordinate_to(CoordinateFormat::Dd, raw, hemisphere)
                .unwrap()
                .parse()
                .unwrap();
            let dms = coordinate_to(CoordinateFormat::Dms, raw, hemisphere).unwrap();

            assert_eq!(dd < 0.0, hemisphere == "S", "sign of {} {}", raw, hemisphere);

            // N48°07'2.280000"
            let body = &dms[1..dms.len() - 1];
            let (deg, rest) = body.split_once('°').unwrap();
            let (min, sec) = rest.split_once('\'').unwrap();
            let magnitude = deg.parse::<f64>().unwrap()
                + min.parse::<f64>().unwrap() / 60.0
                + sec.parse::<f64>().unwrap() / 3600.0;

            assert!((dd.abs() - magnitude).abs() < 1e-5, "{} vs {}", dd, dms);
        }
    }

    #[test]
    fn test_knots_to_kmh() {
        assert_eq!(knots_to_kmh("10.0").unwrap(), "18.520000");
        assert_eq!(knots_to_kmh("022.4").unwrap(), "41.484800");
        assert_eq!(knots_to_kmh("0").unwrap(), "0.000000");
        assert!(knots_to_kmh("").is_err());
        assert!(knots_to_kmh("fast").is_err());
        assert!(knots_to_kmh("NaN").is_err());
    }
}
