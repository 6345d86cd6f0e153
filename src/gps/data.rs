// src/gps/data.rs
//! Decoded sentence types and the measurements they produce

use std::fmt;

/// The NMEA sentence types the proxy understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SentenceKind {
    Gga, // Global Positioning System Fix Data
    Rmc, // Recommended Minimum Specific GNSS Data
    Gsa, // GNSS DOP and Active Satellites
    Gsv, // GNSS Satellites in View
    Vtg, // Course Over Ground and Ground Speed
}

impl SentenceKind {
    pub const ALL: [SentenceKind; 5] = [
        SentenceKind::Gga,
        SentenceKind::Rmc,
        SentenceKind::Gsa,
        SentenceKind::Gsv,
        SentenceKind::Vtg,
    ];

    /// Look up a sentence kind by its tag field, e.g. `$GPGGA`
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Tag as it appears in field 0 of the sentence
    pub fn tag(self) -> &'static str {
        match self {
            SentenceKind::Gga => "$GPGGA",
            SentenceKind::Rmc => "$GPRMC",
            SentenceKind::Gsa => "$GPGSA",
            SentenceKind::Gsv => "$GPGSV",
            SentenceKind::Vtg => "$GPVTG",
        }
    }

    /// Name used as the first topic level below the client's base topic
    pub fn name(self) -> &'static str {
        &self.tag()[1..]
    }

    /// Number of comma separated fields (tag included) required before any
    /// measurement is extracted
    pub fn min_fields(self) -> usize {
        match self {
            SentenceKind::Gga => 11,
            SentenceKind::Rmc => 10,
            SentenceKind::Gsa => 18,
            SentenceKind::Gsv => 1,
            SentenceKind::Vtg => 10,
        }
    }
}

impl fmt::Display for SentenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded value, ready to be published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub sentence: SentenceKind,
    pub field: &'static str,
    pub value: String,
}

impl Measurement {
    pub fn new(sentence: SentenceKind, field: &'static str, value: impl Into<String>) -> Self {
        Self {
            sentence,
            field,
            value: value.into(),
        }
    }

    /// Topic relative to the client's base topic, e.g. `GPGGA/utc`
    pub fn topic_suffix(&self) -> String {
        format!("{}/{}", self.sentence.name(), self.field)
    }
}
