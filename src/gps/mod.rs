// src/gps/mod.rs
//! NMEA sentence decoding and field conversion

pub mod convert;
pub mod data;
pub mod nmea;

pub use data::{Measurement, SentenceKind};
pub use nmea::{parse_sentence, Sentence, SentenceError};
