// src/lib.rs
//! GPS Proxy Library
//!
//! Decodes NMEA-0183 sentences streamed by GPS clients and republishes every
//! measurement under a per-client MQTT topic.

pub mod config;
pub mod error;
pub mod gps;
pub mod publish;
pub mod server;
pub mod session;

// Re-export main types for convenience
pub use config::{ClientRegistry, ProxyConfig};
pub use error::{ProxyError, Result};
pub use gps::{parse_sentence, Measurement, Sentence, SentenceKind};
pub use publish::{LogPublisher, MqttPublisher, Publisher};
pub use server::ProxyServer;
pub use session::{Session, SessionStats};
