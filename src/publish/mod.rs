// src/publish/mod.rs
//! Publish sinks for decoded measurements

pub mod mqtt;

use crate::error::Result;
use async_trait::async_trait;
use log::info;

pub use mqtt::{MqttPublisher, MqttSettings};

/// Destination for `(topic, value)` pairs.
///
/// Implementations must accept concurrent calls from every session; each call
/// publishes exactly one value and resolves once the outcome is known.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, value: &str) -> Result<()>;
}

/// Writes every value to the log instead of a broker
#[derive(Debug, Default, Clone)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, topic: &str, value: &str) -> Result<()> {
        info!("{} = {}", topic, value);
        Ok(())
    }
}
