// src/error.rs
//! Error types for the GPS proxy

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// The broker refused the request or the connection dropped before the
    /// PUBACK arrived.
    #[error("Publish error: {0}")]
    Publish(String),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}
