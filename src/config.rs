// src/config.rs
//! Configuration loading and the client registry derived from it

use crate::error::{ProxyError, Result};
use crate::publish::mqtt::MqttSettings;
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::HashMap,
    net::IpAddr,
    path::{Path, PathBuf},
};

pub const CONFIG_FILE_NAME: &str = "gps-proxy.yml";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/gps-proxy.yml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsClient {
    pub ip: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default, deserialize_with = "port_from_yaml")]
    pub port: Option<u16>,
    #[serde(default)]
    pub mqtt_host: Option<String>,
    #[serde(default, deserialize_with = "port_from_yaml")]
    pub mqtt_port: Option<u16>,
    #[serde(default)]
    pub mqtt_user: Option<String>,
    #[serde(default)]
    pub mqtt_password: Option<String>,
    #[serde(default = "default_client_id")]
    pub mqtt_client_id: String,
    #[serde(default)]
    pub clients: Vec<GpsClient>,
}

/// Validated settings the proxy runs with
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub listen_addr: String,
    pub mqtt: MqttSettings,
    pub registry: ClientRegistry,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_client_id() -> String {
    "gps-proxy".to_string()
}

pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Ports may be written as numbers or quoted strings
fn port_from_yaml<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(port)) => Ok(Some(port)),
        Some(Port::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Port::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port {:?}", text))),
    }
}

impl ProxyConfig {
    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_yaml(&contents)
    }

    /// Load from an explicit path, or from the first existing default location
    pub fn load(explicit: Option<&Path>) -> Result<(Self, PathBuf)> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::locate()?,
        };

        let config = Self::load_from_file(&path)?;
        Ok((config, path))
    }

    /// Default locations, user configuration first
    pub fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dir) = user_config_dir() {
            paths.push(dir.join(CONFIG_FILE_NAME));
        }
        paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));
        paths
    }

    fn locate() -> Result<PathBuf> {
        let candidates = Self::candidate_paths();

        candidates
            .iter()
            .find(|path| path.exists())
            .cloned()
            .ok_or_else(|| {
                let listed: Vec<String> =
                    candidates.iter().map(|p| p.display().to_string()).collect();
                ProxyError::Config(format!("Configurations not found: {}", listed.join(", ")))
            })
    }

    /// Check required values and build the settings the proxy runs with
    pub fn resolve(&self) -> Result<ProxySettings> {
        let port = self
            .port
            .ok_or_else(|| ProxyError::Config("Listen port not specified".to_string()))?;

        let mqtt_host = self
            .mqtt_host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ProxyError::Config("No MQTT configuration found".to_string()))?;

        let host = if self.host.trim().is_empty() {
            default_host()
        } else {
            self.host.trim().to_string()
        };

        let credentials = self.mqtt_user.as_ref().map(|user| {
            (user.clone(), self.mqtt_password.clone().unwrap_or_default())
        });

        Ok(ProxySettings {
            listen_addr: format!("{}:{}", host, port),
            mqtt: MqttSettings {
                host: mqtt_host.to_string(),
                port: self.mqtt_port.unwrap_or(DEFAULT_MQTT_PORT),
                client_id: self.mqtt_client_id.clone(),
                credentials,
            },
            registry: ClientRegistry::from_clients(&self.clients)?,
        })
    }
}

/// `$XDG_CONFIG_HOME`, falling back to `$HOME/.config`
fn user_config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

/// Immutable mapping from source address to logical client name
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<IpAddr, String>,
}

impl ClientRegistry {
    pub fn from_clients(clients: &[GpsClient]) -> Result<Self> {
        let mut map = HashMap::new();

        for client in clients {
            let ip: IpAddr = client.ip.trim().parse().map_err(|_| {
                ProxyError::Config(format!("Invalid client IP address {:?}", client.ip))
            })?;
            let name = client.name.trim();
            if name.is_empty() {
                return Err(ProxyError::Config(format!("Client {} has no name", ip)));
            }

            if let Some(previous) = map.insert(normalize(ip), name.to_string()) {
                warn!("Client {} listed twice, using {} instead of {}", ip, name, previous);
            }
        }

        Ok(Self { clients: map })
    }

    /// Logical name of the client connecting from `ip`
    pub fn resolve(&self, ip: IpAddr) -> Option<&str> {
        self.clients.get(&normalize(ip)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

fn normalize(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}
