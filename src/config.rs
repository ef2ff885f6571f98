//! Device configuration
//!
//! TOML file with `[device]`, `[broker]`, and optional `[broker.tls]`
//! sections. Session timing is fixed in code by contract; only deployment
//! facts (endpoint, credentials, provisioning paths) live here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level device configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default)]
    pub device: DeviceSection,
    pub broker: BrokerSection,
}

/// Device-local settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Path to the provisioned factory serial blob
    #[serde(default = "default_serial_path")]
    pub serial_path: PathBuf,
    /// Text carried in every telemetry payload
    #[serde(default = "default_greeting")]
    pub greeting: String,
    /// Status display capacity in lines
    #[serde(default = "default_status_lines")]
    pub status_lines: usize,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            serial_path: default_serial_path(),
            greeting: default_greeting(),
            status_lines: default_status_lines(),
        }
    }
}

fn default_serial_path() -> PathBuf {
    PathBuf::from("/var/lib/edgelink/serial")
}

fn default_greeting() -> String {
    "hello from SDK".to_string()
}

fn default_status_lines() -> usize {
    40
}

/// Broker endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker hostname; also the name verified against the server cert
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    /// Mutual TLS credentials; plain TCP when absent
    pub tls: Option<TlsSection>,
}

fn default_broker_port() -> u16 {
    8883
}

/// PEM credential paths for mutual TLS
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsSection {
    pub root_ca_path: PathBuf,
    pub certificate_path: PathBuf,
    pub private_key_path: PathBuf,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DeviceConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: DeviceConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker.host must not be empty".to_string(),
            ));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.port must be non-zero".to_string(),
            ));
        }
        if self.device.status_lines == 0 {
            return Err(ConfigError::InvalidConfig(
                "device.status_lines must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
serial_path = "/tmp/edgelink-test-serial"
greeting = "hello from SDK"

[broker]
host = "broker.example.com"
port = 8883
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}
