//! Configuration loading for xapsd.
//!
//! Configuration is loaded from a TOML file (default: `xapsd.toml`).

use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for xapsd.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Command socket configuration.
    pub socket: SocketConfig,
    /// Registration database configuration.
    pub database: DatabaseConfig,
    /// Push gateway configuration.
    pub gateway: GatewayConfig,
    /// Delivery pipeline configuration.
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Command socket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    /// Path of the local stream socket the mail plugin connects to.
    #[serde(default = "default_socket_path")]
    pub path: PathBuf,
}

/// Registration database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the JSON registration file.
    #[serde(default = "default_database_file")]
    pub file: PathBuf,
}

/// Push gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Gateway hostname (default: the production push gateway).
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Gateway port (default: 2195).
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// PEM client certificate presented to the gateway.
    #[serde(default = "default_cert_file")]
    pub cert_file: PathBuf,
    /// PEM private key for the client certificate.
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
    /// Optional PEM CA bundle; the built-in web roots are used when unset.
    pub ca_file: Option<PathBuf>,
    /// Notification topic reported to registering clients.
    ///
    /// Derived externally from the push certificate subject; the daemon
    /// treats it as an opaque string and refuses to start when empty.
    #[serde(default)]
    pub topic: String,
}

/// Delivery pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Flush timer period in milliseconds (default: 2500).
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Initial reconnect delay in milliseconds (default: 1000).
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    /// Reconnect delay ceiling in milliseconds (default: 60000).
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

// Default value functions
fn default_socket_path() -> PathBuf {
    PathBuf::from("/var/run/dovecot/xapsd.sock")
}

fn default_database_file() -> PathBuf {
    PathBuf::from("/var/lib/dovecot/xapsd.json")
}

fn default_gateway_host() -> String {
    "gateway.push.apple.com".to_string()
}

fn default_gateway_port() -> u16 {
    2195
}

fn default_cert_file() -> PathBuf {
    PathBuf::from("/etc/xapsd/certificate.pem")
}

fn default_key_file() -> PathBuf {
    PathBuf::from("/etc/xapsd/key.pem")
}

fn default_flush_interval_ms() -> u64 {
    2500
}

fn default_reconnect_initial_ms() -> u64 {
    1000
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: SocketConfig {
                path: default_socket_path(),
            },
            database: DatabaseConfig {
                file: default_database_file(),
            },
            gateway: GatewayConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            cert_file: default_cert_file(),
            key_file: default_key_file(),
            ca_file: None,
            topic: String::new(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.gateway.host, "gateway.push.apple.com");
        assert_eq!(config.gateway.port, 2195);
        assert_eq!(config.delivery.flush_interval_ms, 2500);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[socket]
path = "/tmp/xapsd.sock"

[database]
file = "/tmp/xapsd.json"

[gateway]
host = "gateway.sandbox.push.apple.com"
topic = "com.example.mail"

[delivery]
flush_interval_ms = 500
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.socket.path, PathBuf::from("/tmp/xapsd.sock"));
        assert_eq!(config.gateway.host, "gateway.sandbox.push.apple.com");
        assert_eq!(config.gateway.port, 2195);
        assert_eq!(config.gateway.topic, "com.example.mail");
        assert_eq!(config.delivery.flush_interval_ms, 500);
        assert_eq!(config.delivery.reconnect_max_ms, 60_000);
    }

    #[test]
    fn config_missing_fields_use_defaults() {
        let toml = r#"
[socket]
[database]
[gateway]
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.file, PathBuf::from("/var/lib/dovecot/xapsd.json"));
        assert_eq!(config.delivery.reconnect_initial_ms, 1000);
        assert!(config.gateway.topic.is_empty());
        assert!(config.gateway.ca_file.is_none());
    }
}
