//! Service configuration
//!
//! Loaded from a TOML file with environment-variable overrides for the
//! endpoint credentials, so deployments never have to commit a password.

use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VesperError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub endpoint: EndpointConfig,
    pub watcher: WatcherConfig,
    pub provision: ProvisionConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the REST API
    pub bind_address: SocketAddr,
    /// Whether to mount the Swagger UI
    pub enable_swagger_ui: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".parse().expect("valid default bind address"),
            enable_swagger_ui: false,
        }
    }
}

/// Coordinates and credentials of the hypervisor management endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// vCenter or ESXi hostname
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    /// Accept self-signed certificates (lab endpoints)
    pub insecure_tls: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 443,
            username: String::new(),
            password: String::new(),
            insecure_tls: false,
        }
    }
}

impl EndpointConfig {
    /// Human-readable endpoint identity for logs and errors, never the credentials.
    pub fn display_name(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Task watcher timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Wall-clock budget for a single tracked operation
    #[serde(with = "humantime_serde")]
    pub task_timeout: Duration,
    /// Server-side bound on a single wait-for-updates call
    #[serde(with = "humantime_serde")]
    pub max_wait: Duration,
    /// Delay before re-establishing a broken update stream
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(300),
            max_wait: Duration::from_secs(30),
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Provisioning defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Network used when the request names none
    pub default_network: String,
    /// Disk size applied to boot-media installs that give no disk_gb
    pub min_boot_media_disk_gb: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            default_network: "VM Network".to_string(),
            min_boot_media_disk_gb: 10,
        }
    }
}

impl Config {
    /// Load from a TOML file and apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config: Config = toml::from_str(&raw).map_err(|e| VesperError::Config {
            message: format!("failed to parse {}: {}", path.as_ref().display(), e),
        })?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment overrides for fields that should not live in the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = env::var("VESPER_ENDPOINT_HOST") {
            self.endpoint.host = host;
        }
        if let Ok(username) = env::var("VESPER_ENDPOINT_USERNAME") {
            self.endpoint.username = username;
        }
        if let Ok(password) = env::var("VESPER_ENDPOINT_PASSWORD") {
            self.endpoint.password = password;
        }
    }

    /// Reject configurations the service cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.host.is_empty() {
            return Err(VesperError::Config {
                message: "endpoint.host is required (or set VESPER_ENDPOINT_HOST)".to_string(),
            });
        }
        if self.endpoint.username.is_empty() {
            return Err(VesperError::Config {
                message: "endpoint.username is required (or set VESPER_ENDPOINT_USERNAME)"
                    .to_string(),
            });
        }
        Ok(())
    }
}
