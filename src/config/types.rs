//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP surface.
    #[serde(default)]
    pub server: ServerConfig,
    /// Session identity and lifecycle.
    #[serde(default)]
    pub session: SessionConfig,
    /// Messaging gateway connection.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Pairing challenge delivery.
    #[serde(default)]
    pub pairing: PairingConfig,
    /// Reconnect policy for transient disconnects.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment overrides.
    ///
    /// `PORT` replaces the port of `server.listen`; unparsable values are
    /// ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server.listen.set_port(port),
                Err(e) => tracing::warn!(value = %port, error = %e, "Ignoring invalid PORT"),
            }
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP API binds to (default: 0.0.0.0:3000).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Allow cross-origin requests from any origin (default: true).
    #[serde(default = "default_true")]
    pub cors: bool,
    /// Serve Prometheus metrics on `/metrics` (default: true).
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            cors: true,
            metrics: true,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Directory holding persisted credential material (default: ./auth).
    /// Deleting it forces a fresh pairing.
    #[serde(default = "default_auth_dir")]
    pub auth_dir: PathBuf,
    /// Credential backend: "file" (default) or "memory" (nothing survives a
    /// restart; every run pairs again).
    #[serde(default = "default_store_backend")]
    pub store: String,
    /// Start the session at boot instead of waiting for `POST /connect`.
    #[serde(default)]
    pub autostart: bool,
    /// Domain appended to normalized contact numbers.
    #[serde(default = "default_address_domain")]
    pub address_domain: String,
    /// Upper bound on the remote logout request, in milliseconds.
    #[serde(default = "default_logout_timeout_ms")]
    pub logout_timeout_ms: u64,
}

impl SessionConfig {
    pub fn logout_timeout(&self) -> Duration {
        Duration::from_millis(self.logout_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_dir: default_auth_dir(),
            store: default_store_backend(),
            autostart: false,
            address_domain: default_address_domain(),
            logout_timeout_ms: default_logout_timeout_ms(),
        }
    }
}

/// Messaging gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// WebSocket URL of the gateway (`ws://` or `wss://`).
    #[serde(default = "default_gateway_url")]
    pub url: String,
    /// Timeout for establishing the socket, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Timeout for a single request/response exchange, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Browser identity announced to the remote service.
    #[serde(default = "default_browser")]
    pub browser: [String; 3],
}

impl GatewayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            browser: default_browser(),
        }
    }
}

/// Pairing challenge delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct PairingConfig {
    /// Interval between pushes on `GET /qr`, in milliseconds (default: 2000).
    #[serde(default = "default_stream_interval_ms")]
    pub stream_interval_ms: u64,
    /// Also render each new challenge as a QR code in the log.
    #[serde(default)]
    pub print_terminal: bool,
}

impl PairingConfig {
    pub fn stream_interval(&self) -> Duration {
        Duration::from_millis(self.stream_interval_ms)
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            stream_interval_ms: default_stream_interval_ms(),
            print_terminal: false,
        }
    }
}

/// Reconnect policy for transient disconnects.
///
/// With `immediate_first_retry` the first attempt after a close runs at
/// once; later attempts wait `initial_backoff_ms`, multiplied by
/// `multiplier` each time, capped at `max_backoff_ms`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_true")]
    pub immediate_first_retry: bool,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    /// Consecutive failed attempts before giving up; 0 retries forever.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            immediate_first_retry: true,
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}
