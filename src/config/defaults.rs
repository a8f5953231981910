//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

// =============================================================================
// Session Defaults
// =============================================================================

pub fn default_auth_dir() -> PathBuf {
    PathBuf::from("./auth")
}

pub fn default_store_backend() -> String {
    "file".to_string()
}

pub fn default_address_domain() -> String {
    msgbridge_proto::DEFAULT_ADDRESS_DOMAIN.to_string()
}

pub fn default_logout_timeout_ms() -> u64 {
    10_000
}

// =============================================================================
// Gateway Defaults
// =============================================================================

pub fn default_gateway_url() -> String {
    "ws://127.0.0.1:8787/session".to_string()
}

pub fn default_connect_timeout_ms() -> u64 {
    10_000
}

pub fn default_request_timeout_ms() -> u64 {
    15_000
}

pub fn default_browser() -> [String; 3] {
    ["Ubuntu".to_string(), "Chrome".to_string(), "1.0.0".to_string()]
}

// =============================================================================
// Pairing Defaults
// =============================================================================

pub fn default_stream_interval_ms() -> u64 {
    2_000
}

// =============================================================================
// Reconnect Defaults
// =============================================================================

pub fn default_initial_backoff_ms() -> u64 {
    1_000
}

pub fn default_max_backoff_ms() -> u64 {
    30_000
}

pub fn default_multiplier() -> u32 {
    2
}

pub fn default_max_attempts() -> u32 {
    10
}
