//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions (Config, ServerConfig, SessionConfig, ...)
//! - [`defaults`]: serde default functions
//! - [`validation`]: startup validation collecting every problem at once

mod defaults;
mod types;
pub mod validation;

pub use types::{Config, ConfigError, GatewayConfig, ReconnectConfig, ServerConfig};
