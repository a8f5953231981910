//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("session.auth_dir must not be empty")]
    EmptyAuthDir,
    #[error("session.store must be \"file\" or \"memory\", got '{0}'")]
    UnknownStoreBackend(String),
    #[error("session.address_domain must not be empty")]
    EmptyAddressDomain,
    #[error("gateway.url must start with ws:// or wss://, got '{0}'")]
    InvalidGatewayUrl(String),
    #[error("pairing.stream_interval_ms must be greater than zero")]
    ZeroStreamInterval,
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("reconnect.multiplier must be at least 1")]
    InvalidMultiplier,
    #[error("reconnect.max_backoff_ms ({max}) is lower than initial_backoff_ms ({initial})")]
    BackoffCeilingTooLow { initial: u64, max: u64 },
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.session.auth_dir.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyAuthDir);
    }
    if !matches!(config.session.store.as_str(), "file" | "memory") {
        errors.push(ValidationError::UnknownStoreBackend(config.session.store.clone()));
    }
    if config.session.address_domain.trim().is_empty() {
        errors.push(ValidationError::EmptyAddressDomain);
    }
    if config.session.logout_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("session.logout_timeout_ms"));
    }

    let url = &config.gateway.url;
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        errors.push(ValidationError::InvalidGatewayUrl(url.clone()));
    }
    if config.gateway.connect_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("gateway.connect_timeout_ms"));
    }
    if config.gateway.request_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("gateway.request_timeout_ms"));
    }

    if config.pairing.stream_interval_ms == 0 {
        errors.push(ValidationError::ZeroStreamInterval);
    }

    let reconnect = &config.reconnect;
    if reconnect.multiplier == 0 {
        errors.push(ValidationError::InvalidMultiplier);
    }
    if reconnect.max_backoff_ms < reconnect.initial_backoff_ms {
        errors.push(ValidationError::BackoffCeilingTooLow {
            initial: reconnect.initial_backoff_ms,
            max: reconnect.max_backoff_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
