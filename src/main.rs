//! msgbridged - HTTP bridge over a single messaging-gateway session.
//!
//! Pairs one device with the remote messaging service, keeps the session
//! alive across transient disconnects and exposes pairing, logout and
//! profile photo lookups over a small HTTP API.

mod config;
mod error;
mod http;
mod metrics;
mod pairing;
mod session;
mod store;
mod telemetry;
mod transport;

use crate::config::{Config, ConfigError};
use crate::pairing::QrDataUrlEncoder;
use crate::session::{SessionDeps, SessionManager, SessionOptions};
use crate::store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
use crate::transport::GatewayConnector;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration. A missing default file means "run with defaults";
    // a path given on the command line must exist.
    let explicit_path = std::env::args().nth(1);
    let config_path = explicit_path
        .clone()
        .unwrap_or_else(|| "config.toml".to_string());

    let mut config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(ConfigError::Io(e))
            if explicit_path.is_none() && e.kind() == std::io::ErrorKind::NotFound =>
        {
            warn!(path = %config_path, "No config file found, using defaults");
            Config::default()
        }
        Err(e) => {
            error!(path = %config_path, error = %e, "Failed to load config");
            return Err(e.into());
        }
    };
    config.apply_env_overrides();

    if let Err(errors) = config::validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "{} configuration error(s), see above",
            errors.len()
        ));
    }

    info!(
        listen = %config.server.listen,
        gateway = %config.gateway.url,
        auth_dir = %config.session.auth_dir.display(),
        "Starting msgbridged"
    );

    if config.server.metrics {
        metrics::init();
        info!("Metrics initialized");
    }

    let store: Arc<dyn CredentialStore> = match config.session.store.as_str() {
        "memory" => {
            warn!("Using in-memory credential store; pairing will not survive a restart");
            Arc::new(MemoryCredentialStore::new())
        }
        _ => Arc::new(FileCredentialStore::new(config.session.auth_dir.clone())),
    };

    let session = SessionManager::spawn(
        SessionDeps {
            connector: Arc::new(GatewayConnector::new(&config.gateway)),
            store,
            encoder: Arc::new(QrDataUrlEncoder::default()),
        },
        SessionOptions::from_config(&config),
    );

    if config.session.autostart {
        let outcome = session.start().await?;
        info!(outcome = outcome.as_str(), "Session autostarted");
    }

    let app = http::router(
        http::AppState::new(session.clone(), config.pairing.stream_interval()),
        &config.server,
    );
    http::run_http_server(config.server.listen, app, shutdown_signal()).await?;

    session.shutdown().await;
    info!("msgbridged stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => {
            error!(error = %e, "Failed to listen for ctrl-c; shut down by killing the process");
            std::future::pending::<()>().await;
        }
    }
}
