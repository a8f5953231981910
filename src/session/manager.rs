//! Cloneable handle to the session actor.

use std::sync::Arc;
use std::time::Duration;

use msgbridge_proto::contact_address;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::actor::{Command, SessionActor};
use super::{LogoutOutcome, SessionStatus, StartOutcome};
use crate::config::{Config, ReconnectConfig};
use crate::error::{SessionError, SessionResult};
use crate::metrics;
use crate::pairing::Encoder;
use crate::store::CredentialStore;
use crate::transport::Connector;

const COMMAND_BUFFER: usize = 32;

/// Collaborators injected into the session.
pub struct SessionDeps {
    pub connector: Arc<dyn Connector>,
    pub store: Arc<dyn CredentialStore>,
    pub encoder: Arc<dyn Encoder>,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub address_domain: String,
    pub logout_timeout: Duration,
    pub print_terminal: bool,
    pub reconnect: ReconnectConfig,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            address_domain: config.session.address_domain.clone(),
            logout_timeout: config.session.logout_timeout(),
            print_terminal: config.pairing.print_terminal,
            reconnect: config.reconnect.clone(),
        }
    }
}

/// Result of a profile photo lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoLookup {
    /// Identifier as the caller gave it.
    pub contact: String,
    /// Normalized address that was looked up.
    pub address: String,
    /// `None` when the contact has no picture or hides it.
    pub photo_url: Option<String>,
}

#[derive(Clone)]
pub struct SessionManager {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
    address_domain: Arc<str>,
}

impl SessionManager {
    /// Spawn the session actor on the current runtime.
    pub fn spawn(deps: SessionDeps, options: SessionOptions) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status) = watch::channel(SessionStatus::default());
        SessionActor::spawn(deps, &options, rx, status_tx);
        Self {
            commands,
            status,
            address_domain: Arc::from(options.address_domain),
        }
    }

    /// Begin connecting unless a session is already running. Returns once the
    /// transport open has been issued, not when authentication completes.
    pub async fn start(&self) -> SessionResult<StartOutcome> {
        self.call(|reply| Command::Start { reply }).await
    }

    /// Encoded pairing challenge, if one is outstanding.
    pub fn current_challenge(&self) -> Option<String> {
        self.status.borrow().challenge.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every published status change.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Log out remotely (best effort), erase credentials and terminate.
    pub async fn logout(&self) -> SessionResult<LogoutOutcome> {
        self.call(|reply| Command::Logout { reply }).await
    }

    /// Look up a contact's profile picture URL.
    ///
    /// The lookup itself runs outside the actor, so a slow gateway does not
    /// hold up lifecycle events.
    pub async fn profile_photo(&self, contact: &str) -> SessionResult<PhotoLookup> {
        let transport = self
            .call(|reply| Command::LookupTransport { reply })
            .await??;
        let address =
            contact_address(contact, &self.address_domain).ok_or(SessionError::InvalidContact)?;

        match transport.profile_photo_url(&address).await {
            Ok(photo_url) => {
                metrics::record_photo_lookup(if photo_url.is_some() { "found" } else { "none" });
                Ok(PhotoLookup {
                    contact: contact.to_string(),
                    address,
                    photo_url,
                })
            }
            Err(e) => {
                metrics::record_photo_lookup("error");
                debug!(%address, error = %e, "Profile photo lookup failed");
                Err(e.into())
            }
        }
    }

    /// Stop the actor, closing the live transport. Credentials are kept.
    pub async fn shutdown(&self) {
        if self.call(|reply| Command::Shutdown { reply }).await.is_err() {
            debug!("Session manager already stopped");
        }
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> SessionResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SessionError::ManagerStopped)?;
        rx.await.map_err(|_| SessionError::ManagerStopped)
    }
}
