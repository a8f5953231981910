//! Transport abstraction.
//!
//! A [`Connector`] opens one protocol connection with a set of credentials
//! and hands back a [`TransportHandle`]: the live [`Transport`] for
//! requests, and the receiving end of its lifecycle event stream. The
//! session manager discards a transport by calling [`Transport::close`] and
//! dropping the handle; anything it emits afterwards is ignored.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use msgbridge_proto::{FrameError, LOGGED_OUT_STATUS};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::store::{CredentialUpdate, Credentials};

pub mod gateway;

#[cfg(test)]
pub mod fake;

pub use gateway::GatewayConnector;

/// Lifecycle events emitted by an open transport, in protocol order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The remote service wants the operator to scan a pairing code.
    PairingChallenge(String),
    /// The session is authenticated.
    Opened,
    /// The connection ended. No further events follow.
    Closed(CloseReason),
    /// Credential material changed and must be persisted.
    CredentialsUpdated(CredentialUpdate),
}

impl TransportEvent {
    /// Short name for logs; never includes credential material.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PairingChallenge(_) => "pairing_challenge",
            Self::Opened => "opened",
            Self::Closed(_) => "closed",
            Self::CredentialsUpdated(_) => "credentials_updated",
        }
    }
}

/// Why a transport closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReason {
    pub status_code: Option<u16>,
    pub message: Option<String>,
}

impl CloseReason {
    /// A close with no status code, e.g. a vanished socket.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: Some(message.into()),
        }
    }

    /// True when the remote service invalidated the session. Retrying with
    /// the same credentials cannot succeed.
    pub fn is_permanent(&self) -> bool {
        self.status_code == Some(LOGGED_OUT_STATUS)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status_code, self.message.as_deref()) {
            (Some(code), Some(msg)) => write!(f, "{code} {msg}"),
            (Some(code), None) => write!(f, "{code}"),
            (None, Some(msg)) => f.write_str(msg),
            (None, None) => f.write_str("no reason given"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to gateway: {0}")]
    Connect(String),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("transport is closed")]
    Closed,
    #[error("session is not authenticated")]
    NotAuthenticated,
    #[error("gateway error: {0}")]
    Remote(String),
    #[error("unexpected gateway response: {0}")]
    UnexpectedResponse(String),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// A live protocol connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Ask the remote service to end this device's session.
    async fn logout(&self) -> Result<(), TransportError>;

    /// Profile picture URL for a normalized contact address. `Ok(None)` means
    /// the contact has no picture or hides it.
    async fn profile_photo_url(&self, address: &str) -> Result<Option<String>, TransportError>;

    /// Tear the connection down. Idempotent; never emits further events
    /// that anyone listens to.
    fn close(&self);
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, credentials: Credentials) -> Result<TransportHandle, TransportError>;
}

/// A freshly opened transport and its event stream.
pub struct TransportHandle {
    pub transport: Arc<dyn Transport>,
    pub events: mpsc::Receiver<TransportEvent>,
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_logged_out_is_permanent() {
        let logged_out = CloseReason {
            status_code: Some(401),
            message: Some("logged out".into()),
        };
        assert!(logged_out.is_permanent());

        for code in [Some(408), Some(428), Some(440), Some(500), Some(515), None] {
            let reason = CloseReason {
                status_code: code,
                message: None,
            };
            assert!(!reason.is_permanent(), "{code:?} must be transient");
        }
        assert!(!CloseReason::transient("socket ended").is_permanent());
    }

    #[test]
    fn close_reason_display() {
        let reason = CloseReason {
            status_code: Some(515),
            message: Some("restart required".into()),
        };
        assert_eq!(reason.to_string(), "515 restart required");
        assert_eq!(CloseReason::default().to_string(), "no reason given");
    }
}
