//! Unified error handling for msgbridge.
//!
//! Session operations return [`SessionError`]; idempotency signals such as
//! "already active" are modelled as outcomes in [`crate::session`], not as
//! errors. Store and transport failures keep their own types and are mapped
//! into [`SessionError`] at the session boundary.

use thiserror::Error;

use crate::store::StoreError;
use crate::transport::TransportError;

// ============================================================================
// Session Errors
// ============================================================================

/// Errors returned by [`crate::session::SessionManager`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The operation needs an authenticated session.
    #[error("session is not connected")]
    NotConnected,

    /// The contact identifier contains no digits.
    #[error("contact identifier has no digits")]
    InvalidContact,

    /// The gateway failed to answer a query. Session state is unaffected.
    #[error("lookup failed: {0}")]
    LookupFailed(String),

    /// Credential material could not be written or erased.
    #[error("credential persistence failed: {0}")]
    PersistenceFailure(String),

    /// Transient disconnects exceeded the configured attempt ceiling.
    #[error("reconnect attempts exhausted")]
    ReconnectExhausted,

    /// The session manager task is gone (daemon shutting down).
    #[error("session manager stopped")]
    ManagerStopped,
}

impl SessionError {
    /// Get a static error code string for API bodies and metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::InvalidContact => "invalid_contact",
            Self::LookupFailed(_) => "lookup_failed",
            Self::PersistenceFailure(_) => "persistence_failure",
            Self::ReconnectExhausted => "reconnect_exhausted",
            Self::ManagerStopped => "manager_stopped",
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        Self::PersistenceFailure(err.to_string())
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotAuthenticated => Self::NotConnected,
            other => Self::LookupFailed(other.to_string()),
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
