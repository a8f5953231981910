//! Session lifecycle management.
//!
//! One [`SessionManager`] owns one messaging session: it opens transports,
//! persists credential updates, caches the current pairing challenge,
//! reconnects after transient closes and tears everything down on logout or
//! when the remote service invalidates the session.
//!
//! # Architecture
//!
//! - **State Ownership**: a single actor task owns the state machine and the
//!   live transport. Nothing else mutates session state.
//! - **Message Passing**: [`SessionManager`] is a cloneable handle that sends
//!   commands to the actor. Transport events reach the actor tagged with the
//!   generation of the transport that produced them.
//! - **Snapshots**: the actor publishes a [`SessionStatus`] on a `watch`
//!   channel after every change, so reads never wait on the actor.

use serde::Serialize;
use std::fmt;

mod actor;
mod backoff;
mod manager;


pub use manager::{PhotoLookup, SessionDeps, SessionManager, SessionOptions};

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing started yet.
    Idle,
    /// A transport open is in flight.
    Connecting,
    /// The remote service issued a pairing challenge.
    AwaitingPairing,
    /// The session is usable.
    Authenticated,
    /// A transient close happened; a new connect cycle is scheduled.
    Reconnecting,
    /// The session ended; see [`TerminationReason`].
    Terminated,
}

impl SessionState {
    /// States from which `start()` begins a new connect cycle.
    pub fn is_inactive(self) -> bool {
        matches!(self, Self::Idle | Self::Terminated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::AwaitingPairing => "awaiting_pairing",
            Self::Authenticated => "authenticated",
            Self::Reconnecting => "reconnecting",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session reached [`SessionState::Terminated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The operator logged out. Credentials were erased.
    LoggedOut,
    /// The remote service invalidated the session. Credentials were erased;
    /// the next `start()` pairs from scratch.
    SessionInvalidated,
    /// Too many consecutive transient failures. Credentials are kept.
    ReconnectExhausted,
    /// Stored credentials could not be loaded. Nothing was erased.
    CredentialsUnavailable,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Encoded pairing challenge; only set while awaiting pairing.
    pub challenge: Option<String>,
    pub termination: Option<TerminationReason>,
    /// Last persistence failure, cleared by the next successful save.
    pub degraded: Option<String>,
    /// Consecutive reconnect attempts since the last successful open.
    pub reconnect_attempt: u32,
    /// Generation of the current (or last) transport.
    pub generation: u64,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            challenge: None,
            termination: None,
            degraded: None,
            reconnect_attempt: 0,
            generation: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A connect cycle began.
    Initiated,
    /// A session is already running; nothing changed.
    AlreadyActive,
}

impl StartOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::AlreadyActive => "already_active",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// The session was torn down. Local teardown always completes; the
    /// fields report best-effort steps that failed.
    Terminated {
        remote_error: Option<String>,
        persistence_error: Option<String>,
    },
    /// Nothing was running.
    AlreadyInactive,
}
