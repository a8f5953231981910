//! The session actor.
//!
//! Owns the lifecycle state machine and the live transport, and processes
//! commands and transport events one at a time. Every transport gets a new
//! generation; an event or open completion is only acted on while its
//! generation is current and its transport is still live.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument, debug, error, info, warn};

use super::backoff::Backoff;
use super::manager::{SessionDeps, SessionOptions};
use super::{LogoutOutcome, SessionState, SessionStatus, StartOutcome, TerminationReason};
use crate::error::{SessionError, SessionResult};
use crate::metrics;
use crate::pairing::{Encoder, render_terminal};
use crate::store::{CredentialStore, CredentialUpdate};
use crate::telemetry::spans;
use crate::transport::{
    CloseReason, Connector, Transport, TransportError, TransportEvent, TransportHandle,
};

/// Requests from [`super::SessionManager`] handles.
pub(super) enum Command {
    Start {
        reply: oneshot::Sender<StartOutcome>,
    },
    Logout {
        reply: oneshot::Sender<LogoutOutcome>,
    },
    /// Hand out the live transport for a query, if authenticated.
    LookupTransport {
        reply: oneshot::Sender<SessionResult<Arc<dyn Transport>>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Messages the actor sends itself from spawned tasks.
enum Internal {
    OpenCompleted {
        generation: u64,
        result: Result<TransportHandle, TransportError>,
    },
    Event {
        generation: u64,
        event: TransportEvent,
    },
    EventsEnded {
        generation: u64,
    },
    ReconnectDue {
        generation: u64,
    },
}

pub(super) struct SessionActor {
    status: SessionStatus,
    live: Option<Arc<dyn Transport>>,
    connector: Arc<dyn Connector>,
    store: Arc<dyn CredentialStore>,
    encoder: Arc<dyn Encoder>,
    backoff: Backoff,
    print_terminal: bool,
    logout_timeout: Duration,
    internal_tx: mpsc::UnboundedSender<Internal>,
    status_tx: watch::Sender<SessionStatus>,
}

impl SessionActor {
    /// Create the actor and spawn it on the current runtime.
    pub(super) fn spawn(
        deps: SessionDeps,
        options: &SessionOptions,
        commands: mpsc::Receiver<Command>,
        status_tx: watch::Sender<SessionStatus>,
    ) {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let actor = Self {
            status: SessionStatus::default(),
            live: None,
            connector: deps.connector,
            store: deps.store,
            encoder: deps.encoder,
            backoff: Backoff::new(&options.reconnect),
            print_terminal: options.print_terminal,
            logout_timeout: options.logout_timeout,
            internal_tx,
            status_tx,
        };
        tokio::spawn(actor.run(commands, internal_rx));
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        self.publish();
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        self.stop();
                        break;
                    }
                },
                Some(message) = internal.recv() => self.handle_internal(message).await,
            }
            self.publish();
        }
        self.publish();
        debug!("Session actor stopped");
    }

    /// Returns false when the actor should stop. Status is published before
    /// replying, so callers observe the state their command produced.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start { reply } => {
                let outcome = self.start().await;
                self.publish();
                let _ = reply.send(outcome);
            }
            Command::Logout { reply } => {
                let outcome = self.logout().await;
                self.publish();
                let _ = reply.send(outcome);
            }
            Command::LookupTransport { reply } => {
                let _ = reply.send(self.lookup_transport());
            }
            Command::Shutdown { reply } => {
                self.stop();
                self.publish();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::OpenCompleted { generation, result } => {
                if generation != self.status.generation
                    || self.status.state != SessionState::Connecting
                    || self.live.is_some()
                {
                    metrics::inc(&metrics::STALE_EVENTS);
                    match result {
                        Ok(handle) => {
                            debug!(generation, "Closing transport from a stale open");
                            handle.transport.close();
                        }
                        Err(e) => debug!(generation, error = %e, "Ignoring stale open failure"),
                    }
                    return;
                }
                match result {
                    Ok(handle) => {
                        debug!(generation, "Transport open");
                        self.live = Some(handle.transport);
                        self.spawn_pump(generation, handle.events);
                    }
                    Err(e) => {
                        warn!(generation, error = %e, "Failed to open transport");
                        self.on_transient_close(CloseReason::transient(e.to_string()))
                            .await;
                    }
                }
            }
            Internal::Event { generation, event } => {
                if generation != self.status.generation || self.live.is_none() {
                    metrics::inc(&metrics::STALE_EVENTS);
                    debug!(
                        generation,
                        current = self.status.generation,
                        event = event.kind(),
                        "Discarding event from stale transport"
                    );
                    return;
                }
                self.handle_transport_event(event).await;
            }
            Internal::EventsEnded { generation } => {
                if generation == self.status.generation && self.live.is_some() {
                    warn!(generation, "Transport event stream ended without a close");
                    self.on_transient_close(CloseReason::transient("event stream ended"))
                        .await;
                }
            }
            Internal::ReconnectDue { generation } => {
                if generation == self.status.generation
                    && self.status.state == SessionState::Reconnecting
                {
                    self.begin_connect().await;
                }
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PairingChallenge(raw) => self.on_challenge(raw),
            TransportEvent::Opened => {
                self.status.challenge = None;
                self.backoff.reset();
                self.transition(SessionState::Authenticated);
            }
            TransportEvent::CredentialsUpdated(update) => self.persist(&update).await,
            TransportEvent::Closed(reason) if reason.is_permanent() => {
                error!(
                    generation = self.status.generation,
                    %reason,
                    "Session invalidated by the remote service; credentials erased, pair again to continue"
                );
                self.terminate_and_erase(TerminationReason::SessionInvalidated)
                    .await;
            }
            TransportEvent::Closed(reason) => self.on_transient_close(reason).await,
        }
    }

    async fn start(&mut self) -> StartOutcome {
        if !self.status.state.is_inactive() {
            debug!(state = %self.status.state, "Start ignored, session already active");
            return StartOutcome::AlreadyActive;
        }
        self.backoff.reset();
        self.status.termination = None;
        self.status.degraded = None;
        self.begin_connect().await;
        StartOutcome::Initiated
    }

    /// Load credentials and open a transport under a new generation.
    async fn begin_connect(&mut self) {
        self.status.generation += 1;
        let generation = self.status.generation;
        self.status.challenge = None;
        self.transition(SessionState::Connecting);

        let credentials = match self.store.load().await {
            Ok(credentials) => credentials,
            Err(e) => {
                error!(error = %e, "Failed to load credentials; repair or remove the auth directory and start again");
                metrics::inc(&metrics::PERSISTENCE_FAILURES);
                self.status.degraded = Some(SessionError::from(e).to_string());
                self.finish(TerminationReason::CredentialsUnavailable);
                return;
            }
        };

        metrics::inc(&metrics::TRANSPORT_OPENS);
        let connector = Arc::clone(&self.connector);
        let internal = self.internal_tx.clone();
        tokio::spawn(
            async move {
                let result = connector.open(credentials).await;
                let _ = internal.send(Internal::OpenCompleted { generation, result });
            }
            .instrument(spans::session(generation)),
        );
    }

    fn spawn_pump(&self, generation: u64, mut events: mpsc::Receiver<TransportEvent>) {
        let internal = self.internal_tx.clone();
        tokio::spawn(
            async move {
                while let Some(event) = events.recv().await {
                    if internal.send(Internal::Event { generation, event }).is_err() {
                        return;
                    }
                }
                let _ = internal.send(Internal::EventsEnded { generation });
            }
            .instrument(spans::session(generation)),
        );
    }

    fn on_challenge(&mut self, raw: String) {
        if !matches!(
            self.status.state,
            SessionState::Connecting | SessionState::AwaitingPairing
        ) {
            warn!(state = %self.status.state, "Ignoring pairing challenge outside pairing");
            return;
        }

        let encoded = match self.encoder.encode(&raw) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Failed to encode pairing challenge, serving it raw");
                raw.clone()
            }
        };
        if self.print_terminal {
            match render_terminal(&raw) {
                Ok(art) => info!("Scan to pair:\n{art}"),
                Err(e) => warn!(error = %e, "Failed to render pairing challenge"),
            }
        }

        metrics::inc(&metrics::PAIRING_CHALLENGES);
        self.status.challenge = Some(encoded);
        self.transition(SessionState::AwaitingPairing);
    }

    async fn persist(&mut self, update: &CredentialUpdate) {
        if update.is_empty() {
            return;
        }
        match self.store.save(update).await {
            Ok(()) => {
                metrics::inc(&metrics::CREDENTIAL_SAVES);
                if self.status.degraded.take().is_some() {
                    info!("Credential persistence recovered");
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to persist credential update; session continues");
                metrics::inc(&metrics::PERSISTENCE_FAILURES);
                self.status.degraded = Some(SessionError::from(e).to_string());
            }
        }
    }

    async fn on_transient_close(&mut self, reason: CloseReason) {
        if let Some(transport) = self.live.take() {
            transport.close();
        }
        self.status.challenge = None;
        warn!(generation = self.status.generation, %reason, "Transport closed, reconnecting");
        self.transition(SessionState::Reconnecting);

        match self.backoff.next_delay() {
            None => {
                error!(
                    attempts = self.backoff.attempt(),
                    "Reconnect attempts exhausted; credentials kept, start again to retry"
                );
                self.finish(TerminationReason::ReconnectExhausted);
            }
            Some(delay) if delay.is_zero() => {
                metrics::inc(&metrics::RECONNECTS);
                self.begin_connect().await;
            }
            Some(delay) => {
                metrics::inc(&metrics::RECONNECTS);
                debug!(?delay, attempt = self.backoff.attempt(), "Reconnect scheduled");
                let generation = self.status.generation;
                let internal = self.internal_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = internal.send(Internal::ReconnectDue { generation });
                });
            }
        }
    }

    async fn logout(&mut self) -> LogoutOutcome {
        if self.status.state.is_inactive() {
            debug!(state = %self.status.state, "Logout ignored, session inactive");
            return LogoutOutcome::AlreadyInactive;
        }

        let remote = match (&self.live, self.status.state) {
            (Some(transport), SessionState::Authenticated) => Some(Arc::clone(transport)),
            _ => None,
        };
        let remote_error = match remote {
            Some(transport) => {
                match tokio::time::timeout(self.logout_timeout, transport.logout()).await {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => {
                        warn!(error = %e, "Remote logout failed, tearing down locally");
                        Some(e.to_string())
                    }
                    Err(_) => {
                        warn!(timeout = ?self.logout_timeout, "Remote logout timed out, tearing down locally");
                        Some("remote logout timed out".to_string())
                    }
                }
            }
            None => None,
        };

        let persistence_error = self.terminate_and_erase(TerminationReason::LoggedOut).await;
        info!("Logged out");
        LogoutOutcome::Terminated {
            remote_error,
            persistence_error,
        }
    }

    fn lookup_transport(&self) -> SessionResult<Arc<dyn Transport>> {
        match (&self.live, self.status.state) {
            (Some(transport), SessionState::Authenticated) => Ok(Arc::clone(transport)),
            (_, SessionState::Terminated)
                if self.status.termination == Some(TerminationReason::ReconnectExhausted) =>
            {
                Err(SessionError::ReconnectExhausted)
            }
            _ => Err(SessionError::NotConnected),
        }
    }

    /// Enter Terminated without touching stored credentials.
    fn finish(&mut self, reason: TerminationReason) {
        if let Some(transport) = self.live.take() {
            transport.close();
        }
        self.status.challenge = None;
        self.status.termination = Some(reason);
        self.transition(SessionState::Terminated);
    }

    /// Enter Terminated and erase stored credentials. Returns the erase
    /// failure, if any.
    async fn terminate_and_erase(&mut self, reason: TerminationReason) -> Option<String> {
        self.finish(reason);
        match self.store.erase().await {
            Ok(()) => None,
            Err(e) => {
                error!(error = %e, "Failed to erase credentials");
                metrics::inc(&metrics::PERSISTENCE_FAILURES);
                let message = SessionError::from(e).to_string();
                self.status.degraded = Some(message.clone());
                Some(message)
            }
        }
    }

    /// Close the live transport and go idle; credentials are kept.
    fn stop(&mut self) {
        if let Some(transport) = self.live.take() {
            transport.close();
        }
        self.status.challenge = None;
        if self.status.state != SessionState::Terminated {
            self.transition(SessionState::Idle);
        }
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.status.state;
        if from == to {
            return;
        }
        info!(%from, %to, generation = self.status.generation, "Session state changed");
        self.status.state = to;
    }

    fn publish(&mut self) {
        self.status.reconnect_attempt = self.backoff.attempt();
        metrics::set_session_state(self.status.state);
        let snapshot = self.status.clone();
        self.status_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
