//! WebSocket client for a messaging gateway.
//!
//! The gateway holds the actual protocol connection and speaks JSON frames
//! (see `msgbridge_proto`). One socket carries one session attempt: the
//! daemon sends an `open` frame with its credentials, then receives pairing
//! challenges, credential updates and finally a `close` frame. Requests
//! (logout, profile picture lookups) are correlated with their responses by
//! a numeric id.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use msgbridge_proto::{ClientFrame, GatewayFrame};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use super::{CloseReason, Connector, Transport, TransportError, TransportEvent, TransportHandle};
use crate::config::GatewayConfig;
use crate::store::Credentials;

/// Events buffered between the socket reader and the session manager.
const EVENT_BUFFER: usize = 64;

type PendingReply = oneshot::Sender<Result<Option<Value>, TransportError>>;

pub struct GatewayConnector {
    url: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    browser: [String; 3],
}

impl GatewayConnector {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            url: config.url.clone(),
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            browser: config.browser.clone(),
        }
    }
}

#[async_trait]
impl Connector for GatewayConnector {
    async fn open(&self, credentials: Credentials) -> Result<TransportHandle, TransportError> {
        let (socket, _) = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout("gateway connect"))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(url = %self.url, "Gateway socket established");

        let (mut sink, stream) = socket.split();
        let open = ClientFrame::Open {
            credentials: credentials.into_object(),
            browser: self.browser.clone(),
        };
        sink.send(WsMessage::Text(open.to_text()?))
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<WsMessage>();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let shared = Arc::new(Shared::default());

        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let closing = matches!(msg, WsMessage::Close(_));
                if let Err(e) = sink.send(msg).await {
                    debug!(error = %e, "Gateway write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(read_loop(stream, Arc::clone(&shared), event_tx));

        let transport = GatewayTransport {
            outgoing: outgoing_tx,
            shared,
            request_timeout: self.request_timeout,
        };
        Ok(TransportHandle {
            transport: Arc::new(transport),
            events: event_rx,
        })
    }
}

#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<u64, PendingReply>>,
    next_id: AtomicU64,
    authenticated: AtomicBool,
    closed: AtomicBool,
    shutdown: Notify,
}

impl Shared {
    fn fail_pending(&self) {
        for (_, reply) in self.pending.lock().drain() {
            let _ = reply.send(Err(TransportError::Closed));
        }
    }
}

async fn read_loop<S>(mut stream: S, shared: Arc<Shared>, events: mpsc::Sender<TransportEvent>)
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    let mut close_reported = false;
    loop {
        let msg = tokio::select! {
            msg = stream.next() => msg,
            _ = shared.shutdown.notified() => break,
        };
        let text = match msg {
            Some(Ok(WsMessage::Text(text))) => text,
            Some(Ok(WsMessage::Close(frame))) => {
                debug!(?frame, "Gateway closed the socket");
                break;
            }
            Some(Ok(WsMessage::Binary(_))) => {
                warn!("Ignoring binary gateway frame");
                continue;
            }
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => continue,
            Some(Err(e)) => {
                warn!(error = %e, "Gateway socket error");
                break;
            }
            None => break,
        };

        let frame = match GatewayFrame::parse(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed gateway frame");
                continue;
            }
        };

        let event = match frame {
            GatewayFrame::Qr { qr } => TransportEvent::PairingChallenge(qr),
            GatewayFrame::Open => {
                shared.authenticated.store(true, Ordering::SeqCst);
                TransportEvent::Opened
            }
            GatewayFrame::Close {
                status_code,
                message,
            } => {
                shared.authenticated.store(false, Ordering::SeqCst);
                close_reported = true;
                TransportEvent::Closed(CloseReason {
                    status_code,
                    message,
                })
            }
            GatewayFrame::CredsUpdate { update } => TransportEvent::CredentialsUpdated(update.into()),
            GatewayFrame::Response {
                id,
                ok,
                result,
                error,
            } => {
                match shared.pending.lock().remove(&id) {
                    Some(reply) => {
                        let outcome = if ok {
                            Ok(result)
                        } else {
                            Err(TransportError::Remote(
                                error.unwrap_or_else(|| "unknown error".to_string()),
                            ))
                        };
                        let _ = reply.send(outcome);
                    }
                    None => debug!(id, "Response for unknown request"),
                }
                continue;
            }
            GatewayFrame::Unknown => {
                debug!("Ignoring unknown gateway event");
                continue;
            }
        };

        let is_close = matches!(event, TransportEvent::Closed(_));
        if events.send(event).await.is_err() || is_close {
            break;
        }
    }

    shared.authenticated.store(false, Ordering::SeqCst);
    let closed_locally = shared.closed.swap(true, Ordering::SeqCst);
    shared.fail_pending();

    if !close_reported && !closed_locally {
        let _ = events
            .send(TransportEvent::Closed(CloseReason::transient(
                "gateway connection lost",
            )))
            .await;
    }
}

struct GatewayTransport {
    outgoing: mpsc::UnboundedSender<WsMessage>,
    shared: Arc<Shared>,
    request_timeout: Duration,
}

impl GatewayTransport {
    async fn request(
        &self,
        build: impl FnOnce(u64) -> ClientFrame,
    ) -> Result<Option<Value>, TransportError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let text = build(id).to_text()?;
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, tx);

        if self.outgoing.send(WsMessage::Text(text)).is_err() {
            self.shared.pending.lock().remove(&id);
            return Err(TransportError::Closed);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                Err(TransportError::Timeout("gateway request"))
            }
        }
    }
}

#[async_trait]
impl Transport for GatewayTransport {
    async fn logout(&self) -> Result<(), TransportError> {
        self.request(|id| ClientFrame::Logout { id }).await?;
        Ok(())
    }

    async fn profile_photo_url(&self, address: &str) -> Result<Option<String>, TransportError> {
        if !self.shared.authenticated.load(Ordering::SeqCst) {
            return Err(TransportError::NotAuthenticated);
        }
        let result = self
            .request(|id| ClientFrame::ProfilePictureUrl {
                id,
                jid: address.to_string(),
                kind: "image".to_string(),
            })
            .await?;
        match result {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(url)) => Ok(Some(url)),
            Some(other) => Err(TransportError::UnexpectedResponse(other.to_string())),
        }
    }

    fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.authenticated.store(false, Ordering::SeqCst);
        self.shared.shutdown.notify_one();
        let _ = self.outgoing.send(WsMessage::Close(None));
        self.shared.fail_pending();
    }
}
