//! HTTP API.
//!
//! A thin adapter over [`SessionManager`]: every route maps to one session
//! operation and every [`SessionError`] maps to a JSON error body with a
//! stable code. `/metrics` serves the Prometheus registry when enabled.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::Stream;
use serde_json::{Value, json};
use tokio::time::MissedTickBehavior;
use tower_http::cors::CorsLayer;
use tracing::{Instrument, debug};

use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::session::{LogoutOutcome, PhotoLookup, SessionManager, SessionStatus};
use crate::telemetry::spans;

#[derive(Clone)]
pub struct AppState {
    session: SessionManager,
    stream_interval: Duration,
}

impl AppState {
    pub fn new(session: SessionManager, stream_interval: Duration) -> Self {
        Self {
            session,
            stream_interval,
        }
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotConnected => StatusCode::CONFLICT,
            Self::InvalidContact => StatusCode::BAD_REQUEST,
            Self::LookupFailed(_) => StatusCode::BAD_GATEWAY,
            Self::ManagerStopped | Self::ReconnectExhausted => StatusCode::SERVICE_UNAVAILABLE,
            Self::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "error": self.to_string(), "code": self.error_code() });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/connect", post(connect))
        .route("/qr", get(qr_stream))
        .route("/status", get(status))
        .route("/logout", post(logout))
        .route("/foto/:contact", get(photo));
    if config.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    let router = router.with_state(state);
    if config.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Serve `app` on `addr` until `shutdown` resolves.
pub async fn run_http_server(
    addr: SocketAddr,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind HTTP server");
            return Err(e);
        }
    };
    tracing::info!(%addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn connect(State(state): State<AppState>) -> Result<Json<Value>, SessionError> {
    let outcome = state
        .session
        .start()
        .instrument(spans::request("connect"))
        .await?;
    Ok(Json(json!({ "status": outcome.as_str() })))
}

/// Pushes the current challenge, or `null`, every `stream_interval`. The
/// first event goes out immediately.
async fn qr_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("Pairing stream opened");
    let mut ticker = tokio::time::interval(state.stream_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let stream = futures_util::stream::unfold(
        (ticker, state.session),
        |(mut ticker, session)| async move {
            ticker.tick().await;
            let data = session
                .current_challenge()
                .unwrap_or_else(|| "null".to_string());
            Some((Ok(Event::default().data(data)), (ticker, session)))
        },
    );
    Sse::new(stream)
}

async fn status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.session.status())
}

async fn logout(State(state): State<AppState>) -> Result<Json<Value>, SessionError> {
    let outcome = state
        .session
        .logout()
        .instrument(spans::request("logout"))
        .await?;

    let body = match outcome {
        LogoutOutcome::Terminated {
            remote_error,
            persistence_error,
        } => {
            let mut body = json!({ "status": "terminated" });
            if let Some(e) = remote_error {
                body["remote_error"] = e.into();
            }
            if let Some(e) = persistence_error {
                body["persistence_error"] = e.into();
            }
            body
        }
        LogoutOutcome::AlreadyInactive => json!({ "status": "already_inactive" }),
    };
    Ok(Json(body))
}

async fn photo(
    State(state): State<AppState>,
    Path(contact): Path<String>,
) -> Result<Json<PhotoLookup>, SessionError> {
    let lookup = state
        .session
        .profile_photo(&contact)
        .instrument(spans::request("photo"))
        .await?;
    Ok(Json(lookup))
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}
