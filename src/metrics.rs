//! Prometheus metrics collection for msgbridge.
//!
//! Everything here is a no-op until [`init`] registers the metrics, so unit
//! tests and embedders that never call it pay nothing.
//!
//! ## Session Metrics
//!
//! - `msgbridge_session_state` - Current lifecycle state (see [`state_id`])
//! - `msgbridge_transport_opens_total` - Transports opened
//! - `msgbridge_reconnects_total` - Transient closes that scheduled a reconnect
//! - `msgbridge_stale_events_total` - Events from discarded transports
//! - `msgbridge_photo_lookups_total{result}` - Profile photo lookups by outcome

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

use crate::session::SessionState;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Transports opened (every connect cycle, reconnects included).
pub static TRANSPORT_OPENS: OnceLock<IntCounter> = OnceLock::new();

/// Transient closes that scheduled a reconnect.
pub static RECONNECTS: OnceLock<IntCounter> = OnceLock::new();

/// Events and open completions discarded because their transport was stale.
pub static STALE_EVENTS: OnceLock<IntCounter> = OnceLock::new();

/// Credential updates persisted.
pub static CREDENTIAL_SAVES: OnceLock<IntCounter> = OnceLock::new();

/// Credential saves or erases that failed.
pub static PERSISTENCE_FAILURES: OnceLock<IntCounter> = OnceLock::new();

/// Pairing challenges received.
pub static PAIRING_CHALLENGES: OnceLock<IntCounter> = OnceLock::new();

/// Profile photo lookups by result (`found`, `none`, `error`).
pub static PHOTO_LOOKUPS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges (can go up and down)
// ========================================================================

/// Current session state, encoded by [`state_id`].
pub static SESSION_STATE: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(TRANSPORT_OPENS, IntCounter::new("msgbridge_transport_opens_total", "Transports opened"));
    register!(RECONNECTS, IntCounter::new("msgbridge_reconnects_total", "Reconnects scheduled after transient closes"));
    register!(STALE_EVENTS, IntCounter::new("msgbridge_stale_events_total", "Events discarded from stale transports"));
    register!(CREDENTIAL_SAVES, IntCounter::new("msgbridge_credential_saves_total", "Credential updates persisted"));
    register!(PERSISTENCE_FAILURES, IntCounter::new("msgbridge_persistence_failures_total", "Credential store failures"));
    register!(PAIRING_CHALLENGES, IntCounter::new("msgbridge_pairing_challenges_total", "Pairing challenges received"));
    register!(PHOTO_LOOKUPS, IntCounterVec::new(Opts::new("msgbridge_photo_lookups_total", "Profile photo lookups by result"), &["result"]));
    register!(SESSION_STATE, IntGauge::new("msgbridge_session_state", "Session state (0 idle, 1 connecting, 2 awaiting pairing, 3 authenticated, 4 reconnecting, 5 terminated)"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for session metric updates
// ============================================================================

/// Numeric encoding of a state for the gauge.
pub fn state_id(state: SessionState) -> i64 {
    match state {
        SessionState::Idle => 0,
        SessionState::Connecting => 1,
        SessionState::AwaitingPairing => 2,
        SessionState::Authenticated => 3,
        SessionState::Reconnecting => 4,
        SessionState::Terminated => 5,
    }
}

#[inline]
pub fn inc(counter: &OnceLock<IntCounter>) {
    if let Some(c) = counter.get() {
        c.inc();
    }
}

#[inline]
pub fn set_session_state(state: SessionState) {
    if let Some(g) = SESSION_STATE.get() {
        g.set(state_id(state));
    }
}

#[inline]
pub fn record_photo_lookup(result: &str) {
    if let Some(c) = PHOTO_LOOKUPS.get() {
        c.with_label_values(&[result]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();

        inc(&TRANSPORT_OPENS);
        set_session_state(SessionState::Authenticated);
        record_photo_lookup("found");

        let output = gather_metrics();
        assert!(output.contains("msgbridge_transport_opens_total"));
        assert!(output.contains("msgbridge_photo_lookups_total{result=\"found\"}"));
        assert!(output.contains("msgbridge_session_state"));
    }
}
