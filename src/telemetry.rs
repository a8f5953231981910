//! Telemetry utilities for session and request correlation.

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span wrapping everything one transport generation does.
    pub fn session(generation: u64) -> Span {
        info_span!("session", generation)
    }

    /// Span for one HTTP operation.
    pub fn request(op: &'static str) -> Span {
        info_span!("request", op)
    }
}
