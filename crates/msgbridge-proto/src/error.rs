//! Error types for frame encoding and decoding.

use thiserror::Error;

/// Convenience type alias for Results using [`FrameError`].
pub type Result<T, E = FrameError> = std::result::Result<T, E>;

/// Errors raised while converting frames to or from their text form.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The text was not valid JSON or did not match any known frame.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}
