//! Pairing challenge encoding.
//!
//! The remote service hands out an opaque challenge string that the
//! operator scans with their phone. HTTP clients receive it as an image data
//! URL they can drop into an `<img>` tag; operators watching the log can get
//! a terminal rendering instead.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::QrCode;
use qrcode::render::{svg, unicode};
use qrcode::types::QrError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("challenge does not fit in a QR code: {0}")]
    Qr(#[from] QrError),
}

/// Turns a raw pairing challenge into something a client can display.
pub trait Encoder: Send + Sync {
    fn encode(&self, challenge: &str) -> Result<String, EncodeError>;
}

/// Renders the challenge as an SVG QR code wrapped in a base64 data URL.
#[derive(Debug, Clone)]
pub struct QrDataUrlEncoder {
    min_size: u32,
}

impl QrDataUrlEncoder {
    pub const MIME: &'static str = "image/svg+xml";

    pub fn new(min_size: u32) -> Self {
        Self { min_size }
    }
}

impl Default for QrDataUrlEncoder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Encoder for QrDataUrlEncoder {
    fn encode(&self, challenge: &str) -> Result<String, EncodeError> {
        let code = QrCode::new(challenge.as_bytes())?;
        let image = code
            .render::<svg::Color<'_>>()
            .min_dimensions(self.min_size, self.min_size)
            .build();
        Ok(format!("data:{};base64,{}", Self::MIME, STANDARD.encode(image)))
    }
}

/// Dense unicode rendering for a terminal with a dark background.
pub fn render_terminal(challenge: &str) -> Result<String, EncodeError> {
    let code = QrCode::new(challenge.as_bytes())?;
    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .quiet_zone(true)
        .build())
}
