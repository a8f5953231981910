//! Gateway frames.
//!
//! [`ClientFrame`] travels from the daemon to the gateway, [`GatewayFrame`]
//! the other way. Requests that expect an answer carry a numeric `id` which
//! the gateway echoes in a [`GatewayFrame::Response`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Opaque JSON object used for credential material and credential updates.
pub type JsonObject = serde_json::Map<String, Value>;

/// Close status meaning the remote service logged this device out.
///
/// Any other status (or none at all) describes a connection that may be
/// resumed with the same credentials.
pub const LOGGED_OUT_STATUS: u16 = 401;

/// Frames sent by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Open a session with the given credentials. Always the first frame.
    Open {
        /// Credential material as last persisted.
        credentials: JsonObject,
        /// Browser identity announced to the remote service
        /// (`[platform, browser, version]`).
        browser: [String; 3],
    },
    /// Ask the remote service to end this device's session.
    Logout {
        /// Request id echoed in the response.
        id: u64,
    },
    /// Resolve the profile picture URL of a contact.
    ProfilePictureUrl {
        /// Request id echoed in the response.
        id: u64,
        /// Contact address, see [`crate::contact_address`].
        jid: String,
        /// Picture flavour, `"image"` for full size or `"preview"`.
        kind: String,
    },
}

impl ClientFrame {
    /// Serialize to the JSON text sent on the socket.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Request id, for frames that expect a response.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            Self::Open { .. } => None,
            Self::Logout { id } | Self::ProfilePictureUrl { id, .. } => Some(*id),
        }
    }
}

/// Frames sent by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GatewayFrame {
    /// A pairing challenge to show to the operator.
    Qr {
        /// Opaque challenge string.
        qr: String,
    },
    /// The session is authenticated and usable.
    Open,
    /// The remote side closed the session.
    Close {
        /// HTTP-like status code classifying the close.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        /// Human readable reason.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Incremental credential material that must be persisted.
    CredsUpdate {
        /// Keys to merge into the stored credentials.
        update: JsonObject,
    },
    /// Answer to a request carrying `id`.
    Response {
        /// Id of the request being answered.
        id: u64,
        /// Whether the request succeeded.
        ok: bool,
        /// Result payload on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Error message on failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Any event this version does not understand.
    #[serde(other)]
    Unknown,
}

impl GatewayFrame {
    /// Parse a JSON text frame.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to the JSON text sent on the socket.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// True for a close frame carrying [`LOGGED_OUT_STATUS`].
    pub fn is_logged_out(&self) -> bool {
        matches!(
            self,
            Self::Close {
                status_code: Some(LOGGED_OUT_STATUS),
                ..
            }
        )
    }
}
