//! # msgbridge-proto
//!
//! Wire frames exchanged between the msgbridge daemon and a messaging
//! gateway, plus the contact addressing rules the gateway expects.
//!
//! The crate does no I/O. Frames are JSON text messages, one frame per
//! WebSocket message:
//!
//! ```rust
//! use msgbridge_proto::{ClientFrame, GatewayFrame};
//!
//! let frame = ClientFrame::Logout { id: 7 };
//! assert_eq!(frame.to_text().unwrap(), r#"{"op":"logout","id":7}"#);
//!
//! let event = GatewayFrame::parse(r#"{"event":"close","status_code":401}"#).unwrap();
//! assert!(matches!(event, GatewayFrame::Close { status_code: Some(401), .. }));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod address;
pub mod error;
pub mod frame;

pub use address::{contact_address, DEFAULT_ADDRESS_DOMAIN};
pub use error::{FrameError, Result};
pub use frame::{ClientFrame, GatewayFrame, JsonObject, LOGGED_OUT_STATUS};
