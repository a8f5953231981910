//! Credential store abstraction.
//!
//! A store owns the credential material of one session identity. The
//! session manager loads it at the start of every connect cycle, saves each
//! incremental update the transport reports, and erases it when the remote
//! service invalidates the session or the operator logs out.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use msgbridge_proto::JsonObject;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

pub mod file;
pub mod memory;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt credential file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Credential material for one session identity. Opaque to everything but
/// the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(JsonObject);

impl Credentials {
    /// A brand new identity, used when nothing has been persisted yet.
    pub fn fresh() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);

        let mut object = JsonObject::new();
        object.insert("identity_id".into(), uuid::Uuid::new_v4().to_string().into());
        object.insert(
            "registration_id".into(),
            (rand::random::<u16>() & 0x3fff).into(),
        );
        object.insert("adv_secret_key".into(), STANDARD.encode(secret).into());
        object.insert("created_at".into(), chrono::Utc::now().to_rfc3339().into());
        Self(object)
    }

    pub fn from_object(object: JsonObject) -> Self {
        Self(object)
    }

    pub fn as_object(&self) -> &JsonObject {
        &self.0
    }

    pub fn into_object(self) -> JsonObject {
        self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Merge an update: each key replaces the stored value, `null` removes it.
    /// Keys listed in `nested` are merged one level deeper instead.
    pub fn apply(&mut self, update: &CredentialUpdate, nested: &[String]) {
        for (key, value) in update.as_object() {
            if value.is_null() {
                self.0.remove(key);
                continue;
            }
            if nested.iter().any(|k| k == key)
                && let (Some(Value::Object(current)), Value::Object(incoming)) =
                    (self.0.get_mut(key), value)
            {
                for (inner_key, inner_value) in incoming {
                    if inner_value.is_null() {
                        current.remove(inner_key);
                    } else {
                        current.insert(inner_key.clone(), inner_value.clone());
                    }
                }
                continue;
            }
            self.0.insert(key.clone(), value.clone());
        }
    }
}

/// An incremental credential change reported by the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialUpdate(JsonObject);

impl CredentialUpdate {
    pub fn new(object: JsonObject) -> Self {
        Self(object)
    }

    pub fn as_object(&self) -> &JsonObject {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<JsonObject> for CredentialUpdate {
    fn from(object: JsonObject) -> Self {
        Self(object)
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Return the stored credentials, or a fresh identity when none exist.
    ///
    /// Repeated calls return the same fresh identity until it is erased, so
    /// a reconnect before the first update still presents the same identity.
    async fn load(&self) -> Result<Credentials, StoreError>;

    /// Persist one update. Must be durable when this returns.
    async fn save(&self, update: &CredentialUpdate) -> Result<(), StoreError>;

    /// Remove all persisted material. Erasing an empty store succeeds.
    async fn erase(&self) -> Result<(), StoreError>;
}
