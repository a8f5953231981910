//! Multi-file credential store.
//!
//! Layout of the auth directory:
//!
//! ```text
//! auth/
//!   creds.json        every top-level key not listed in `split_keys`
//!   keys.json         one file per split key (large, frequently updated maps)
//! ```
//!
//! Every write goes to a temporary file that is fsynced and renamed over the
//! target, so a crash never leaves a half-written credential file behind.

use super::{CredentialStore, CredentialUpdate, Credentials, StoreError};
use async_trait::async_trait;
use msgbridge_proto::JsonObject;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const CREDS_FILE: &str = "creds.json";

/// One file of the auth directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Target {
    Main,
    Split(String),
}

#[derive(Default)]
struct State {
    /// Last loaded or saved credentials. `None` until the first load.
    creds: Option<Credentials>,
    /// Files whose in-memory content has not reached disk yet.
    unwritten: BTreeSet<Target>,
}

pub struct FileCredentialStore {
    dir: PathBuf,
    split_keys: Vec<String>,
    state: Mutex<State>,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_split_keys(dir, vec!["keys".to_string()])
    }

    pub fn with_split_keys(dir: impl Into<PathBuf>, split_keys: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            split_keys,
            state: Mutex::new(State::default()),
        }
    }

    fn file_for(&self, key: &str) -> PathBuf {
        let name = key.replace('/', "__").replace(':', "-");
        self.dir.join(format!("{name}.json"))
    }

    fn is_split(&self, key: &str) -> bool {
        self.split_keys.iter().any(|k| k == key)
    }

    fn target_for(&self, key: &str) -> Target {
        if self.is_split(key) {
            Target::Split(key.to_string())
        } else {
            Target::Main
        }
    }

    async fn read_disk(&self) -> Result<Option<Credentials>, StoreError> {
        let Some(mut object) = read_object(&self.dir.join(CREDS_FILE)).await? else {
            return Ok(None);
        };
        for key in &self.split_keys {
            if let Some(split) = read_object(&self.file_for(key)).await? {
                object.insert(key.clone(), Value::Object(split));
            }
        }
        Ok(Some(Credentials::from_object(object)))
    }

    /// Write every target, removing each from the set once it is on disk.
    /// On error the set holds exactly the files still to be written.
    async fn write_targets(
        &self,
        creds: &Credentials,
        targets: &mut BTreeSet<Target>,
    ) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        while let Some(target) = targets.first().cloned() {
            match &target {
                Target::Main => {
                    let main: JsonObject = creds
                        .as_object()
                        .iter()
                        .filter(|(k, _)| !self.is_split(k.as_str()))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    write_atomic(&self.dir.join(CREDS_FILE), &Value::Object(main)).await?;
                }
                Target::Split(key) => {
                    let path = self.file_for(key);
                    match creds.get(key) {
                        Some(value) => write_atomic(&path, value).await?,
                        None => remove_if_exists(&path).await?,
                    }
                }
            }
            targets.remove(&target);
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Credentials, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(creds) = state.creds.as_ref() {
            return Ok(creds.clone());
        }
        let creds = match self.read_disk().await? {
            Some(creds) => {
                debug!(dir = %self.dir.display(), "Loaded stored credentials");
                creds
            }
            None => {
                info!(dir = %self.dir.display(), "No stored credentials, created fresh identity");
                Credentials::fresh()
            }
        };
        state.creds = Some(creds.clone());
        Ok(creds)
    }

    /// Succeeds only once the update and every file left over from earlier
    /// failed saves are on disk.
    async fn save(&self, update: &CredentialUpdate) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let mut creds = match state.creds.take() {
            Some(creds) => creds,
            None => self.read_disk().await?.unwrap_or_else(Credentials::fresh),
        };
        creds.apply(update, &self.split_keys);

        let mut targets = std::mem::take(&mut state.unwritten);
        if !targets.is_empty() {
            debug!(pending = targets.len(), "Retrying credential files from a failed save");
        }
        targets.extend(update.as_object().keys().map(|k| self.target_for(k)));
        // creds.json carries the identity keys and must exist after the
        // first save, whatever the update touched.
        if !tokio::fs::try_exists(self.dir.join(CREDS_FILE)).await? {
            targets.insert(Target::Main);
        }

        let result = self.write_targets(&creds, &mut targets).await;
        if result.is_err() {
            warn!(pending = targets.len(), "Credential files left unwritten");
        }
        state.unwritten = targets;
        state.creds = Some(creds);
        result
    }

    async fn erase(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        *state = State::default();
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                info!(dir = %self.dir.display(), "Credential directory erased");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_object(path: &Path) -> Result<Option<JsonObject>, StoreError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_atomic(path: &Path, value: &Value) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    sync_parent(path).await
}

/// Flush the directory entry so a completed rename survives a crash.
#[cfg(unix)]
async fn sync_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::File::open(parent).await?.sync_all().await?;
    }
    Ok(())
}

#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(value: Value) -> CredentialUpdate {
        match value {
            Value::Object(map) => CredentialUpdate::new(map),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn load_without_files_is_stable_and_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("auth");
        let store = FileCredentialStore::new(&dir);

        let first = store.load().await.unwrap();
        let second = store.load().await.unwrap();
        assert_eq!(first, second);
        assert!(!dir.exists(), "load must not persist speculatively");
    }

    #[tokio::test]
    async fn save_persists_identity_and_update() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("auth");
        let store = FileCredentialStore::new(&dir);
        let fresh = store.load().await.unwrap();

        store
            .save(&update(json!({"me": {"id": "15551234567:1@s.whatsapp.net"}})))
            .await
            .unwrap();

        let reopened = FileCredentialStore::new(&dir);
        let creds = reopened.load().await.unwrap();
        assert_eq!(creds.get("identity_id"), fresh.get("identity_id"));
        assert_eq!(creds.get("me").unwrap()["id"], "15551234567:1@s.whatsapp.net");
    }

    #[tokio::test]
    async fn split_keys_live_in_their_own_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("auth");
        let store = FileCredentialStore::new(&dir);
        store.load().await.unwrap();

        store
            .save(&update(json!({"keys": {"pre-key-1": "a"}})))
            .await
            .unwrap();
        store
            .save(&update(json!({"keys": {"pre-key-2": "b"}})))
            .await
            .unwrap();

        let on_disk: Value =
            serde_json::from_slice(&std::fs::read(dir.join("keys.json")).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"pre-key-1": "a", "pre-key-2": "b"}));

        let main: Value =
            serde_json::from_slice(&std::fs::read(dir.join("creds.json")).unwrap()).unwrap();
        assert!(main.get("keys").is_none());
        assert!(main.get("identity_id").is_some());

        let reloaded = FileCredentialStore::new(&dir).load().await.unwrap();
        assert_eq!(reloaded.get("keys").unwrap()["pre-key-2"], "b");
    }

    #[tokio::test]
    async fn erase_removes_directory_and_resets_identity() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("auth");
        let store = FileCredentialStore::new(&dir);
        let before = store.load().await.unwrap();
        store.save(&update(json!({"paired": true}))).await.unwrap();
        assert!(dir.exists());

        store.erase().await.unwrap();
        assert!(!dir.exists());
        // Erasing twice is fine.
        store.erase().await.unwrap();

        let after = store.load().await.unwrap();
        assert_ne!(before.get("identity_id"), after.get("identity_id"));
        assert!(after.get("paired").is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("auth");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(CREDS_FILE), b"{not json").unwrap();

        let err = FileCredentialStore::new(&dir).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn failed_write_is_retried_by_the_next_save() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("auth");
        let store = FileCredentialStore::new(&dir);
        store.load().await.unwrap();
        store.save(&update(json!({"me": {"id": "1"}}))).await.unwrap();

        // A directory in the temp file's place makes the keys write fail.
        let obstruction = dir.join("keys.json.tmp");
        std::fs::create_dir(&obstruction).unwrap();
        assert!(store
            .save(&update(json!({"keys": {"pre-key-1": "a"}})))
            .await
            .is_err());
        assert!(!dir.join("keys.json").exists());

        // The next save touches only creds.json but must also write keys.json.
        std::fs::remove_dir(&obstruction).unwrap();
        store.save(&update(json!({"me": {"id": "2"}}))).await.unwrap();

        let reloaded = FileCredentialStore::new(&dir).load().await.unwrap();
        assert_eq!(reloaded.get("keys").unwrap(), &json!({"pre-key-1": "a"}));
        assert_eq!(reloaded.get("me").unwrap()["id"], "2");
    }

    #[tokio::test]
    async fn save_keeps_failing_while_a_file_cannot_be_written() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("auth");
        let store = FileCredentialStore::new(&dir);
        store.load().await.unwrap();
        store.save(&update(json!({"me": {"id": "1"}}))).await.unwrap();

        std::fs::create_dir(dir.join("keys.json.tmp")).unwrap();
        assert!(store
            .save(&update(json!({"keys": {"pre-key-1": "a"}})))
            .await
            .is_err());
        // Unrelated updates cannot report success while keys.json is behind.
        assert!(store.save(&update(json!({"me": {"id": "2"}}))).await.is_err());

        let on_disk: Value =
            serde_json::from_slice(&std::fs::read(dir.join(CREDS_FILE)).unwrap()).unwrap();
        assert_eq!(on_disk["me"]["id"], "2");
    }

    #[test]
    fn key_file_names_are_sanitized() {
        let store = FileCredentialStore::new("/tmp/auth");
        assert_eq!(
            store.file_for("app-state:sync/key"),
            PathBuf::from("/tmp/auth/app-state-sync__key.json")
        );
    }
}
