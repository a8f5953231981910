//! In-memory credential store.
//!
//! Keeps everything in process memory. Used by tests, and handy for
//! throwaway sessions where re-pairing on every restart is acceptable.

use super::{CredentialStore, CredentialUpdate, Credentials, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Default)]
pub struct MemoryCredentialStore {
    state: Mutex<Option<Credentials>>,
    saved: Mutex<Vec<CredentialUpdate>>,
    persisted: AtomicBool,
    erases: AtomicUsize,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
    fail_erases: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl MemoryCredentialStore {
    /// Start from existing credentials, as if a previous run persisted them.
    pub fn with_credentials(creds: Credentials) -> Self {
        let store = Self::default();
        *store.state.lock() = Some(creds);
        store.persisted.store(true, Ordering::SeqCst);
        store
    }

    /// Make every subsequent `save` fail until reset.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `load` fail until reset.
    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `erase` fail (leaving the state intact) until reset.
    pub fn fail_erases(&self, fail: bool) {
        self.fail_erases.store(fail, Ordering::SeqCst);
    }

    /// Updates successfully saved so far, in order.
    pub fn saved_updates(&self) -> Vec<CredentialUpdate> {
        self.saved.lock().clone()
    }

    /// True once something has been saved and not erased since.
    pub fn is_persisted(&self) -> bool {
        self.persisted.load(Ordering::SeqCst)
    }

    pub fn erase_count(&self) -> usize {
        self.erases.load(Ordering::SeqCst)
    }

    /// Current credentials without creating a fresh identity.
    pub fn snapshot(&self) -> Option<Credentials> {
        self.state.lock().clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Credentials, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected load failure".into()));
        }
        let mut state = self.state.lock();
        Ok(state.get_or_insert_with(Credentials::fresh).clone())
    }

    async fn save(&self, update: &CredentialUpdate) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected save failure".into()));
        }
        self.state
            .lock()
            .get_or_insert_with(Credentials::fresh)
            .apply(update, &[]);
        self.saved.lock().push(update.clone());
        self.persisted.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn erase(&self) -> Result<(), StoreError> {
        if self.fail_erases.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected erase failure".into()));
        }
        *self.state.lock() = None;
        self.persisted.store(false, Ordering::SeqCst);
        self.erases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
