//! The credential store: one atomically replaced session slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::warn;

use super::session::{Session, SessionState, TerminalErrorKind};
use super::storage::SessionStorage;

/// Errors from the credential store.
#[derive(Debug, thiserror::Error)]
pub enum CredentialStoreError {
    /// Internal lock poisoned.
    #[error("credential store lock poisoned")]
    LockPoisoned,

    /// The persistence backend failed while restoring a session.
    #[error("session storage error: {0}")]
    Storage(#[from] super::storage::StorageError),
}

/// Holds the current session and publishes every change.
///
/// All writers go through [`replace`](Self::replace),
/// [`mark_terminal_error`](Self::mark_terminal_error), or
/// [`sign_out`](Self::sign_out). Each write bumps a monotonic generation
/// counter and notifies subscribers, which is what lets the refresh
/// coordinator detect that another caller already renewed, and what drives
/// the watchdog's reactive check.
///
/// Writers racing on [`replace`](Self::replace) are last-writer-wins; that
/// is acceptable only because renewal writers are serialized by the
/// refresh coordinator's flight lock.
pub struct CredentialStore {
    slot: RwLock<SessionState>,
    generation: AtomicU64,
    changes: watch::Sender<u64>,
    storage: Option<Arc<dyn SessionStorage>>,
}

impl CredentialStore {
    /// Creates a store with no persistence backend, signed out.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            slot: RwLock::new(SessionState::SignedOut),
            generation: AtomicU64::new(0),
            changes,
            storage: None,
        }
    }

    /// Creates a store that persists every replacement through `storage`.
    #[must_use]
    pub fn with_storage(storage: Arc<dyn SessionStorage>) -> Self {
        let mut store = Self::new();
        store.storage = Some(storage);
        store
    }

    /// Restores a persisted session into the slot, if one exists.
    ///
    /// Intended for startup, before any request is issued. Returns `true`
    /// if a session was restored.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence backend cannot be read or the
    /// store lock is poisoned.
    pub fn bootstrap(&self) -> Result<bool, CredentialStoreError> {
        let Some(storage) = &self.storage else {
            return Ok(false);
        };

        let Some(persisted) = storage.load()? else {
            return Ok(false);
        };

        let mut slot = self.slot.write().map_err(|_| CredentialStoreError::LockPoisoned)?;
        *slot = SessionState::Active(Session::from_persisted(persisted));
        self.bump();
        Ok(true)
    }

    /// Returns a snapshot of the session slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn read(&self) -> Result<SessionState, CredentialStoreError> {
        let slot = self.slot.read().map_err(|_| CredentialStoreError::LockPoisoned)?;
        Ok(slot.clone())
    }

    /// Returns a snapshot of the session slot together with the
    /// generation it belongs to.
    ///
    /// Both are read under one lock, so the generation always matches the
    /// snapshot; readers that compare generations later can tell whether
    /// the credential they saw is still the current one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn snapshot(&self) -> Result<(SessionState, u64), CredentialStoreError> {
        let slot = self.slot.read().map_err(|_| CredentialStoreError::LockPoisoned)?;
        Ok((slot.clone(), self.generation.load(Ordering::SeqCst)))
    }

    /// Returns the generation of the current slot contents.
    ///
    /// The counter increases on every replace, terminal mark, and
    /// sign-out; it never goes backwards.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Subscribes to slot changes. The channel carries the generation that
    /// produced each notification.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Replaces the session slot with `session`.
    ///
    /// The new session is persisted when a backend is configured; a
    /// persistence failure keeps the in-memory replacement and is logged,
    /// since losing the live session over a storage hiccup would sign the
    /// user out for no reason.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn replace(&self, session: Session) -> Result<(), CredentialStoreError> {
        let mut slot = self.slot.write().map_err(|_| CredentialStoreError::LockPoisoned)?;

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.store(&session.to_persisted()) {
                warn!(error = %e, "failed to persist replaced session");
            }
        }

        *slot = SessionState::Active(session);
        self.bump();
        Ok(())
    }

    /// Records a terminal error on the active session.
    ///
    /// A no-op when signed out. The first recorded kind wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn mark_terminal_error(
        &self,
        kind: TerminalErrorKind,
    ) -> Result<(), CredentialStoreError> {
        let mut slot = self.slot.write().map_err(|_| CredentialStoreError::LockPoisoned)?;

        if let SessionState::Active(session) = &*slot {
            let flagged = session.with_terminal_error(kind);
            *slot = SessionState::Active(flagged);
            self.bump();
        }
        Ok(())
    }

    /// Clears the slot to signed-out and removes any persisted session.
    ///
    /// Signing out while already signed out is a no-op and does not
    /// notify.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn sign_out(&self) -> Result<(), CredentialStoreError> {
        let mut slot = self.slot.write().map_err(|_| CredentialStoreError::LockPoisoned)?;

        if !slot.is_active() {
            return Ok(());
        }

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.clear() {
                warn!(error = %e, "failed to clear persisted session");
            }
        }

        *slot = SessionState::SignedOut;
        self.bump();
        Ok(())
    }

    /// Bumps the generation and notifies subscribers.
    ///
    /// Callers hold the slot write lock, which serializes bumps and keeps
    /// published generations monotone.
    fn bump(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.changes.send_replace(generation);
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self
            .slot
            .read()
            .map(|slot| slot.state_name())
            .unwrap_or("<poisoned>");
        f.debug_struct("CredentialStore")
            .field("state", &state)
            .field("generation", &self.generation())
            .field("persisted", &self.storage.is_some())
            .finish()
    }
}
