//! Persistence boundary for sessions.
//!
//! The boundary is a key-value contract: load the one persisted session,
//! store a replacement, or clear it. The OS keyring backend is the
//! production implementation; the in-memory backend exists for tests and
//! for deployments that opt out of persistence.

use std::sync::Mutex;

use super::session::PersistedSession;

/// Errors from the session persistence boundary.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Keyring access failed.
    #[error("keyring error: {0}")]
    Keyring(String),

    /// The persisted payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal lock poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

/// Stores the persisted session across process restarts.
///
/// Implementations must be safe to call from any thread; the store writes
/// on every session replacement and clears on sign-out.
pub trait SessionStorage: Send + Sync {
    /// Loads the persisted session, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or the payload is
    /// malformed.
    fn load(&self) -> Result<Option<PersistedSession>, StorageError>;

    /// Stores `session`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn store(&self, session: &PersistedSession) -> Result<(), StorageError>;

    /// Removes the persisted session.
    ///
    /// Clearing an already-empty backend is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn clear(&self) -> Result<(), StorageError>;
}

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<PersistedSession>>,
}

impl MemoryStorage {
    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<PersistedSession>, StorageError> {
        let slot = self.slot.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(slot.clone())
    }

    fn store(&self, session: &PersistedSession) -> Result<(), StorageError> {
        let mut slot = self.slot.lock().map_err(|_| StorageError::LockPoisoned)?;
        *slot = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut slot = self.slot.lock().map_err(|_| StorageError::LockPoisoned)?;
        *slot = None;
        Ok(())
    }
}

/// OS keyring storage backend.
///
/// The session is serialized to JSON and stored as a single keyring entry
/// under `(service, account)`.
#[derive(Debug)]
pub struct KeyringStorage {
    service: String,
    account: String,
}

impl KeyringStorage {
    /// Creates a keyring backend for the given service and account names.
    #[must_use]
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, StorageError> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| StorageError::Keyring(e.to_string()))
    }
}

impl SessionStorage for KeyringStorage {
    fn load(&self) -> Result<Option<PersistedSession>, StorageError> {
        let entry = self.entry()?;
        let payload = match entry.get_password() {
            Ok(payload) => payload,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(StorageError::Keyring(e.to_string())),
        };

        let session = serde_json::from_str(&payload)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(Some(session))
    }

    fn store(&self, session: &PersistedSession) -> Result<(), StorageError> {
        let payload = serde_json::to_string(session)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.entry()?
            .set_password(&payload)
            .map_err(|e| StorageError::Keyring(e.to_string()))
    }

    fn clear(&self) -> Result<(), StorageError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::Keyring(e.to_string())),
        }
    }
}
