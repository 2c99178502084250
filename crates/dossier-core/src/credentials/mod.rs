//! Session credentials: model, store, and persistence boundary.
//!
//! Exactly one session slot exists per authenticated principal. The slot
//! holds either [`SessionState::SignedOut`] or an active [`Session`] with
//! its access/refresh token pair. The slot is replaced wholesale, never
//! mutated field-by-field: renewal builds a new [`Session`] from the old
//! principal and the freshly minted [`TokenSet`], then swaps it in through
//! [`CredentialStore::replace`].
//!
//! The store is a pure state container. It performs no network I/O; its
//! only side channel is the [`SessionStorage`] persistence boundary, which
//! lets a session survive process restarts.

mod session;
mod storage;
mod store;

pub use session::{PersistedSession, Principal, Session, SessionState, TerminalErrorKind, TokenSet};
pub use storage::{KeyringStorage, MemoryStorage, SessionStorage, StorageError};
pub use store::{CredentialStore, CredentialStoreError};
