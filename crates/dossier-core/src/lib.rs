//! Session lifecycle and approval workflow core for the dossier
//! client-record service.
//!
//! Two tightly coupled subsystems live here:
//!
//! - **Session lifecycle** ([`credentials`], [`auth`]): one credential
//!   store per signed-in principal, single-flight renewal of the access
//!   credential, an authenticated gateway that renews and replays a
//!   request exactly once on an authorization failure, and a watchdog
//!   that forces sign-out when the session turns terminal.
//! - **Approval workflow** ([`workflow`], [`permissions`]): the record
//!   status state machine, validated locally against the transition table
//!   and the role-based permission rules before any network call.
//!
//! They meet in the middle: every workflow transition is an
//! authenticated, authorized network operation issued through the
//! gateway.
//!
//! External collaborators (the identity service's renewal endpoint, the
//! record service's HTTP surface, session persistence) are traits with
//! mock implementations; the `dossier-client` crate provides the
//! production bindings.

pub mod auth;
pub mod credentials;
pub mod permissions;
pub mod sync;
pub mod workflow;

pub use auth::{
    ApiRequest, ApiResponse, AuthError, AuthenticatedGateway, Method, RefreshCoordinator,
    RenewalApi, RenewalError, SessionWatchdog, SignOutHandler, Transport, TransportError,
    WatchdogConfig,
};
pub use credentials::{
    CredentialStore, CredentialStoreError, KeyringStorage, MemoryStorage, Principal, Session,
    SessionState, SessionStorage, TerminalErrorKind, TokenSet,
};
pub use permissions::{can_view, permitted_actions, PermissionContext, Role, RoleSet};
pub use sync::{RecordCache, RecordUpdate, UpdateInbox, UpdateKind};
pub use workflow::{
    ClientRecord, RecordAction, RecordPage, RecordStatus, TransitionOutcome, WorkflowEngine,
    WorkflowError,
};
