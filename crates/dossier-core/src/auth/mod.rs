//! Authenticated access to the record service.
//!
//! Three pieces cooperate here, all sharing one [`CredentialStore`]:
//!
//! - the [`RefreshCoordinator`](refresh::RefreshCoordinator) owns renewal.
//!   However many callers hit an expired credential at once, exactly one
//!   renewal call reaches the identity service and every caller observes
//!   its result;
//! - the [`AuthenticatedGateway`](gateway::AuthenticatedGateway) wraps
//!   every outbound request: it attaches the current access credential and,
//!   on an authorization failure, renews and replays the request exactly
//!   once;
//! - the [`SessionWatchdog`](watchdog::SessionWatchdog) watches the store
//!   for a terminal error and forces a sign-out when it sees one.
//!
//! [`CredentialStore`]: crate::credentials::CredentialStore

pub mod error;
pub mod gateway;
pub mod refresh;
pub mod watchdog;

pub use error::AuthError;
pub use gateway::{
    ApiRequest, ApiResponse, AuthenticatedGateway, Method, MockTransport, Transport,
    TransportError,
};
pub use refresh::{MockRenewalApi, RefreshCoordinator, RenewalApi, RenewalError};
pub use watchdog::{SessionWatchdog, SignOutHandler, WatchdogConfig};
