//! HTTP binding for the dossier session and workflow core.
//!
//! `dossier-core` keeps every external collaborator behind a trait; this
//! crate supplies the production implementations: a `reqwest`-backed
//! [`Transport`](dossier_core::Transport) for the record service, the
//! identity service's sign-in and renewal endpoints, and a
//! [`DossierClient`] facade that wires configuration, credential store,
//! gateway, workflow engine, and watchdog together.

pub mod auth_api;
pub mod client;
pub mod http;

pub use auth_api::{HttpAuthApi, SignInError};
pub use client::{ClientConfig, ClientError, DossierClient};
pub use http::HttpTransport;
