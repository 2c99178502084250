//! Client configuration and the wired-up facade.

use std::sync::Arc;
use std::time::Duration;

use dossier_core::auth::watchdog::WatchdogError;
use dossier_core::sync::{RecordUpdate, UpdateInbox};
use dossier_core::{
    AuthenticatedGateway, ClientRecord, CredentialStore, CredentialStoreError, RecordCache,
    RefreshCoordinator, SessionState, SessionStorage, SessionWatchdog, SignOutHandler,
    WatchdogConfig, WorkflowEngine, WorkflowError,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::auth_api::{HttpAuthApi, SignInError};
use crate::http::HttpTransport;

/// Default connect timeout for service calls.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default overall request timeout for service calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from building or operating the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Invalid configuration value.
    #[error("invalid client configuration: {0}")]
    InvalidConfiguration(String),

    /// The HTTP client could not be initialized.
    #[error("http client error: {message}")]
    Http {
        /// Failure description.
        message: String,
    },

    /// The credential store failed.
    #[error(transparent)]
    Store(#[from] CredentialStoreError),

    /// Signing in failed.
    #[error(transparent)]
    SignIn(#[from] SignInError),
}

impl From<WatchdogError> for ClientError {
    fn from(e: WatchdogError) -> Self {
        Self::InvalidConfiguration(e.to_string())
    }
}

/// Configuration for [`DossierClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the record and identity services.
    pub base_url: String,
    /// Connect timeout for every service call.
    pub connect_timeout: Duration,
    /// Overall timeout for every service call.
    pub request_timeout: Duration,
    /// Watchdog configuration.
    pub watchdog: WatchdogConfig,
}

impl ClientConfig {
    /// Creates a configuration with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfiguration`] if `base_url` is
    /// empty.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(ClientError::InvalidConfiguration(
                "base_url cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            watchdog: WatchdogConfig::default(),
        })
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the overall request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the watchdog poll interval.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfiguration`] if the interval is
    /// outside the watchdog's allowed range.
    pub fn with_watchdog_poll_interval(mut self, interval: Duration) -> Result<Self, ClientError> {
        self.watchdog = self.watchdog.with_poll_interval(interval)?;
        Ok(self)
    }
}

/// The wired-up client: store, gateway, engine, watchdog, cache.
///
/// Construction must happen inside a Tokio runtime; the watchdog task is
/// spawned immediately. Dropping the facade (or calling
/// [`shutdown`](Self::shutdown)) stops the background tasks.
pub struct DossierClient {
    store: Arc<CredentialStore>,
    auth: Arc<HttpAuthApi>,
    engine: WorkflowEngine<HttpTransport>,
    cache: Arc<RecordCache>,
    watchdog: SessionWatchdog,
    update_task: Option<JoinHandle<()>>,
}

impl DossierClient {
    /// Builds the full client stack.
    ///
    /// When `storage` is given, every session replacement is persisted
    /// through it and any previously persisted session is restored now.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be initialized or the
    /// persisted session cannot be restored.
    pub fn new(
        config: &ClientConfig,
        storage: Option<Arc<dyn SessionStorage>>,
        sign_out_handler: Arc<dyn SignOutHandler>,
    ) -> Result<Self, ClientError> {
        let store = Arc::new(match storage {
            Some(storage) => CredentialStore::with_storage(storage),
            None => CredentialStore::new(),
        });
        if store.bootstrap()? {
            info!("restored persisted session");
        }

        let auth = Arc::new(HttpAuthApi::new(config)?);
        let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), auth.clone()));
        let transport = HttpTransport::new(config)?;
        let gateway = Arc::new(AuthenticatedGateway::new(
            transport,
            store.clone(),
            coordinator,
        ));
        let engine = WorkflowEngine::new(gateway, store.clone());
        let watchdog =
            SessionWatchdog::spawn(store.clone(), sign_out_handler, config.watchdog.clone());

        Ok(Self {
            store,
            auth,
            engine,
            cache: Arc::new(RecordCache::new()),
            watchdog,
            update_task: None,
        })
    }

    /// Signs in and replaces the session slot.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::SignIn`] when the identity service refuses
    /// the credentials or cannot be reached.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let session = self.auth.sign_in(username, password).await?;
        self.store.replace(session)?;
        Ok(())
    }

    /// Signs out: clears the session slot and the persisted session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if the store lock is poisoned.
    pub fn sign_out(&self) -> Result<(), ClientError> {
        self.store.sign_out()?;
        Ok(())
    }

    /// Returns a snapshot of the session state.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Store`] if the store lock is poisoned.
    pub fn session(&self) -> Result<SessionState, ClientError> {
        Ok(self.store.read()?)
    }

    /// Returns the workflow engine for record transitions and listings.
    #[must_use]
    pub const fn records(&self) -> &WorkflowEngine<HttpTransport> {
        &self.engine
    }

    /// Returns the local record cache.
    #[must_use]
    pub fn record_cache(&self) -> &RecordCache {
        &self.cache
    }

    /// Fetches a record, serving it from the cache when possible.
    ///
    /// Push updates invalidate cache entries, so a cached record is only
    /// returned while no newer version was announced.
    ///
    /// # Errors
    ///
    /// Propagates [`WorkflowError`] from the engine on a cache miss.
    pub async fn fetch_record(&self, id: &str) -> Result<ClientRecord, WorkflowError> {
        if let Some(record) = self.cache.get(id) {
            return Ok(record);
        }
        let record = self.engine.fetch_record(id).await?;
        self.cache.insert(record.clone());
        Ok(record)
    }

    /// Connects the push channel: returns the sender the transport layer
    /// feeds, and spawns a task draining updates into the record cache.
    pub fn connect_updates(&mut self) -> mpsc::UnboundedSender<RecordUpdate> {
        let (tx, mut inbox) = UpdateInbox::channel();
        let cache = Arc::clone(&self.cache);
        self.update_task = Some(tokio::spawn(async move {
            while inbox.apply_next(&cache).await.is_some() {}
        }));
        tx
    }

    /// Stops the watchdog and the update drain task.
    ///
    /// Dropping the facade has the same effect; this method only makes
    /// the teardown explicit.
    pub fn shutdown(self) {
        if let Some(task) = &self.update_task {
            task.abort();
        }
        // The watchdog aborts its poll task when dropped with the rest of
        // the facade.
    }
}

impl Drop for DossierClient {
    fn drop(&mut self) {
        if let Some(task) = &self.update_task {
            task.abort();
        }
    }
}

impl std::fmt::Debug for DossierClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DossierClient")
            .field("store", &self.store)
            .field("watchdog", &self.watchdog)
            .field("cached_records", &self.cache.len())
            .finish_non_exhaustive()
    }
}
