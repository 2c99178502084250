//! Session watchdog: forces sign-out once a session turns terminal.
//!
//! The watchdog runs one idempotent check from two triggers: a reactive
//! subscription that fires on every credential store change, and a
//! periodic poll as a backstop for notifications the subscription missed.
//! Both paths funnel into [`SessionWatchdog::check`], so observing the
//! same terminal error twice cannot sign the user out twice.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::credentials::{CredentialStore, SessionState, TerminalErrorKind};

/// Default poll interval for the backstop check (30 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum poll interval to prevent busy polling.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum poll interval to keep the backstop useful.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(600);

/// Errors from watchdog configuration.
#[derive(Debug, thiserror::Error)]
pub enum WatchdogError {
    /// Invalid configuration value.
    #[error("invalid watchdog configuration: {0}")]
    InvalidConfiguration(String),
}

/// Configuration for the session watchdog.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Poll interval for the periodic backstop check.
    pub poll_interval: Duration,
}

impl WatchdogConfig {
    /// Sets the poll interval.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::InvalidConfiguration`] if the interval is
    /// outside the allowed range.
    pub fn with_poll_interval(mut self, interval: Duration) -> Result<Self, WatchdogError> {
        if interval < MIN_POLL_INTERVAL {
            return Err(WatchdogError::InvalidConfiguration(format!(
                "poll_interval too short: {interval:?} < {MIN_POLL_INTERVAL:?}"
            )));
        }
        if interval > MAX_POLL_INTERVAL {
            return Err(WatchdogError::InvalidConfiguration(format!(
                "poll_interval too long: {interval:?} > {MAX_POLL_INTERVAL:?}"
            )));
        }
        self.poll_interval = interval;
        Ok(self)
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Reacts to a forced sign-out.
///
/// Presentation concerns (the user-visible notification, navigation back
/// to the sign-in entry point) live behind this trait; the watchdog only
/// guarantees the handler runs exactly once per incident, after the store
/// is already cleared.
pub trait SignOutHandler: Send + Sync {
    /// Called once after the watchdog signed the user out.
    fn on_forced_sign_out(&self, kind: TerminalErrorKind);
}

/// Watches the credential store and signs out on terminal errors.
///
/// Dropping the watchdog aborts its poll task; [`shutdown`](Self::shutdown)
/// does the same explicitly.
pub struct SessionWatchdog {
    task: JoinHandle<()>,
}

impl SessionWatchdog {
    /// Spawns the watchdog over `store`.
    ///
    /// The returned handle owns the background task. The task wakes on
    /// every store change and on every `config.poll_interval` tick, and
    /// runs [`check`](Self::check) on each wake-up.
    #[must_use]
    pub fn spawn(
        store: Arc<CredentialStore>,
        handler: Arc<dyn SignOutHandler>,
        config: WatchdogConfig,
    ) -> Self {
        let mut changes = store.subscribe();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            // Store dropped; nothing left to watch.
                            break;
                        }
                    },
                    _ = ticker.tick() => {},
                }
                Self::check(&store, handler.as_ref());
            }
        });

        Self { task }
    }

    /// Runs the terminal-error check once.
    ///
    /// If the active session carries a terminal error, clears the store
    /// and invokes the handler. Returns `true` if a sign-out happened.
    /// Running the check while signed out, or while the session is
    /// healthy, is a no-op, which makes the two trigger paths safe to
    /// overlap.
    pub fn check(store: &CredentialStore, handler: &dyn SignOutHandler) -> bool {
        let state = match store.read() {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "watchdog could not read credential store");
                return false;
            },
        };

        let Some(kind) = state.session().and_then(|session| session.terminal_error()) else {
            return false;
        };

        warn!(kind = %kind, "terminal session error observed; forcing sign-out");
        if let Err(e) = store.sign_out() {
            error!(error = %e, "watchdog failed to clear credential store");
            return false;
        }
        handler.on_forced_sign_out(kind);
        true
    }

    /// Stops the poll task.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl Drop for SessionWatchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for SessionWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWatchdog")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}
