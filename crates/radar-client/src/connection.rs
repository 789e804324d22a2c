//! Connection State Tracking
//!
//! Tracks whether the REST proxy was reachable on the last request. Every
//! response updates the state:
//!
//! ```text
//!   2xx ──────────────→ Connected ──(timeout passes)──→ Unknown
//!   I/O error, 5xx ───→ Disconnected
//!   401 / 403 ────────→ Unauthorized ──(reset)──→ Unknown
//! ```
//!
//! A `Connected` state is only trusted for the configured timeout; after
//! that it reads as `Unknown` until the next request confirms it again.
//! `Unauthorized` is sticky: senders refuse to send until the connection is
//! reset.
//!
//! Changes are published on a `tokio::sync::watch` channel so that callers
//! can react to connectivity without polling.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

/// Default time a successful request keeps the state `Connected`.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Observed state of the connection to the REST proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Unknown,
    Unauthorized,
}

#[derive(Debug)]
struct Observation {
    status: ConnectionStatus,
    updated_at: Instant,
}

/// Thread-safe connection state with passive expiry of `Connected`.
#[derive(Debug)]
pub struct ConnectionState {
    timeout: Duration,
    observation: Mutex<Observation>,
    notifier: watch::Sender<ConnectionStatus>,
}

impl ConnectionState {
    /// Create a tracker in the `Unknown` state.
    ///
    /// # Arguments
    ///
    /// * `timeout` - How long a successful request keeps the state `Connected`
    pub fn new(timeout: Duration) -> Self {
        let (notifier, _) = watch::channel(ConnectionStatus::Unknown);
        Self {
            timeout,
            observation: Mutex::new(Observation {
                status: ConnectionStatus::Unknown,
                updated_at: Instant::now(),
            }),
            notifier,
        }
    }

    /// Current state, with `Connected` decaying to `Unknown` after the timeout.
    pub fn state(&self) -> ConnectionStatus {
        let mut observation = self.lock();
        if observation.status == ConnectionStatus::Connected
            && observation.updated_at.elapsed() >= self.timeout
        {
            observation.status = ConnectionStatus::Unknown;
            self.publish(ConnectionStatus::Unknown);
        }
        observation.status
    }

    /// Record a successful request.
    pub fn did_connect(&self) {
        self.update(ConnectionStatus::Connected);
    }

    /// Record a failed request.
    pub fn did_disconnect(&self) {
        self.update(ConnectionStatus::Disconnected);
    }

    /// Record rejected credentials.
    pub fn was_unauthorized(&self) {
        self.update(ConnectionStatus::Unauthorized);
    }

    /// Forget the last observation.
    pub fn reset(&self) {
        self.update(ConnectionStatus::Unknown);
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.notifier.subscribe()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn update(&self, status: ConnectionStatus) {
        let mut observation = self.lock();
        observation.updated_at = Instant::now();
        if observation.status != status {
            debug!(from = ?observation.status, to = ?status, "Connection state changed");
            observation.status = status;
        }
        self.publish(status);
    }

    fn publish(&self, status: ConnectionStatus) {
        self.notifier.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Observation> {
        self.observation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECTION_TIMEOUT)
    }
}
