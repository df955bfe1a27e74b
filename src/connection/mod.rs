//! Vector backend connection lifecycle.
//!
//! [`ConnectionManager`] owns the single live backend handle and the
//! [`ConnectionState`] machine:
//!
//! ```text
//! Disconnected ─connect─▶ Connecting ─handshake+probe ok─▶ Ready ◀─probe ok─┐
//!                              │                             │              │
//!                              └─retries exhausted─▶ Failed  └─probe fail─▶ Degraded
//! any ─close─▶ Disconnected
//! ```
//!
//! Dialing happens while holding the handle lock, so at most one connection
//! attempt is in flight. Callers that arrive meanwhile either wait for it
//! ([`ConnectionManager::ensure_connected`]) or fail fast
//! ([`ConnectionManager::try_ensure_connected`]).

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{BackendConnector, VectorBackend};
use crate::error::ConnectionError;
use crate::retry::RetryPolicy;

/// State of the backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No handle; nothing attempted or explicitly closed
    Disconnected,
    /// A dial is in flight
    Connecting,
    /// Connected and the last probe passed
    Ready,
    /// Connected but the last probe failed
    Degraded,
    /// Retries exhausted
    Failed,
}

impl ConnectionState {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

type Slot = Option<Arc<dyn VectorBackend>>;

/// Owns the backend connection and its state machine.
pub struct ConnectionManager {
    connector: Arc<dyn BackendConnector>,
    policy: RetryPolicy,
    handle: Mutex<Slot>,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` state.
    pub fn new(connector: Arc<dyn BackendConnector>, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            policy,
            handle: Mutex::new(None),
            state,
        }
    }

    /// Current cached state. Never touches the network.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether the cached state is `Ready`.
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Dial the backend, retrying per the policy.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        self.connect_with_cancel(std::future::pending()).await
    }

    /// Like [`connect`](Self::connect), but gives up between attempts once `deadline` passes.
    pub async fn connect_before(&self, deadline: Instant) -> Result<(), ConnectionError> {
        self.connect_with_cancel(tokio::time::sleep_until(deadline))
            .await
    }

    /// Like [`connect`](Self::connect), but aborts between attempts when `cancel` resolves.
    ///
    /// An attempt already in progress is allowed to finish.
    pub async fn connect_with_cancel<F>(&self, cancel: F) -> Result<(), ConnectionError>
    where
        F: Future<Output = ()>,
    {
        let mut slot = self.handle.lock().await;
        self.dial(&mut slot, cancel).await
    }

    /// No-op when `Ready`; otherwise connect, waiting on any dial already in flight.
    pub async fn ensure_connected(&self) -> Result<(), ConnectionError> {
        if self.is_ready() {
            return Ok(());
        }
        let mut slot = self.handle.lock().await;
        // Another caller may have finished dialing while we waited
        if self.is_ready() && slot.is_some() {
            return Ok(());
        }
        self.dial(&mut slot, std::future::pending()).await
    }

    /// Fail-fast variant of [`ensure_connected`](Self::ensure_connected).
    ///
    /// Returns [`ConnectionError::InProgress`] instead of waiting on another dial.
    pub async fn try_ensure_connected(&self) -> Result<(), ConnectionError> {
        if self.is_ready() {
            return Ok(());
        }
        let mut slot = self
            .handle
            .try_lock()
            .map_err(|_| ConnectionError::InProgress)?;
        if self.is_ready() && slot.is_some() {
            return Ok(());
        }
        self.dial(&mut slot, std::future::pending()).await
    }

    /// Ensure a connection and return the live handle.
    pub async fn backend(&self) -> Result<Arc<dyn VectorBackend>, ConnectionError> {
        self.ensure_connected().await?;
        self.handle
            .lock()
            .await
            .clone()
            .ok_or(ConnectionError::Closed)
    }

    /// The live handle if one exists, without dialing.
    pub async fn current_backend(&self) -> Option<Arc<dyn VectorBackend>> {
        match self.state() {
            ConnectionState::Ready | ConnectionState::Degraded => self.handle.lock().await.clone(),
            _ => None,
        }
    }

    /// Probe readiness and move between `Ready` and `Degraded`.
    ///
    /// Returns `false` without probing when there is no live handle.
    pub async fn health_check(&self) -> bool {
        let Some(backend) = self.current_backend().await else {
            return false;
        };

        let healthy = match backend.is_ready().await {
            Ok(ready) => ready,
            Err(e) => {
                warn!(error = %e, "Health probe failed");
                false
            }
        };

        // Only flip Ready <-> Degraded; a concurrent close or redial wins.
        let mut transition = None;
        self.state.send_if_modified(|state| match (*state, healthy) {
            (ConnectionState::Ready, false) => {
                transition = Some((*state, ConnectionState::Degraded));
                *state = ConnectionState::Degraded;
                true
            }
            (ConnectionState::Degraded, true) => {
                transition = Some((*state, ConnectionState::Ready));
                *state = ConnectionState::Ready;
                true
            }
            _ => false,
        });
        if let Some((from, to)) = transition {
            info!(from = %from, to = %to, "Connection state transition");
        }

        healthy
    }

    /// Drop the handle and move to `Disconnected`. Safe to call repeatedly.
    pub async fn close(&self) {
        let mut slot = self.handle.lock().await;
        if slot.take().is_some() {
            debug!(endpoint = %self.connector.endpoint(), "Released backend handle");
        }
        self.transition(ConnectionState::Disconnected);
    }

    async fn dial<F>(
        &self,
        slot: &mut MutexGuard<'_, Slot>,
        cancel: F,
    ) -> Result<(), ConnectionError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        slot.take();
        self.transition(ConnectionState::Connecting);

        let mut attempts = 0;
        loop {
            attempts += 1;
            let error = match self.handshake().await {
                Ok(backend) => {
                    **slot = Some(backend);
                    self.transition(ConnectionState::Ready);
                    return Ok(());
                }
                Err(e) => e,
            };

            let decision = self.policy.after_failures(attempts);
            if !decision.should_retry {
                warn!(
                    endpoint = %self.connector.endpoint(),
                    attempts,
                    error = %error,
                    "Backend connection retries exhausted"
                );
                self.transition(ConnectionState::Failed);
                return Err(ConnectionError::Exhausted {
                    attempts,
                    last_error: error,
                });
            }

            warn!(
                endpoint = %self.connector.endpoint(),
                attempt = attempts,
                delay_ms = decision.delay.as_millis(),
                error = %error,
                "Backend connection failed, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(decision.delay) => {}
                _ = &mut cancel => {
                    info!(attempts, "Backend connection cancelled");
                    self.transition(ConnectionState::Disconnected);
                    return Err(ConnectionError::Cancelled { attempts });
                }
            }
        }
    }

    /// One dial plus one readiness probe.
    async fn handshake(&self) -> Result<Arc<dyn VectorBackend>, String> {
        let backend = self.connector.connect().await.map_err(|e| e.to_string())?;
        match backend.is_ready().await {
            Ok(true) => Ok(backend),
            Ok(false) => Err("backend reachable but not ready".to_string()),
            Err(e) => Err(format!("readiness probe failed: {}", e)),
        }
    }

    fn transition(&self, to: ConnectionState) {
        let from = self.state.send_replace(to);
        if from != to {
            info!(from = %from, to = %to, "Connection state transition");
        }
    }
}
