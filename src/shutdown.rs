//! Graceful shutdown coordination.
//!
//! Shutdown stops admission of new requests, cancels every live chat stream
//! through a shared token and then waits for in-flight requests to drain.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: u32 },
}

/// Coordinates graceful shutdown across runtime components.
pub struct ShutdownCoordinator {
    state: RwLock<ShutdownState>,
    in_flight: Arc<AtomicU32>,
    notify: Arc<Notify>,
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ShutdownState::Running),
            in_flight: Arc::new(AtomicU32::new(0)),
            notify: Arc::new(Notify::new()),
            token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.read()
    }

    /// Check if accepting new requests.
    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Token cancelled when shutdown begins. Stream and worker tokens derive from it.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Track an in-flight request. Returns None if shutting down.
    pub fn track(&self) -> Option<ShutdownGuard> {
        if !self.is_accepting() {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(ShutdownGuard {
            counter: self.in_flight.clone(),
            notify: self.notify.clone(),
        })
    }

    /// Current in-flight request count.
    pub fn in_flight_count(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Initiate shutdown: stop accepting, cancel live streams, wait for drain.
    pub async fn initiate(&self, timeout: Duration) -> ShutdownResult {
        *self.state.write() = ShutdownState::Draining;
        self.token.cancel();
        tracing::info!(in_flight = self.in_flight_count(), "shutdown initiated");

        let result = self.wait_for_drain(timeout).await;

        *self.state.write() = ShutdownState::Stopped;
        match &result {
            ShutdownResult::Complete => tracing::info!("drain complete"),
            ShutdownResult::Timeout { remaining } => {
                tracing::warn!(remaining, "drain timed out")
            }
        }
        result
    }

    async fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.notify.notified();
            let count = self.in_flight_count();
            if count == 0 {
                return ShutdownResult::Complete;
            }

            let remaining_time = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining_time.is_zero() {
                return ShutdownResult::Timeout { remaining: count };
            }

            tokio::select! {
                _ = notified => continue,
                _ = tokio::time::sleep(remaining_time) => {
                    let final_count = self.in_flight_count();
                    if final_count == 0 {
                        return ShutdownResult::Complete;
                    }
                    return ShutdownResult::Timeout { remaining: final_count };
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for in-flight request tracking.
pub struct ShutdownGuard {
    counter: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_when_guards_drop() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let guard = coordinator.track().unwrap();
        assert_eq!(coordinator.in_flight_count(), 1);

        let c = coordinator.clone();
        let handle = tokio::spawn(async move { c.initiate(Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(coordinator.state(), ShutdownState::Draining);
        assert!(coordinator.token().is_cancelled());
        assert!(coordinator.track().is_none());

        drop(guard);
        assert_eq!(handle.await.unwrap(), ShutdownResult::Complete);
        assert_eq!(coordinator.state(), ShutdownState::Stopped);
    }

    #[tokio::test]
    async fn times_out_with_stuck_request() {
        let coordinator = ShutdownCoordinator::new();
        let _guard = coordinator.track().unwrap();
        let result = coordinator.initiate(Duration::from_millis(30)).await;
        assert_eq!(result, ShutdownResult::Timeout { remaining: 1 });
    }
}
