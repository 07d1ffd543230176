//! The connection lifecycle state machine (C6): CONNECTED / DISCONNECTED /
//! RECONNECTING, with a reconnect policy and cooldown.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, RateLimiter, Result};
use crate::logging;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connected = 1,
    Reconnecting = 2,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connected,
            2 => ConnectionState::Reconnecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Reconnect policy: whether reconnection is attempted at all, and the
/// cooldown between attempts (§4.5, builder keys `will_reconnect` /
/// `reconnect_cooldown_millis`).
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub will_reconnect: bool,
    pub cooldown: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            will_reconnect: false,
            cooldown: Duration::from_millis(500),
        }
    }
}

/// Tracks connection status for one backend driver. The driver itself owns
/// the native handle; this type only tracks the state transitions of §4.5
/// and is safe to read from any thread (status reads are lock-free, per the
/// concurrency model's "shared-resource policy").
pub struct ConnectionStateMachine {
    state: AtomicU8,
    policy: ReconnectPolicy,
    rate_limiter: Arc<RateLimiter>,
}

impl ConnectionStateMachine {
    pub fn new(policy: ReconnectPolicy, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            policy,
            rate_limiter,
        }
    }

    pub fn status(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionState::Connected
    }

    fn set(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Attempts to open the connection via `open`. On success, transitions
    /// to CONNECTED. On failure, transitions to RECONNECTING and schedules
    /// a retry after the cooldown if `will_reconnect`; otherwise stays
    /// DISCONNECTED and surfaces `ConnectionFailed`.
    pub async fn connect_async<F, Fut>(self: &Arc<Self>, open: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send,
    {
        match open().await {
            Ok(()) => {
                self.set(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                if self.policy.will_reconnect {
                    self.set(ConnectionState::Reconnecting);
                    self.schedule_retry(open);
                } else {
                    self.set(ConnectionState::Disconnected);
                }
                Err(Error::ConnectionFailed {
                    operation: "connect".to_string(),
                    reason: e.to_string(),
                    source: Some(anyhow::anyhow!(e)),
                })
            }
        }
    }

    fn schedule_retry<F, Fut>(self: &Arc<Self>, open: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send,
    {
        let machine = Arc::clone(self);
        let cooldown = self.policy.cooldown;
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            if machine.status() != ConnectionState::Reconnecting {
                return;
            }
            match open().await {
                Ok(()) => machine.set(ConnectionState::Connected),
                Err(_) => {
                    logging::warn_ratelimited(
                        &machine.rate_limiter,
                        "reconnect attempt failed; retrying after cooldown",
                    );
                    machine.schedule_retry(open);
                }
            }
        });
    }

    /// Closes the connection via `close`; if `reconnect`, transitions to
    /// RECONNECTING and begins a new `connect_async`. Fails with
    /// `InvalidState` if called while already RECONNECTING.
    pub async fn disconnect_async<C, Cfut, F, Fut>(
        self: &Arc<Self>,
        close: C,
        reconnect: bool,
        open: F,
    ) -> Result<()>
    where
        C: FnOnce() -> Cfut,
        Cfut: std::future::Future<Output = Result<()>>,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send,
    {
        if self.status() == ConnectionState::Reconnecting {
            return Err(Error::invalid_state(
                "disconnect",
                "connection is already reconnecting",
            ));
        }
        close().await?;
        self.set(ConnectionState::Disconnected);
        if reconnect {
            self.set(ConnectionState::Reconnecting);
            let machine = Arc::clone(self);
            tokio::spawn(async move {
                let _ = machine.connect_async(open).await;
            });
        }
        Ok(())
    }

    /// Blocks (async) until CONNECTED, or until `will_reconnect` is false
    /// and the state is settled at DISCONNECTED. Drivers call this at the
    /// top of each request executor so transient drops are masked from the
    /// caller (§4.5).
    pub async fn reconnect_if_disconnected(&self, timeout: Duration) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        if !self.policy.will_reconnect {
            return Err(Error::invalid_state(
                "reconnect_if_disconnected",
                "not connected and reconnect policy is disabled",
            ));
        }
        let deadline = tokio::time::Instant::now() + timeout;
        let mut interval = tokio::time::interval(self.policy.cooldown.max(Duration::from_millis(10)));
        loop {
            interval.tick().await;
            if self.is_connected() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::ConnectionFailed {
                    operation: "reconnect_if_disconnected".to_string(),
                    reason: "timed out waiting for reconnect".to_string(),
                    source: None,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn connect_success_transitions_to_connected() {
        let machine = Arc::new(ConnectionStateMachine::new(
            ReconnectPolicy::default(),
            Arc::new(RateLimiter::default()),
        ));
        machine.connect_async(|| async { Ok(()) }).await.unwrap();
        assert_eq!(machine.status(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn connect_failure_without_reconnect_stays_disconnected() {
        let machine = Arc::new(ConnectionStateMachine::new(
            ReconnectPolicy::default(),
            Arc::new(RateLimiter::default()),
        ));
        let err = machine
            .connect_async(|| async { Err(Error::invalid_state("open", "refused")) })
            .await;
        assert!(err.is_err());
        assert_eq!(machine.status(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_failure_with_reconnect_eventually_recovers() {
        let machine = Arc::new(ConnectionStateMachine::new(
            ReconnectPolicy {
                will_reconnect: true,
                cooldown: Duration::from_millis(20),
            },
            Arc::new(RateLimiter::default()),
        ));
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);
        let err = machine
            .connect_async(move || {
                let attempts = Arc::clone(&attempts_clone);
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err(Error::invalid_state("open", "refused"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        assert!(err.is_err());
        assert_eq!(machine.status(), ConnectionState::Reconnecting);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(machine.status(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn disconnect_while_reconnecting_is_invalid() {
        let machine = Arc::new(ConnectionStateMachine::new(
            ReconnectPolicy {
                will_reconnect: true,
                cooldown: Duration::from_secs(60),
            },
            Arc::new(RateLimiter::default()),
        ));
        let _ = machine
            .connect_async(|| async { Err(Error::invalid_state("open", "refused")) })
            .await;
        assert_eq!(machine.status(), ConnectionState::Reconnecting);

        let result = machine
            .disconnect_async(|| async { Ok(()) }, false, || async { Ok(()) })
            .await;
        assert!(matches!(result, Err(Error::InvalidState { .. })));
    }

    #[tokio::test]
    async fn reconnect_if_disconnected_returns_immediately_when_connected() {
        let machine = Arc::new(ConnectionStateMachine::new(
            ReconnectPolicy::default(),
            Arc::new(RateLimiter::default()),
        ));
        machine.connect_async(|| async { Ok(()) }).await.unwrap();
        machine
            .reconnect_if_disconnected(Duration::from_millis(10))
            .await
            .unwrap();
    }
}
