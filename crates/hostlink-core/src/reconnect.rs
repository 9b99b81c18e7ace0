//! Reconnection policy.
//!
//! The first outbound dial is bounded: if the peer never shows up the
//! channel cannot start and the caller must hear about it. Every other
//! connect (inbound listens, and any reconnect after a failure) retries
//! forever at a fixed interval. The peer's restart timing is outside this
//! process's control, so cancellation is the only way to stop trying.

use crate::error::ChannelError;
use crate::state::ConnectionStates;
use crate::transport::Transport;
use crate::types::{ConnectionState, Direction};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1_000;
pub const PIPE_CONNECT_ATTEMPTS: u32 = 10;
pub const SOCKET_CONNECT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Attempts allowed for the very first outbound dial.
    pub initial_connect_attempts: u32,
    /// Fixed wait between attempts, for both bounded and unbounded retries.
    pub retry_interval_ms: u64,
}

impl ReconnectPolicy {
    pub fn pipe() -> Self {
        Self {
            initial_connect_attempts: PIPE_CONNECT_ATTEMPTS,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
        }
    }

    pub fn socket() -> Self {
        Self {
            initial_connect_attempts: SOCKET_CONNECT_ATTEMPTS,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_initial_attempts(mut self, attempts: u32) -> Self {
        self.initial_connect_attempts = attempts;
        self
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn initial_budget(&self) -> RetryBudget {
        RetryBudget::Bounded(self.initial_connect_attempts)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::socket()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    Bounded(u32),
    /// Deliberately infinite; gated only by cancellation.
    Unbounded,
}

impl RetryBudget {
    fn exhausted(self, attempts: u32) -> bool {
        match self {
            Self::Bounded(limit) => attempts >= limit.max(1),
            Self::Unbounded => false,
        }
    }
}

/// Run `attempt` until it succeeds, the budget runs out, or `cancel` fires.
///
/// Every failed attempt is handed to `on_failure` together with the attempt
/// number. Cancellation aborts both an in-progress attempt and the wait
/// between attempts.
pub async fn retry_connect<A, Fut, F>(
    direction: Direction,
    budget: RetryBudget,
    interval: Duration,
    cancel: &CancellationToken,
    mut on_failure: F,
    mut attempt: A,
) -> Result<(), ChannelError>
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ChannelError>>,
    F: FnMut(&ChannelError, u32),
{
    let mut attempts: u32 = 0;

    loop {
        attempts = attempts.saturating_add(1);

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(ChannelError::Shutdown),
            result = attempt() => result,
        };

        match result {
            Ok(()) => {
                debug!(%direction, attempts, "Connection established");
                return Ok(());
            }
            Err(ChannelError::Shutdown) => return Err(ChannelError::Shutdown),
            Err(err) => {
                on_failure(&err, attempts);
                if budget.exhausted(attempts) {
                    warn!(%direction, attempts, error = %err, "Giving up on connection");
                    return Err(ChannelError::ConnectExhausted {
                        direction,
                        attempts,
                        source: Box::new(err),
                    });
                }
                debug!(%direction, attempts, error = %err, "Connect attempt failed, retrying");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(ChannelError::Shutdown),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Tear one direction down and bring it back, retrying without bound.
///
/// Returns `Err(ChannelError::Shutdown)` only when `cancel` fires.
pub(crate) async fn reestablish<F>(
    direction: Direction,
    transport: &dyn Transport,
    states: &ConnectionStates,
    policy: &ReconnectPolicy,
    cancel: &CancellationToken,
    on_failure: F,
) -> Result<(), ChannelError>
where
    F: FnMut(&ChannelError, u32),
{
    states.set(direction, ConnectionState::Connecting);
    match direction {
        Direction::Outbound => transport.reset_outbound().await,
        Direction::Inbound => transport.reset_inbound().await,
    }

    let result = retry_connect(
        direction,
        RetryBudget::Unbounded,
        policy.retry_interval(),
        cancel,
        on_failure,
        || async move {
            match direction {
                Direction::Outbound => transport.connect_outbound().await,
                Direction::Inbound => transport.connect_inbound().await,
            }
        },
    )
    .await;

    let state = if result.is_ok() {
        ConnectionState::Connected
    } else {
        ConnectionState::Disconnected
    };
    states.set(direction, state);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn refused() -> ChannelError {
        ChannelError::Connect {
            direction: Direction::Outbound,
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        }
    }

    #[test]
    fn per_transport_defaults() {
        assert_eq!(ReconnectPolicy::pipe().initial_connect_attempts, 10);
        assert_eq!(ReconnectPolicy::socket().initial_connect_attempts, 5);
        assert_eq!(
            ReconnectPolicy::default().retry_interval(),
            Duration::from_secs(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_budget_gives_up_after_limit() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut reported = Vec::new();
        let cancel = CancellationToken::new();

        let result = retry_connect(
            Direction::Outbound,
            RetryBudget::Bounded(5),
            Duration::from_secs(1),
            &cancel,
            |_, attempt| reported.push(attempt),
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(refused())
                }
            },
        )
        .await;

        match result {
            Err(ChannelError::ConnectExhausted {
                direction,
                attempts,
                ..
            }) => {
                assert_eq!(direction, Direction::Outbound);
                assert_eq!(attempts, 5);
            }
            other => panic!("expected ConnectExhausted, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(reported, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_once_peer_appears() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();

        retry_connect(
            Direction::Outbound,
            RetryBudget::Bounded(5),
            Duration::from_secs(1),
            &cancel,
            |_, _| {},
            || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(refused())
                    } else {
                        Ok(())
                    }
                }
            },
        )
        .await
        .expect("third attempt should connect");

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_retries_until_cancelled() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30_500)).await;
            canceller.cancel();
        });

        let result = retry_connect(
            Direction::Inbound,
            RetryBudget::Unbounded,
            Duration::from_secs(1),
            &cancel,
            |_, _| {},
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(refused())
                }
            },
        )
        .await;

        assert!(matches!(result, Err(ChannelError::Shutdown)));
        assert_eq!(calls.load(Ordering::SeqCst), 31);
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = retry_connect(
            Direction::Inbound,
            RetryBudget::Unbounded,
            Duration::from_secs(1),
            &cancel,
            |_, _| {},
            || std::future::pending::<Result<(), ChannelError>>(),
        )
        .await;

        assert!(matches!(result, Err(ChannelError::Shutdown)));
    }
}
