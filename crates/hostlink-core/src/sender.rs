use crate::error::ChannelError;
use crate::framing::encode_envelope;
use crate::observers::Observers;
use crate::queue::{Pending, PendingQueue};
use crate::reconnect::{ReconnectPolicy, reestablish};
use crate::state::ConnectionStates;
use crate::transport::Transport;
use crate::types::{ConnectionState, Direction};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Background activity draining the pending queue into the transport.
pub(crate) struct DrainLoop<Out, In> {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) queue: Arc<PendingQueue<Out>>,
    pub(crate) observers: Arc<Observers<In>>,
    pub(crate) states: Arc<ConnectionStates>,
    pub(crate) policy: ReconnectPolicy,
    pub(crate) idle_poll: Duration,
    pub(crate) cancel: CancellationToken,
}

impl<Out, In> DrainLoop<Out, In>
where
    Out: Serialize + Send + 'static,
    In: Send + 'static,
{
    pub(crate) async fn run(self) {
        info!(
            role = %self.transport.role(),
            budget = self.queue.budget(),
            "Drain loop started"
        );

        if self.transport.is_outbound_connected() {
            self.states
                .set(Direction::Outbound, ConnectionState::Connected);
        } else if self.reconnect().await.is_err() {
            info!("Drain loop stopped before the outbound side connected");
            return;
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.process_one() => {}
            }
        }

        info!(pending = self.queue.len(), "Drain loop stopped");
    }

    async fn process_one(&self) {
        let Some(pending) = self.queue.pop() else {
            tokio::time::sleep(self.idle_poll).await;
            return;
        };

        if !self.transport.is_outbound_connected() {
            self.states
                .set(Direction::Outbound, ConnectionState::Disconnected);
            if self.reconnect().await.is_err() {
                return;
            }
        }

        let slot = match self.queue.acquire_slot().await {
            Ok(slot) => slot,
            Err(_) => return,
        };

        let line = match encode_envelope(&pending.envelope) {
            Ok(line) => line,
            Err(err) => {
                drop(slot);
                self.queue.mark_dropped();
                warn!(error = %err, "Dropping envelope that cannot be serialized");
                self.observers.notify_error(&err);
                return;
            }
        };

        let result = self.transport.write_line(&line).await;
        drop(slot);

        match result {
            Ok(()) => {
                self.queue.mark_sent();
                trace!(
                    bytes = line.len(),
                    attempts = pending.attempts,
                    queued_ms = pending.enqueued_at.elapsed().as_millis() as u64,
                    "Envelope sent"
                );
            }
            Err(err) => self.handle_failure(pending, err).await,
        }
    }

    async fn handle_failure(&self, pending: Pending<Out>, err: ChannelError) {
        self.queue.mark_failed();
        warn!(
            error = %err,
            attempts = pending.attempts + 1,
            queued_ms = pending.enqueued_at.elapsed().as_millis() as u64,
            "Send failed, re-queueing envelope"
        );
        self.observers.notify_error(&err);

        // Back of the queue: ordering is not preserved across a failure.
        self.queue.requeue(pending);
        self.states
            .set(Direction::Outbound, ConnectionState::Disconnected);
        let _ = self.reconnect().await;
    }

    async fn reconnect(&self) -> Result<(), ChannelError> {
        debug!("Re-establishing outbound connection");
        reestablish(
            Direction::Outbound,
            self.transport.as_ref(),
            &self.states,
            &self.policy,
            &self.cancel,
            |err, attempt| {
                debug!(error = %err, attempt, "Outbound reconnect attempt failed");
                self.observers.notify_error(err);
            },
        )
        .await
    }
}
