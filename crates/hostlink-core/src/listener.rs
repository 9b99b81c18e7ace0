use crate::error::ChannelError;
use crate::framing::decode_envelope;
use crate::observers::Observers;
use crate::reconnect::{ReconnectPolicy, reestablish};
use crate::state::ConnectionStates;
use crate::transport::Transport;
use crate::types::Direction;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Background activity reading inbound envelopes and notifying observers.
pub(crate) struct ListenerLoop<In> {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) observers: Arc<Observers<In>>,
    pub(crate) states: Arc<ConnectionStates>,
    pub(crate) policy: ReconnectPolicy,
    pub(crate) cancel: CancellationToken,
}

impl<In> ListenerLoop<In>
where
    In: DeserializeOwned + Send + 'static,
{
    pub(crate) async fn run(self) {
        info!(role = %self.transport.role(), "Listener loop started");

        if self.reconnect().await.is_err() {
            info!("Listener loop stopped before the inbound side connected");
            return;
        }

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = self.transport.read_line() => next,
            };

            let failure = match next {
                Ok(Some(line)) => {
                    self.dispatch(&line);
                    continue;
                }
                Ok(None) => ChannelError::Disconnected(Direction::Inbound),
                Err(err) => err,
            };

            warn!(error = %failure, "Inbound stream lost, reconnecting");
            self.observers.notify_error(&failure);
            if self.reconnect().await.is_err() {
                break;
            }
        }

        info!("Listener loop stopped");
    }

    /// Decode one line and hand it to every observer. A malformed line is
    /// reported and skipped; it never stops the loop.
    fn dispatch(&self, line: &str) {
        if line.trim().is_empty() {
            trace!("Skipping blank inbound line");
            return;
        }

        match decode_envelope::<In>(line) {
            Ok(message) => self.observers.notify_message(&message),
            Err(err) => {
                warn!(error = %err, "Discarding malformed inbound envelope");
                self.observers.notify_error(&err);
            }
        }
    }

    async fn reconnect(&self) -> Result<(), ChannelError> {
        reestablish(
            Direction::Inbound,
            self.transport.as_ref(),
            &self.states,
            &self.policy,
            &self.cancel,
            |err, attempt| {
                debug!(error = %err, attempt, "Inbound connect attempt failed");
                self.observers.notify_error(err);
            },
        )
        .await
    }
}
