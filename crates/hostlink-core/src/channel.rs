//! The duplex channel facade.
//!
//! A [`DuplexChannel`] owns one transport, the pending queue, the observer
//! registry and the two background loops. It is shared by reference: every
//! method takes `&self`, so wrap it in an `Arc` to hand it to other tasks.

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::framing::encode_envelope;
use crate::listener::ListenerLoop;
use crate::observers::Observers;
use crate::queue::{Pending, PendingQueue, QueueStatsSnapshot};
use crate::reconnect::retry_connect;
use crate::sender::DrainLoop;
use crate::state::ConnectionStates;
use crate::transport::{Transport, build_transport};
use crate::types::{ConnectionState, Direction, Role};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Resilient two-way message channel to a peer process.
///
/// `Out` is the envelope type this side sends, `In` the type it receives.
/// Both sides usually share one enum, hence the default.
///
/// # Example
///
/// ```no_run
/// use hostlink_core::{ChannelConfig, DuplexChannel, Role};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// enum Envelope {
///     Ping { seq: u64 },
///     Pong { seq: u64 },
/// }
///
/// # async fn run() -> Result<(), hostlink_core::ChannelError> {
/// let channel = DuplexChannel::<Envelope>::new(ChannelConfig::new(Role::Initiator))?;
/// channel.on_message(|envelope| println!("received {envelope:?}"));
/// channel.connect().await?;
/// channel.enqueue(Envelope::Ping { seq: 1 });
/// # channel.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct DuplexChannel<Out, In = Out> {
    config: ChannelConfig,
    transport: Arc<dyn Transport>,
    queue: Arc<PendingQueue<Out>>,
    observers: Arc<Observers<In>>,
    states: Arc<ConnectionStates>,
    cancel: CancellationToken,
    started: AtomicBool,
    stopped: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<Out, In> DuplexChannel<Out, In>
where
    Out: Serialize + Send + 'static,
    In: DeserializeOwned + Send + 'static,
{
    /// Build a channel with the transport named by `config`.
    pub fn new(config: ChannelConfig) -> Result<Self, ChannelError> {
        let transport = build_transport(&config)?;
        Self::with_transport(config, transport)
    }

    /// Build a channel over an already constructed transport.
    pub fn with_transport(
        config: ChannelConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ChannelError> {
        config.validate()?;
        if transport.role() != config.role {
            return Err(ChannelError::InvalidConfig(format!(
                "transport role {} does not match channel role {}",
                transport.role(),
                config.role
            )));
        }

        Ok(Self {
            queue: Arc::new(PendingQueue::new(config.max_concurrent_sends)),
            observers: Arc::new(Observers::new()),
            states: Arc::new(ConnectionStates::new()),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            config,
            transport,
        })
    }

    /// Start the channel.
    ///
    /// Binds the local endpoint, starts listening for the peer, and (when
    /// this side dials) makes the bounded first outbound connect. Returns
    /// once the drain loop is running. A second call is a no-op.
    ///
    /// If the first dial exhausts its attempts the channel shuts itself down
    /// and the error is returned; a shut-down channel cannot be restarted.
    pub async fn connect(&self) -> Result<(), ChannelError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ChannelError::Shutdown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Duplex channel already started");
            return Ok(());
        }

        let policy = self.config.reconnect_policy();
        info!(
            role = %self.config.role,
            transport = %self.transport.kind(),
            "Connecting duplex channel"
        );

        if let Err(err) = self.transport.bind().await {
            error!(error = %err, "Failed to bind local endpoint");
            self.shutdown().await;
            return Err(err);
        }

        // The listener goes first so the peer's dial finds our endpoint.
        self.spawn(
            ListenerLoop {
                transport: self.transport.clone(),
                observers: self.observers.clone(),
                states: self.states.clone(),
                policy: policy.clone(),
                cancel: self.cancel.child_token(),
            }
            .run(),
        );

        if self.transport.dials_outbound() {
            self.states
                .set(Direction::Outbound, ConnectionState::Connecting);
            let transport = self.transport.as_ref();
            let result = retry_connect(
                Direction::Outbound,
                policy.initial_budget(),
                policy.retry_interval(),
                &self.cancel,
                |err, attempt| {
                    warn!(error = %err, attempt, "Initial outbound connect failed");
                    self.observers.notify_error(err);
                },
                || transport.connect_outbound(),
            )
            .await;

            if let Err(err) = result {
                error!(error = %err, "Giving up on the initial outbound connect");
                self.shutdown().await;
                return Err(err);
            }
            self.states
                .set(Direction::Outbound, ConnectionState::Connected);
        }

        self.spawn(
            DrainLoop {
                transport: self.transport.clone(),
                queue: self.queue.clone(),
                observers: self.observers.clone(),
                states: self.states.clone(),
                policy,
                idle_poll: self.config.idle_poll(),
                cancel: self.cancel.child_token(),
            }
            .run(),
        );

        info!(role = %self.config.role, "Duplex channel started");
        Ok(())
    }

    /// Queue an envelope for delivery. Never blocks and never fails; the
    /// drain loop writes it once the outbound side is up.
    pub fn enqueue(&self, envelope: Out) {
        if self.stopped.load(Ordering::SeqCst) {
            debug!("Envelope queued on a shut-down channel will not be sent");
        }
        self.queue.push(envelope);
    }

    /// Write an envelope now, within the concurrency budget.
    ///
    /// A payload that cannot be serialized is rejected outright. A transport
    /// failure hands the envelope to the pending queue for retry and is
    /// still returned to the caller.
    pub async fn send(&self, envelope: Out) -> Result<(), ChannelError> {
        let line = encode_envelope(&envelope)?;
        let slot = self.queue.acquire_slot().await?;
        let result = self.transport.write_line(&line).await;
        drop(slot);

        match result {
            Ok(()) => {
                self.queue.mark_sent();
                Ok(())
            }
            Err(err) => {
                self.queue.mark_failed();
                warn!(error = %err, "Direct send failed, handing envelope to the queue");
                self.observers.notify_error(&err);
                if !self.transport.is_outbound_connected() {
                    self.states
                        .set(Direction::Outbound, ConnectionState::Disconnected);
                }
                self.queue.requeue(Pending {
                    envelope,
                    enqueued_at: Instant::now(),
                    attempts: 0,
                });
                Err(err)
            }
        }
    }

    /// Register a handler for every decoded inbound envelope, in wire order.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&In) + Send + Sync + 'static,
    {
        self.observers.on_message(handler);
    }

    /// Register a handler for connection and payload errors.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&ChannelError) + Send + Sync + 'static,
    {
        self.observers.on_error(handler);
    }

    pub fn state(&self, direction: Direction) -> ConnectionState {
        self.states.get(direction)
    }

    pub fn watch_state(&self, direction: Direction) -> watch::Receiver<ConnectionState> {
        self.states.watch(direction)
    }

    pub fn queue_stats(&self) -> QueueStatsSnapshot {
        self.queue.stats()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Bound socket address, once a socket responder has bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    /// Stop both loops and release the transport. Envelopes still queued are
    /// dropped. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(role = %self.config.role, "Shutting down duplex channel");
        self.cancel.cancel();
        self.queue.close();

        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            match tokio::time::timeout(TASK_JOIN_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) if err.is_panic() => {
                    error!(error = %err, "Channel task panicked");
                }
                Ok(Err(_)) => {}
                Err(_) => warn!("Channel task did not stop in time"),
            }
        }

        self.transport.close().await;
        self.states
            .set(Direction::Outbound, ConnectionState::Disconnected);
        self.states
            .set(Direction::Inbound, ConnectionState::Disconnected);
        info!(dropped = self.queue.len(), "Duplex channel shut down");
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().push(tokio::spawn(task));
    }
}

impl<Out, In> DuplexChannel<Out, In>
where
    Out: Serialize + Send + 'static,
    In: DeserializeOwned + Clone + Send + 'static,
{
    /// Receive inbound envelopes on a channel instead of a callback.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<In> {
        self.observers.subscribe()
    }
}

impl<Out, In> Drop for DuplexChannel<Out, In> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
