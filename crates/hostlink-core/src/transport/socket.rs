//! Loopback TCP transport.
//!
//! The responder binds the listener and accepts one peer at a time; the
//! initiator dials. A single stream carries both directions: its read half
//! backs the inbound direction and its write half the outbound one. Both
//! halves live in one [`Link`], so a failure seen by either direction kills
//! the link for both.

use super::Transport;
use crate::config::TransportKind;
use crate::error::ChannelError;
use crate::framing::{LineReader, LineWriter, line_reader, line_writer};
use crate::types::{Direction, Role};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct Link {
    generation: u64,
    reader: tokio::sync::Mutex<LineReader>,
    writer: tokio::sync::Mutex<LineWriter>,
    closed: CancellationToken,
}

impl Link {
    fn is_alive(&self) -> bool {
        !self.closed.is_cancelled()
    }

    fn kill(&self) {
        self.closed.cancel();
    }
}

pub struct SocketTransport {
    role: Role,
    addr: SocketAddr,
    listener: Mutex<Option<Arc<TcpListener>>>,
    /// Serialises dial/accept so both directions share one new link.
    establish: tokio::sync::Mutex<()>,
    link: Mutex<Option<Arc<Link>>>,
    generation: AtomicU64,
}

impl SocketTransport {
    pub fn new(role: Role, addr: SocketAddr) -> Self {
        Self {
            role,
            addr,
            listener: Mutex::new(None),
            establish: tokio::sync::Mutex::new(()),
            link: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Number of links established so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn live_link(&self) -> Option<Arc<Link>> {
        self.link
            .lock()
            .as_ref()
            .filter(|link| link.is_alive())
            .cloned()
    }

    /// Drop the current link if it has been marked dead. A link that a
    /// concurrent reconnect just established is left alone.
    fn discard_dead_link(&self) {
        let mut slot = self.link.lock();
        if slot.as_ref().is_some_and(|link| !link.is_alive())
            && let Some(link) = slot.take()
        {
            debug!(generation = link.generation, "Discarded dead socket link");
        }
    }

    async fn bound_listener(&self) -> Result<Arc<TcpListener>, ChannelError> {
        if let Some(listener) = self.listener.lock().clone() {
            return Ok(listener);
        }

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| ChannelError::Bind {
                endpoint: self.addr.to_string(),
                source,
            })?;
        let listener = Arc::new(listener);
        let local_addr = listener.local_addr().unwrap_or(self.addr);
        info!(addr = %local_addr, "Socket transport listening");

        *self.listener.lock() = Some(listener.clone());
        Ok(listener)
    }

    async fn establish(&self, direction: Direction) -> Result<(), ChannelError> {
        let _guard = self.establish.lock().await;
        if self.live_link().is_some() {
            return Ok(());
        }

        let (stream, peer) = match self.role {
            Role::Initiator => {
                let stream = TcpStream::connect(self.addr)
                    .await
                    .map_err(|source| ChannelError::Connect { direction, source })?;
                (stream, self.addr)
            }
            Role::Responder => {
                let listener = self.bound_listener().await?;
                listener
                    .accept()
                    .await
                    .map_err(|source| ChannelError::Connect { direction, source })?
            }
        };

        if let Err(err) = stream.set_nodelay(true) {
            debug!(error = %err, "Failed to disable Nagle on socket link");
        }

        let (read_half, write_half) = stream.into_split();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let link = Arc::new(Link {
            generation,
            reader: tokio::sync::Mutex::new(line_reader(Box::new(read_half))),
            writer: tokio::sync::Mutex::new(line_writer(Box::new(write_half))),
            closed: CancellationToken::new(),
        });

        if let Some(previous) = self.link.lock().replace(link) {
            previous.kill();
        }
        info!(role = %self.role, %peer, generation, "Socket link established");
        Ok(())
    }
}

#[async_trait]
impl Transport for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn role(&self) -> Role {
        self.role
    }

    async fn bind(&self) -> Result<(), ChannelError> {
        if self.role == Role::Responder {
            self.bound_listener().await?;
        }
        Ok(())
    }

    fn dials_outbound(&self) -> bool {
        self.role == Role::Initiator
    }

    async fn connect_outbound(&self) -> Result<(), ChannelError> {
        self.establish(Direction::Outbound).await
    }

    async fn connect_inbound(&self) -> Result<(), ChannelError> {
        self.establish(Direction::Inbound).await
    }

    fn is_outbound_connected(&self) -> bool {
        self.live_link().is_some()
    }

    async fn write_line(&self, line: &str) -> Result<(), ChannelError> {
        let link = self
            .live_link()
            .ok_or(ChannelError::NotConnected(Direction::Outbound))?;
        let mut writer = link.writer.lock().await;

        let result = tokio::select! {
            _ = link.closed.cancelled() => Err(ChannelError::Disconnected(Direction::Outbound)),
            result = writer.send(line) => result.map_err(ChannelError::Write),
        };
        if result.is_err() {
            link.kill();
        }
        result
    }

    async fn read_line(&self) -> Result<Option<String>, ChannelError> {
        let link = self
            .live_link()
            .ok_or(ChannelError::NotConnected(Direction::Inbound))?;
        let mut reader = link.reader.lock().await;

        let next = tokio::select! {
            _ = link.closed.cancelled() => {
                return Err(ChannelError::Disconnected(Direction::Inbound));
            }
            next = reader.next() => next,
        };

        match next {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(err)) => {
                link.kill();
                Err(ChannelError::Read(err))
            }
            None => {
                link.kill();
                Ok(None)
            }
        }
    }

    async fn reset_outbound(&self) {
        self.discard_dead_link();
    }

    async fn reset_inbound(&self) {
        self.discard_dead_link();
    }

    async fn close(&self) {
        if let Some(link) = self.link.lock().take() {
            link.kill();
        }
        if self.listener.lock().take().is_some() {
            info!(addr = %self.addr, "Socket transport closed");
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .lock()
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }
}
