//! Byte-level transports.
//!
//! A transport only knows how to connect, read a line, write a line and tear
//! itself down. Retrying connects, re-queueing writes and surfacing errors
//! all happen one level up, in the drain and listener loops.

mod pipe;
mod socket;

pub use pipe::PipeTransport;
pub use socket::SocketTransport;

use crate::config::{ChannelConfig, TransportKind};
use crate::error::ChannelError;
use crate::types::Role;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;

/// Physical connection between the two peers.
///
/// Connect methods make a single attempt. An attempt may wait indefinitely
/// for the peer (a listening socket, a pipe server); callers race it
/// against cancellation. Resources replaced by a reset or reconnect are
/// dropped, never reused.
///
/// # Example
///
/// ```ignore
/// let transport = build_transport(&config)?;
/// transport.bind().await?;
/// transport.connect_outbound().await?;
/// transport.write_line(r#"{"type":"Ping"}"#).await?;
/// ```
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    fn kind(&self) -> TransportKind;

    fn role(&self) -> Role;

    /// Create whatever the peer needs before it can attach (a bound
    /// listener, a FIFO). Failure here is fatal for the channel.
    async fn bind(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Whether the outbound connect is a client-style dial. Only dials are
    /// subject to the bounded initial-connect budget.
    fn dials_outbound(&self) -> bool;

    async fn connect_outbound(&self) -> Result<(), ChannelError>;

    async fn connect_inbound(&self) -> Result<(), ChannelError>;

    fn is_outbound_connected(&self) -> bool;

    /// Write one frame. The line must not contain `\n`.
    async fn write_line(&self, line: &str) -> Result<(), ChannelError>;

    /// Read one frame. `Ok(None)` means the peer closed the stream.
    async fn read_line(&self) -> Result<Option<String>, ChannelError>;

    async fn reset_outbound(&self);

    async fn reset_inbound(&self);

    /// Release every OS resource held by the transport.
    async fn close(&self);

    /// Address the transport listens on, if it listens on one.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

pub fn build_transport(config: &ChannelConfig) -> Result<Arc<dyn Transport>, ChannelError> {
    config.validate()?;
    let transport: Arc<dyn Transport> = match config.transport {
        TransportKind::Socket => Arc::new(SocketTransport::new(config.role, config.socket.addr())),
        TransportKind::Pipe => Arc::new(PipeTransport::new(config.role, &config.pipe)),
    };
    Ok(transport)
}
