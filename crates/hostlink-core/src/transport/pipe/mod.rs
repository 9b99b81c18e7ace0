//! Named-pipe transport.
//!
//! Two one-directional pipes simulate a duplex link. The initiator's
//! outbound pipe is the responder's inbound pipe and vice versa, so each
//! side writes to one fixed name and reads from the other. Each direction
//! owns its own handle and fails, resets and reconnects independently.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as sys;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as sys;

use super::Transport;
use crate::config::{PipeConfig, TransportKind};
use crate::error::ChannelError;
use crate::framing::{LineReader, LineWriter, line_reader, line_writer};
use crate::types::{Direction, Role};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

use sys::PipeEndpoint;

pub struct PipeTransport {
    role: Role,
    outbound: PipeEndpoint,
    inbound: PipeEndpoint,
    writer: Mutex<Option<LineWriter>>,
    reader: Mutex<Option<LineReader>>,
    outbound_connected: AtomicBool,
}

impl PipeTransport {
    pub fn new(role: Role, config: &PipeConfig) -> Self {
        let directory = config.directory();
        Self {
            role,
            outbound: PipeEndpoint::new(&directory, config.outbound_name(role)),
            inbound: PipeEndpoint::new(&directory, config.inbound_name(role)),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            outbound_connected: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Transport for PipeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Pipe
    }

    fn role(&self) -> Role {
        self.role
    }

    async fn bind(&self) -> Result<(), ChannelError> {
        sys::prepare(&self.inbound).map_err(|source| ChannelError::Bind {
            endpoint: self.inbound.to_string(),
            source,
        })
    }

    fn dials_outbound(&self) -> bool {
        true
    }

    async fn connect_outbound(&self) -> Result<(), ChannelError> {
        let io = sys::open_writer(&self.outbound)
            .await
            .map_err(|source| ChannelError::Connect {
                direction: Direction::Outbound,
                source,
            })?;

        *self.writer.lock().await = Some(line_writer(io));
        self.outbound_connected.store(true, Ordering::SeqCst);
        info!(role = %self.role, pipe = %self.outbound, "Outbound pipe connected");
        Ok(())
    }

    async fn connect_inbound(&self) -> Result<(), ChannelError> {
        let io = sys::open_reader(&self.inbound)
            .await
            .map_err(|source| ChannelError::Connect {
                direction: Direction::Inbound,
                source,
            })?;

        *self.reader.lock().await = Some(line_reader(io));
        info!(role = %self.role, pipe = %self.inbound, "Inbound pipe connected");
        Ok(())
    }

    fn is_outbound_connected(&self) -> bool {
        self.outbound_connected.load(Ordering::SeqCst)
    }

    async fn write_line(&self, line: &str) -> Result<(), ChannelError> {
        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(ChannelError::NotConnected(Direction::Outbound));
        };

        let result = writer.send(line).await.map_err(ChannelError::Write);
        if result.is_err() {
            self.outbound_connected.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn read_line(&self) -> Result<Option<String>, ChannelError> {
        let mut reader = self.reader.lock().await;
        let Some(reader) = reader.as_mut() else {
            return Err(ChannelError::NotConnected(Direction::Inbound));
        };

        match reader.next().await {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(err)) => Err(ChannelError::Read(err)),
            None => Ok(None),
        }
    }

    async fn reset_outbound(&self) {
        self.outbound_connected.store(false, Ordering::SeqCst);
        if self.writer.lock().await.take().is_some() {
            debug!(pipe = %self.outbound, "Outbound pipe handle released");
        }
    }

    async fn reset_inbound(&self) {
        if self.reader.lock().await.take().is_some() {
            debug!(pipe = %self.inbound, "Inbound pipe handle released");
        }
    }

    async fn close(&self) {
        self.reset_outbound().await;
        self.reset_inbound().await;
    }
}
