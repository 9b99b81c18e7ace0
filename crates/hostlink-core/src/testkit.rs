//! In-memory transport for exercising the channel without real pipes or sockets.

use crate::config::TransportKind;
use crate::error::{ChannelError, FrameError};
use crate::transport::Transport;
use crate::types::{Direction, Role};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Scripted transport. Inbound lines are pushed by the test, outbound writes
/// are recorded, and failures are injected by count.
pub struct MockTransport {
    role: Role,
    outbound_connected: AtomicBool,
    inbound_tx: mpsc::UnboundedSender<Option<String>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Option<String>>>,
    written: Mutex<Vec<String>>,
    write_delay: Mutex<Duration>,
    fail_writes: AtomicUsize,
    fail_connects: AtomicUsize,
    outbound_connects: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new(role: Role) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            role,
            outbound_connected: AtomicBool::new(false),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            written: Mutex::new(Vec::new()),
            write_delay: Mutex::new(Duration::ZERO),
            fail_writes: AtomicUsize::new(0),
            fail_connects: AtomicUsize::new(0),
            outbound_connects: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Queue a line for the next `read_line`.
    pub fn push_line(&self, line: impl Into<String>) {
        let _ = self.inbound_tx.send(Some(line.into()));
    }

    /// Queue an end-of-stream, as if the peer went away.
    pub fn push_disconnect(&self) {
        let _ = self.inbound_tx.send(None);
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.fail_writes.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.fail_connects.store(count, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock() = delay;
    }

    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    pub fn outbound_connects(&self) -> usize {
        self.outbound_connects.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Poll until at least `count` lines were written.
    pub async fn wait_for_writes(&self, count: usize) {
        while self.written.lock().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn role(&self) -> Role {
        self.role
    }

    fn dials_outbound(&self) -> bool {
        true
    }

    async fn connect_outbound(&self) -> Result<(), ChannelError> {
        if Self::take_one(&self.fail_connects) {
            return Err(ChannelError::Connect {
                direction: Direction::Outbound,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "mock peer absent"),
            });
        }
        self.outbound_connects.fetch_add(1, Ordering::SeqCst);
        self.outbound_connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn connect_inbound(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn is_outbound_connected(&self) -> bool {
        self.outbound_connected.load(Ordering::SeqCst)
    }

    async fn write_line(&self, line: &str) -> Result<(), ChannelError> {
        if !self.is_outbound_connected() {
            return Err(ChannelError::NotConnected(Direction::Outbound));
        }

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        let delay = *self.write_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if Self::take_one(&self.fail_writes) {
            self.outbound_connected.store(false, Ordering::SeqCst);
            return Err(ChannelError::Write(FrameError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock pipe broken",
            ))));
        }

        self.written.lock().push(line.to_string());
        Ok(())
    }

    async fn read_line(&self) -> Result<Option<String>, ChannelError> {
        let mut inbound = self.inbound_rx.lock().await;
        match inbound.recv().await {
            Some(next) => Ok(next),
            None => std::future::pending().await,
        }
    }

    async fn reset_outbound(&self) {
        self.outbound_connected.store(false, Ordering::SeqCst);
    }

    async fn reset_inbound(&self) {}

    async fn close(&self) {
        self.outbound_connected.store(false, Ordering::SeqCst);
    }
}
