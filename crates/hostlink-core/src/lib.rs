//! Resilient duplex messaging between two cooperating processes.
//!
//! A [`DuplexChannel`] connects a host application (the *responder*) with a
//! satellite process (the *initiator*) over either a pair of one-directional
//! named pipes or a single loopback TCP stream. Each side can send and receive
//! independently and neither side ever blocks on the other's availability.
//!
//! # Usage
//!
//! The channel has three moving parts once [`DuplexChannel::connect`] returns:
//! 1. **Drain loop**: pops envelopes from the pending queue and writes them,
//!    re-queueing anything that failed and reconnecting the outbound side.
//! 2. **Listener loop**: reads newline-delimited JSON envelopes and hands them
//!    to the registered observers in wire order.
//! 3. **Reconnection**: a bounded first dial, then unbounded retries at a fixed
//!    interval until the channel is shut down.

pub mod channel;
pub mod config;
pub mod error;
pub mod framing;
mod listener;
pub mod observers;
pub mod queue;
pub mod reconnect;
mod sender;
mod state;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testkit;

pub use channel::DuplexChannel;
pub use config::{ChannelConfig, PipeConfig, SocketConfig, TransportKind};
pub use error::{ChannelError, FrameError};
pub use framing::{LineCodec, MAX_MESSAGE_SIZE};
pub use queue::{PendingQueue, QueueStatsSnapshot};
pub use reconnect::{ReconnectPolicy, RetryBudget};
pub use transport::{Transport, build_transport};
pub use types::{ConnectionState, Direction, Role};
