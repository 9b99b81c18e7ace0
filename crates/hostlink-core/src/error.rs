//! Channel error types.

use crate::types::Direction;
use std::io;

/// Failure while framing bytes into lines or lines into bytes.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("frame exceeds the {limit} byte limit")]
    TooLong { limit: usize },

    #[error("stream ended mid-frame with {0} bytes buffered")]
    Truncated(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid channel configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to prepare {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("{direction} connect attempt failed: {source}")]
    Connect {
        direction: Direction,
        #[source]
        source: io::Error,
    },

    #[error("unable to establish {direction} connection after {attempts} attempts")]
    ConnectExhausted {
        direction: Direction,
        attempts: u32,
        #[source]
        source: Box<ChannelError>,
    },

    #[error("{0} direction is not connected")]
    NotConnected(Direction),

    #[error("peer closed the {0} stream")]
    Disconnected(Direction),

    #[error("write failed: {0}")]
    Write(#[source] FrameError),

    #[error("read failed: {0}")]
    Read(#[source] FrameError),

    #[error("failed to serialize envelope: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to deserialize inbound line ({len} bytes): {source}")]
    Deserialize {
        len: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("channel has been shut down")]
    Shutdown,
}

impl ChannelError {
    /// Payload-level failures leave the connection and the queue untouched.
    pub fn is_payload_error(&self) -> bool {
        matches!(self, Self::Serialize(_) | Self::Deserialize { .. })
    }

    /// Errors that mean a direction must be torn down and re-established.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::ConnectExhausted { .. }
                | Self::NotConnected(_)
                | Self::Disconnected(_)
                | Self::Write(_)
                | Self::Read(_)
        )
    }

    /// The direction this error concerns, when it concerns one.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Self::Connect { direction, .. } | Self::ConnectExhausted { direction, .. } => {
                Some(*direction)
            }
            Self::NotConnected(direction) | Self::Disconnected(direction) => Some(*direction),
            Self::Write(_) => Some(Direction::Outbound),
            Self::Read(_) => Some(Direction::Inbound),
            _ => None,
        }
    }
}
