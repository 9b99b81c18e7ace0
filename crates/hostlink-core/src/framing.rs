//! Newline-delimited framing.
//!
//! Wire format: one compact JSON value per line, terminated by `\n`.
//! `serde_json` never emits a raw newline inside a compact value, so the
//! line feed is an unambiguous frame boundary.

use crate::error::{ChannelError, FrameError};
use bytes::{BufMut, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cmp;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

/// Upper bound for a single frame, newline excluded.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub type LineReader = FramedRead<BoxedReader, LineCodec>;
pub type LineWriter = FramedWrite<BoxedWriter, LineCodec>;

pub fn line_reader(io: BoxedReader) -> LineReader {
    FramedRead::new(io, LineCodec::new())
}

pub fn line_writer(io: BoxedWriter) -> LineWriter {
    FramedWrite::new(io, LineCodec::new())
}

/// Splits a byte stream on `\n`, carrying any trailing partial line over to
/// the next read.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// Bytes already scanned for a newline, so a slow stream is not rescanned.
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_MESSAGE_SIZE)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = FrameError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, FrameError> {
        let read_to = cmp::min(self.max_length.saturating_add(1), buf.len());
        let newline = buf[self.next_index..read_to]
            .iter()
            .position(|byte| *byte == b'\n');

        match newline {
            Some(offset) => {
                let newline_index = self.next_index + offset;
                self.next_index = 0;
                let mut line = buf.split_to(newline_index + 1);
                line.truncate(newline_index);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                // Bad bytes become U+FFFD; the JSON decode then reports the
                // line without ending the stream.
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None if buf.len() > self.max_length => {
                self.next_index = 0;
                Err(FrameError::TooLong {
                    limit: self.max_length,
                })
            }
            None => {
                self.next_index = read_to;
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, FrameError> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let buffered = buf.len();
        buf.clear();
        self.next_index = 0;
        Err(FrameError::Truncated(buffered))
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, line: T, dst: &mut BytesMut) -> Result<(), FrameError> {
        let line = line.as_ref();
        if line.len() > self.max_length {
            return Err(FrameError::TooLong {
                limit: self.max_length,
            });
        }
        dst.reserve(line.len() + 1);
        dst.put(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

pub fn encode_envelope<T: Serialize + ?Sized>(envelope: &T) -> Result<String, ChannelError> {
    serde_json::to_string(envelope).map_err(ChannelError::Serialize)
}

pub fn decode_envelope<T: DeserializeOwned>(line: &str) -> Result<T, ChannelError> {
    serde_json::from_str(line).map_err(|source| ChannelError::Deserialize {
        len: line.len(),
        source,
    })
}
