//! Windows named-pipe backend.
//!
//! The reading side is the pipe server (inbound access only) and waits for
//! a client; the writing side opens a write-only client. Each reconnect
//! creates a fresh server instance.

use crate::framing::{BoxedReader, BoxedWriter};
use std::fmt;
use std::io;
use std::path::Path;
use tokio::net::windows::named_pipe::{ClientOptions, ServerOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeEndpoint {
    name: String,
}

impl PipeEndpoint {
    /// Pipes live in the `\\.\pipe\` namespace; `directory` does not apply.
    pub fn new(_directory: &Path, name: &str) -> Self {
        Self {
            name: format!(r"\\.\pipe\{}", name),
        }
    }
}

impl fmt::Display for PipeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub(super) fn prepare(_endpoint: &PipeEndpoint) -> io::Result<()> {
    Ok(())
}

pub(super) async fn open_reader(endpoint: &PipeEndpoint) -> io::Result<BoxedReader> {
    let server = ServerOptions::new()
        .access_inbound(true)
        .access_outbound(false)
        .create(&endpoint.name)?;
    server.connect().await?;
    Ok(Box::new(server))
}

pub(super) async fn open_writer(endpoint: &PipeEndpoint) -> io::Result<BoxedWriter> {
    let client = ClientOptions::new()
        .read(false)
        .write(true)
        .open(&endpoint.name)?;
    Ok(Box::new(client))
}
