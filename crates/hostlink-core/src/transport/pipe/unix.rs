//! FIFO backend.
//!
//! The reading side owns the FIFO: it creates the node and opens it as a
//! receiver. Until a writer attaches, reads simply wait; once the writer
//! goes away the receiver sees EOF and must be reopened. Opening the
//! sender fails with `ENXIO` (or `ENOENT`) until the peer is reading.

use crate::framing::{BoxedReader, BoxedWriter};
use nix::errno::Errno;
use nix::sys::stat::Mode;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::net::unix::pipe;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeEndpoint {
    path: PathBuf,
}

impl PipeEndpoint {
    pub fn new(directory: &Path, name: &str) -> Self {
        Self {
            path: directory.join(name),
        }
    }
}

impl fmt::Display for PipeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Create the FIFO node if it does not exist yet.
pub(super) fn prepare(endpoint: &PipeEndpoint) -> io::Result<()> {
    match nix::unistd::mkfifo(endpoint.path.as_path(), Mode::S_IRUSR | Mode::S_IWUSR) {
        Ok(()) | Err(Errno::EEXIST) => Ok(()),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

pub(super) async fn open_reader(endpoint: &PipeEndpoint) -> io::Result<BoxedReader> {
    prepare(endpoint)?;
    let receiver = pipe::OpenOptions::new().open_receiver(&endpoint.path)?;
    Ok(Box::new(receiver))
}

pub(super) async fn open_writer(endpoint: &PipeEndpoint) -> io::Result<BoxedWriter> {
    let sender = pipe::OpenOptions::new().open_sender(&endpoint.path)?;
    Ok(Box::new(sender))
}
