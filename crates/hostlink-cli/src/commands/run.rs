//! Bridge a duplex channel to stdin/stdout.
//!
//! Every stdin line is one JSON envelope to send; every inbound envelope is
//! printed as one compact JSON line.

use anyhow::{Context, Result};
use hostlink_core::{ChannelConfig, Direction, DuplexChannel};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing::{debug, info, warn};

/// How long queued envelopes get to leave after stdin closes.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

pub async fn run(config: ChannelConfig, stay: bool) -> Result<()> {
    let channel: DuplexChannel<Value> =
        DuplexChannel::new(config).context("invalid channel configuration")?;
    channel.on_error(|err| match err.direction() {
        Some(direction) => warn!(error = %err, %direction, "Channel error"),
        None => warn!(error = %err, "Channel error"),
    });
    let mut inbound = channel.subscribe();

    channel
        .connect()
        .await
        .context("failed to connect to peer")?;
    info!(role = %channel.role(), "Bridging stdin/stdout");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut stdin_open = true;
    let mut forwarded: u64 = 0;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break Ok(());
            }
            Some(message) = inbound.recv() => {
                if let Err(err) = print_message(&mut stdout, &message).await {
                    break Err(err);
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if forward(&channel, &line) {
                        forwarded += 1;
                    }
                }
                Ok(None) => {
                    stdin_open = false;
                    if !stay {
                        drain(&channel, forwarded).await;
                        break Ok(());
                    }
                    debug!("stdin closed, staying connected");
                }
                Err(err) => break Err(anyhow::Error::new(err).context("failed to read stdin")),
            },
        }
    };

    channel.shutdown().await;
    result
}

/// Enqueue one stdin line. Returns whether it was a JSON envelope.
fn forward(channel: &DuplexChannel<Value>, line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }

    match serde_json::from_str::<Value>(line) {
        Ok(envelope) => {
            channel.enqueue(envelope);
            true
        }
        Err(err) => {
            warn!(error = %err, "Skipping stdin line that is not JSON");
            false
        }
    }
}

async fn print_message(stdout: &mut Stdout, message: &Value) -> Result<()> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    stdout
        .write_all(line.as_bytes())
        .await
        .context("failed to write to stdout")?;
    stdout.flush().await.context("failed to flush stdout")?;
    Ok(())
}

/// Wait until every forwarded envelope has left (or been dropped as
/// unserializable), up to `DRAIN_GRACE`.
async fn drain(channel: &DuplexChannel<Value>, forwarded: u64) {
    let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
    loop {
        let stats = channel.queue_stats();
        if stats.sent + stats.dropped >= forwarded {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(
                pending = stats.pending,
                outbound = %channel.state(Direction::Outbound),
                "Leaving with envelopes still queued"
            );
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
