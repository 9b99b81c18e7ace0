#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hostlink_core::{
    ChannelConfig, ChannelError, ConnectionState, Direction, DuplexChannel, ReconnectPolicy, Role,
    TransportKind,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Envelope {
    Status { text: String },
    Command { name: String, args: Vec<String> },
}

fn config(role: Role, dir: &Path) -> ChannelConfig {
    ChannelConfig::new(role)
        .with_transport(TransportKind::Pipe)
        .with_pipe_dir(dir)
        .with_idle_poll(Duration::from_millis(10))
        .with_reconnect(ReconnectPolicy::pipe().with_interval(Duration::from_millis(50)))
}

fn channel(role: Role, dir: &Path) -> DuplexChannel<Envelope> {
    DuplexChannel::new(config(role, dir)).expect("pipe config")
}

async fn connect_pair(
    responder: &DuplexChannel<Envelope>,
    initiator: &DuplexChannel<Envelope>,
) {
    let (left, right) = timeout(WAIT, async {
        tokio::join!(responder.connect(), initiator.connect())
    })
    .await
    .expect("pair connects in time");
    left.expect("responder connect");
    right.expect("initiator connect");
}

async fn recv(inbound: &mut UnboundedReceiver<Envelope>) -> Envelope {
    timeout(WAIT, inbound.recv())
        .await
        .expect("timed out waiting for envelope")
        .expect("subscription closed")
}

/// Count end-of-stream events on the inbound pipe.
fn count_inbound_drops(channel: &DuplexChannel<Envelope>) -> Arc<AtomicUsize> {
    let drops = Arc::new(AtomicUsize::new(0));
    let seen = drops.clone();
    channel.on_error(move |err| {
        if matches!(err, ChannelError::Disconnected(Direction::Inbound)) {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    });
    drops
}

/// Wait until the inbound pipe saw its writer leave and was reopened, so
/// nothing the next writer sends lands on the stale handle.
async fn wait_for_reopen(channel: &DuplexChannel<Envelope>, drops: &AtomicUsize) {
    timeout(WAIT, async {
        while drops.load(Ordering::SeqCst) == 0
            || channel.state(Direction::Inbound) != ConnectionState::Connected
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("inbound pipe reopened in time");
}

fn status(text: &str) -> Envelope {
    Envelope::Status {
        text: text.to_string(),
    }
}

#[tokio::test]
async fn pipes_carry_both_directions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let responder = channel(Role::Responder, dir.path());
    let initiator = channel(Role::Initiator, dir.path());
    let mut at_responder = responder.subscribe();
    let mut at_initiator = initiator.subscribe();

    connect_pair(&responder, &initiator).await;
    assert_eq!(initiator.state(Direction::Outbound), ConnectionState::Connected);
    assert_eq!(responder.state(Direction::Outbound), ConnectionState::Connected);

    for i in 0..20 {
        initiator.enqueue(status(&format!("tick {i}")));
    }
    responder.enqueue(Envelope::Command {
        name: "open".to_string(),
        args: vec!["report.txt".to_string()],
    });

    for i in 0..20 {
        assert_eq!(recv(&mut at_responder).await, status(&format!("tick {i}")));
    }
    assert_eq!(
        recv(&mut at_initiator).await,
        Envelope::Command {
            name: "open".to_string(),
            args: vec!["report.txt".to_string()],
        }
    );

    initiator.shutdown().await;
    responder.shutdown().await;
}

#[tokio::test]
async fn responder_survives_initiator_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let responder = channel(Role::Responder, dir.path());
    let mut at_responder = responder.subscribe();
    let drops = count_inbound_drops(&responder);

    let first = channel(Role::Initiator, dir.path());
    connect_pair(&responder, &first).await;
    first.enqueue(status("hello"));
    assert_eq!(recv(&mut at_responder).await, status("hello"));

    first.shutdown().await;
    drop(first);
    wait_for_reopen(&responder, &drops).await;

    responder.enqueue(status("while you were away"));

    let second = channel(Role::Initiator, dir.path());
    let mut at_second = second.subscribe();
    timeout(WAIT, second.connect())
        .await
        .expect("restart connects in time")
        .expect("second initiator connect");

    assert_eq!(recv(&mut at_second).await, status("while you were away"));
    second.enqueue(status("back"));
    assert_eq!(recv(&mut at_responder).await, status("back"));

    second.shutdown().await;
    responder.shutdown().await;
}

#[tokio::test]
async fn initiator_resumes_after_responder_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let initiator = channel(Role::Initiator, dir.path());
    let mut at_initiator = initiator.subscribe();
    let drops = count_inbound_drops(&initiator);

    let first = channel(Role::Responder, dir.path());
    let mut at_first = first.subscribe();
    connect_pair(&first, &initiator).await;

    for i in 0..3 {
        initiator.enqueue(status(&format!("up {i}")));
        first.enqueue(status(&format!("down {i}")));
    }
    for i in 0..3 {
        assert_eq!(recv(&mut at_first).await, status(&format!("up {i}")));
        assert_eq!(recv(&mut at_initiator).await, status(&format!("down {i}")));
    }

    first.shutdown().await;
    drop(first);
    wait_for_reopen(&initiator, &drops).await;

    let second = channel(Role::Responder, dir.path());
    let mut at_second = second.subscribe();
    timeout(WAIT, second.connect())
        .await
        .expect("restarted responder connects in time")
        .expect("second responder connect");

    second.enqueue(status("host is back"));
    assert_eq!(recv(&mut at_initiator).await, status("host is back"));

    initiator.enqueue(status("welcome back"));
    assert_eq!(recv(&mut at_second).await, status("welcome back"));

    initiator.shutdown().await;
    second.shutdown().await;
}

#[tokio::test]
async fn initiator_gives_up_when_responder_never_reads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let initiator = DuplexChannel::<Envelope>::new(
        config(Role::Initiator, dir.path()).with_reconnect(
            ReconnectPolicy::pipe()
                .with_initial_attempts(3)
                .with_interval(Duration::from_millis(20)),
        ),
    )
    .expect("pipe config");

    let err = timeout(WAIT, initiator.connect())
        .await
        .expect("connect returns")
        .expect_err("nobody reads the outbound pipe");
    assert!(matches!(
        err,
        ChannelError::ConnectExhausted { attempts: 3, .. }
    ));
}
