use crate::types::{ConnectionState, Direction};
use tokio::sync::watch;
use tracing::debug;

/// Connection state of both directions, observable through `watch`.
pub(crate) struct ConnectionStates {
    outbound: watch::Sender<ConnectionState>,
    inbound: watch::Sender<ConnectionState>,
}

impl ConnectionStates {
    pub(crate) fn new() -> Self {
        let (outbound, _) = watch::channel(ConnectionState::Disconnected);
        let (inbound, _) = watch::channel(ConnectionState::Disconnected);
        Self { outbound, inbound }
    }

    fn sender(&self, direction: Direction) -> &watch::Sender<ConnectionState> {
        match direction {
            Direction::Outbound => &self.outbound,
            Direction::Inbound => &self.inbound,
        }
    }

    pub(crate) fn set(&self, direction: Direction, state: ConnectionState) {
        let changed = self.sender(direction).send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            debug!(%direction, %state, "Connection state changed");
        }
    }

    pub(crate) fn get(&self, direction: Direction) -> ConnectionState {
        *self.sender(direction).borrow()
    }

    pub(crate) fn watch(&self, direction: Direction) -> watch::Receiver<ConnectionState> {
        self.sender(direction).subscribe()
    }
}
