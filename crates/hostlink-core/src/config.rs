//! Channel configuration.
//!
//! Pipe names and the socket port are fixed conventions compiled into both
//! peers; nothing is negotiated at runtime.

use crate::error::ChannelError;
use crate::reconnect::ReconnectPolicy;
use crate::types::Role;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 35000;
pub const DEFAULT_MAX_CONCURRENT_SENDS: usize = 5;
pub const DEFAULT_IDLE_POLL_MS: u64 = 100;
pub const INITIATOR_TO_RESPONDER_PIPE: &str = "HostlinkInitiatorToResponder";
pub const RESPONDER_TO_INITIATOR_PIPE: &str = "HostlinkResponderToInitiator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Two one-directional named pipes with swapped roles.
    Pipe,
    /// One bidirectional loopback TCP stream.
    #[default]
    Socket,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pipe => f.write_str("pipe"),
            Self::Socket => f.write_str("socket"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl SocketConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipeConfig {
    /// Where Unix FIFOs are created. Defaults to the OS temp dir.
    /// Ignored on Windows, where pipes live in the `\\.\pipe\` namespace.
    pub directory: Option<PathBuf>,
    pub initiator_to_responder: String,
    pub responder_to_initiator: String,
}

impl PipeConfig {
    pub fn directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Name of the pipe `role` writes to.
    pub fn outbound_name(&self, role: Role) -> &str {
        match role {
            Role::Initiator => &self.initiator_to_responder,
            Role::Responder => &self.responder_to_initiator,
        }
    }

    /// Name of the pipe `role` reads from.
    pub fn inbound_name(&self, role: Role) -> &str {
        self.outbound_name(role.peer())
    }
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            directory: None,
            initiator_to_responder: INITIATOR_TO_RESPONDER_PIPE.to_string(),
            responder_to_initiator: RESPONDER_TO_INITIATOR_PIPE.to_string(),
        }
    }
}

fn default_max_concurrent_sends() -> usize {
    DEFAULT_MAX_CONCURRENT_SENDS
}

fn default_idle_poll_ms() -> u64 {
    DEFAULT_IDLE_POLL_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub role: Role,
    #[serde(default)]
    pub transport: TransportKind,
    /// Maximum simultaneous in-flight send attempts.
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
    /// How long the drain loop sleeps when the queue is empty.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub pipe: PipeConfig,
    /// Overrides the per-transport reconnect defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<ReconnectPolicy>,
}

impl ChannelConfig {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            transport: TransportKind::default(),
            max_concurrent_sends: DEFAULT_MAX_CONCURRENT_SENDS,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
            socket: SocketConfig::default(),
            pipe: PipeConfig::default(),
            reconnect: None,
        }
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.socket.port = port;
        self
    }

    pub fn with_pipe_dir(mut self, directory: impl AsRef<Path>) -> Self {
        self.pipe.directory = Some(directory.as_ref().to_path_buf());
        self
    }

    pub fn with_max_concurrent_sends(mut self, permits: usize) -> Self {
        self.max_concurrent_sends = permits;
        self
    }

    pub fn with_idle_poll(mut self, interval: Duration) -> Self {
        self.idle_poll_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Effective reconnect policy: the override, or the transport default.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        self.reconnect.clone().unwrap_or_else(|| match self.transport {
            TransportKind::Pipe => ReconnectPolicy::pipe(),
            TransportKind::Socket => ReconnectPolicy::socket(),
        })
    }

    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.max_concurrent_sends == 0 {
            return Err(ChannelError::InvalidConfig(
                "max_concurrent_sends must be at least 1".to_string(),
            ));
        }
        if self.idle_poll_ms == 0 {
            return Err(ChannelError::InvalidConfig(
                "idle_poll_ms must be greater than zero".to_string(),
            ));
        }

        let policy = self.reconnect_policy();
        if policy.initial_connect_attempts == 0 {
            return Err(ChannelError::InvalidConfig(
                "initial_connect_attempts must be at least 1".to_string(),
            ));
        }
        if policy.retry_interval_ms == 0 {
            return Err(ChannelError::InvalidConfig(
                "retry_interval_ms must be greater than zero".to_string(),
            ));
        }

        if self.transport == TransportKind::Pipe {
            let outbound = self.pipe.initiator_to_responder.trim();
            let inbound = self.pipe.responder_to_initiator.trim();
            if outbound.is_empty() || inbound.is_empty() {
                return Err(ChannelError::InvalidConfig(
                    "pipe names cannot be empty".to_string(),
                ));
            }
            if outbound == inbound {
                return Err(ChannelError::InvalidConfig(format!(
                    "both directions use the same pipe name '{}'",
                    outbound
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shared_conventions() {
        let config = ChannelConfig::new(Role::Responder);
        assert_eq!(config.transport, TransportKind::Socket);
        assert_eq!(config.max_concurrent_sends, 5);
        assert_eq!(config.idle_poll(), Duration::from_millis(100));
        assert_eq!(config.socket.addr(), "127.0.0.1:35000".parse().unwrap());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn roles_swap_pipe_names() {
        let pipe = PipeConfig::default();
        assert_eq!(
            pipe.outbound_name(Role::Initiator),
            pipe.inbound_name(Role::Responder)
        );
        assert_eq!(
            pipe.outbound_name(Role::Responder),
            pipe.inbound_name(Role::Initiator)
        );
        assert_ne!(
            pipe.outbound_name(Role::Initiator),
            pipe.inbound_name(Role::Initiator)
        );
    }

    #[test]
    fn reconnect_policy_follows_transport() {
        let socket = ChannelConfig::new(Role::Initiator);
        assert_eq!(socket.reconnect_policy().initial_connect_attempts, 5);

        let pipe = ChannelConfig::new(Role::Initiator).with_transport(TransportKind::Pipe);
        assert_eq!(pipe.reconnect_policy().initial_connect_attempts, 10);

        let custom = pipe.with_reconnect(ReconnectPolicy::pipe().with_initial_attempts(2));
        assert_eq!(custom.reconnect_policy().initial_connect_attempts, 2);
    }

    #[test]
    fn validate_rejects_zero_budget() {
        let config = ChannelConfig::new(Role::Initiator).with_max_concurrent_sends(0);
        assert!(matches!(
            config.validate(),
            Err(ChannelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_shared_pipe_name() {
        let mut config = ChannelConfig::new(Role::Initiator).with_transport(TransportKind::Pipe);
        config.pipe.responder_to_initiator = config.pipe.initiator_to_responder.clone();
        assert!(matches!(
            config.validate(),
            Err(ChannelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ChannelConfig =
            serde_json::from_str(r#"{"role":"initiator","transport":"pipe"}"#).unwrap();
        assert_eq!(config.role, Role::Initiator);
        assert_eq!(config.transport, TransportKind::Pipe);
        assert_eq!(config.max_concurrent_sends, 5);
        assert_eq!(config.pipe, PipeConfig::default());
        assert!(config.reconnect.is_none());
    }
}
