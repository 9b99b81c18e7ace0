//! CLI configuration file support
//!
//! Loads configuration from ~/.config/hostlink/config.toml

use anyhow::{Context, Result, bail};
use hostlink_core::{ChannelConfig, ReconnectPolicy, Role, TransportKind};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::ChannelArgs;

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Channel defaults, overridden by command-line flags
    #[serde(default)]
    pub channel: ChannelDefaults,
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelDefaults {
    pub role: Option<Role>,
    pub transport: Option<TransportKind>,
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub pipe_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub retry_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory for the rolling log file
    pub dir: Option<PathBuf>,
    /// Default filter when RUST_LOG is unset, e.g. "info" or "hostlink_core=debug"
    pub filter: Option<String>,
}

impl CliConfig {
    /// Load configuration from `path`, or the default path when `None`
    pub fn load(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::load_from_path(Some(path.to_path_buf())),
            None => Self::load_from_path(Self::default_path()),
        }
    }

    /// Load configuration from a specific path
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hostlink").join("config.toml"))
    }

    /// Merge file values with command-line flags into a channel config.
    pub fn channel_config(&self, args: &ChannelArgs) -> Result<ChannelConfig> {
        let file = &self.channel;

        let role = match (args.role, file.role) {
            (Some(role), _) => role.into(),
            (None, Some(role)) => role,
            (None, None) => bail!("no role given; pass --role initiator or --role responder"),
        };

        let mut config = ChannelConfig::new(role);
        if let Some(transport) = args.transport.map(Into::into).or(file.transport) {
            config = config.with_transport(transport);
        }
        if let Some(host) = args.host.or(file.host) {
            config.socket.host = host;
        }
        if let Some(port) = args.port.or(file.port) {
            config = config.with_port(port);
        }
        if let Some(dir) = args.pipe_dir.as_ref().or(file.pipe_dir.as_ref()) {
            config = config.with_pipe_dir(dir);
        }
        if let Some(permits) = args.concurrency.or(file.concurrency) {
            config = config.with_max_concurrent_sends(permits);
        }
        if let Some(interval) = args.retry_interval_ms.or(file.retry_interval_ms) {
            let policy = match config.transport {
                TransportKind::Pipe => ReconnectPolicy::pipe(),
                TransportKind::Socket => ReconnectPolicy::socket(),
            };
            config = config.with_reconnect(policy.with_interval(Duration::from_millis(interval)));
        }

        config.validate().context("invalid channel settings")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{RoleArg, TransportArg};

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(config.channel.role.is_none());
        assert!(config.log.dir.is_none());
    }

    #[test]
    fn file_values_apply_and_flags_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[channel]
role = "responder"
transport = "pipe"
port = 4100
concurrency = 2

[log]
filter = "debug"
"#,
        )
        .unwrap();

        let config = CliConfig::load(Some(&path));
        assert_eq!(config.log.filter.as_deref(), Some("debug"));

        let merged = config.channel_config(&ChannelArgs::default()).unwrap();
        assert_eq!(merged.role, Role::Responder);
        assert_eq!(merged.transport, TransportKind::Pipe);
        assert_eq!(merged.socket.port, 4100);
        assert_eq!(merged.max_concurrent_sends, 2);

        let args = ChannelArgs {
            role: Some(RoleArg::Initiator),
            transport: Some(TransportArg::Socket),
            port: Some(4200),
            ..ChannelArgs::default()
        };
        let merged = config.channel_config(&args).unwrap();
        assert_eq!(merged.role, Role::Initiator);
        assert_eq!(merged.transport, TransportKind::Socket);
        assert_eq!(merged.socket.port, 4200);
    }

    #[test]
    fn role_is_required() {
        let err = CliConfig::default()
            .channel_config(&ChannelArgs::default())
            .unwrap_err();
        assert!(err.to_string().contains("no role"));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let args = ChannelArgs {
            role: Some(RoleArg::Initiator),
            concurrency: Some(0),
            ..ChannelArgs::default()
        };
        assert!(CliConfig::default().channel_config(&args).is_err());
    }

    #[test]
    fn retry_interval_keeps_transport_attempts() {
        let args = ChannelArgs {
            role: Some(RoleArg::Initiator),
            transport: Some(TransportArg::Pipe),
            retry_interval_ms: Some(250),
            ..ChannelArgs::default()
        };
        let policy = CliConfig::default()
            .channel_config(&args)
            .unwrap()
            .reconnect_policy();
        assert_eq!(policy.initial_connect_attempts, 10);
        assert_eq!(policy.retry_interval_ms, 250);
    }
}
