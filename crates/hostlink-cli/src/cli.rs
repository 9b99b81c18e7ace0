use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use hostlink_core::{Role, TransportKind};

/// Output format for the `config` command
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Toml,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleArg {
    /// Satellite side; dials the host
    Initiator,
    /// Host side; waits for the satellite
    Responder,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Initiator => Role::Initiator,
            RoleArg::Responder => Role::Responder,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportArg {
    Pipe,
    Socket,
}

impl From<TransportArg> for TransportKind {
    fn from(value: TransportArg) -> Self {
        match value {
            TransportArg::Pipe => TransportKind::Pipe,
            TransportArg::Socket => TransportKind::Socket,
        }
    }
}

#[derive(Parser)]
#[command(name = "hostlink")]
#[command(version, about = "Hostlink - resilient duplex messaging between two processes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.config/hostlink/config.toml)
    #[arg(long, global = true, env = "HOSTLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, env = "HOSTLINK_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the peer and bridge stdin/stdout as JSON lines
    Run(RunArgs),

    /// Print the effective channel configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Channel settings that override the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct ChannelArgs {
    /// Which end of the channel this process is
    #[arg(long, value_enum)]
    pub role: Option<RoleArg>,

    /// Transport variant
    #[arg(long, value_enum)]
    pub transport: Option<TransportArg>,

    /// Loopback port for the socket transport
    #[arg(long)]
    pub port: Option<u16>,

    /// Address for the socket transport
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Directory holding the FIFOs (Unix pipe transport)
    #[arg(long)]
    pub pipe_dir: Option<PathBuf>,

    /// Maximum simultaneous in-flight sends
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Wait between connection attempts, in milliseconds
    #[arg(long)]
    pub retry_interval_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub channel: ChannelArgs,

    /// Keep running after stdin closes
    #[arg(long)]
    pub stay: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub channel: ChannelArgs,

    /// Output format
    #[arg(long, value_enum, default_value = "toml")]
    pub format: OutputFormat,
}
