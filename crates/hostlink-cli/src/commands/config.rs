use anyhow::{Context, Result};
use hostlink_core::ChannelConfig;

use crate::cli::OutputFormat;

/// Print the configuration the channel would run with, reconnect policy
/// resolved.
pub fn run(mut config: ChannelConfig, format: OutputFormat) -> Result<()> {
    config.reconnect = Some(config.reconnect_policy());

    let output = match format {
        OutputFormat::Toml => {
            toml::to_string_pretty(&config).context("failed to render config as TOML")?
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(&config).context("failed to render config as JSON")?
        }
    };
    println!("{}", output.trim_end());
    Ok(())
}
