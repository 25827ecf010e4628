use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use surge_trade_core::ConfigLoader;

/// Arguments for the show-config command.
#[derive(Args, Debug, Clone)]
pub struct ShowConfigArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/surge.toml")]
    pub config: PathBuf,
}

/// Prints the configuration after defaults, file and `SURGE_` env vars are merged.
pub fn run_show_config(args: &ShowConfigArgs) -> Result<()> {
    let config = ConfigLoader::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
