use clap::{Parser, Subcommand};

mod commands;
mod market;
mod trade_book;

use commands::{PaperArgs, ShowConfigArgs};

#[derive(Parser)]
#[command(name = "surge-trade")]
#[command(about = "Surge-detection paper trading engine", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a paper trading session over a synthetic market
    Paper(PaperArgs),
    /// Print the resolved configuration
    ShowConfig(ShowConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the command's JSON output.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Paper(args) => {
            commands::run_paper(args).await?;
        }
        Commands::ShowConfig(args) => {
            commands::run_show_config(&args)?;
        }
    }

    Ok(())
}
