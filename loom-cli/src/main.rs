//! Loom CLI
//!
//! Runs pipelines and single steps on the local machine, prints resolved
//! step descriptors, and serves as the entrypoint inside step containers.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "loom")]
#[command(about = "Run pipeline steps locally", long_about = None)]
struct Cli {
    /// Enable debug logging (prints resolved executor inputs)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "loom_cli=debug,loom_runner=debug,loom_lua=debug,loom::lua=debug"
    } else {
        "loom_cli=info,loom_runner=info,loom_lua=info,loom::lua=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    handle_command(cli.command).await
}
