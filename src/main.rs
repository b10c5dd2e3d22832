//! toolshed - command execution and file editing for coding agents
//!
//! Thin binary entry point. Results are printed to stdout as JSON; logs go to
//! stderr.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use toolshed_runner::InterruptSignal;

mod cli;

use cli::Cli;

const DEFAULT_LOG_FILTER: &str = "toolshed=info";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    initialize_tracing();
    toolshed_config::load_dotenv();

    let interrupt = InterruptSignal::new();
    let on_ctrl_c = interrupt.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::warn!(target: "toolshed.cli", "interrupt requested");
            on_ctrl_c.trigger();
        }
    });

    let record = tokio::task::spawn_blocking(move || cli::dispatch(args, interrupt))
        .await
        .context("command task failed")??;

    println!(
        "{}",
        serde_json::to_string_pretty(&record).context("Failed to render result")?
    );
    if record.get("error").is_some() {
        std::process::exit(1);
    }
    Ok(())
}

fn initialize_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}
