use anyhow::{Context, Result};
use clap::Parser;

use tokio::runtime::Builder;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use mbxgroups::app::{connect, run_command};
use mbxgroups::cli::Cli;

fn main() -> Result<()> {
    // Every action waits on the operator or on one directory call, so a
    // single-threaded runtime is enough
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Logs go to stderr so they never interleave with console prompts
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let directory = connect(&cli).await?;

    let stdin = std::io::stdin();
    let outcome = run_command(&cli, directory.clone(), stdin.lock(), std::io::stdout()).await;

    if let Err(e) = directory.close().await {
        warn!("Failed to close directory session: {}", e);
    }

    outcome
}
