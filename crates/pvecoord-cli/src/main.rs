use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pvecoord::{Provider, ProviderConfig};

/// Coordinate Proxmox API access: bounded parallelism and collision-free VM IDs.
///
/// Configuration is read from the PM_* environment variables
/// (PM_API_URL, PM_API_TOKEN_ID, PM_API_TOKEN_SECRET, PM_PARALLEL, ...).
#[derive(Debug, Parser)]
#[command(name = "pvecoord", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration and print it (secrets omitted).
    Check,
    /// Allocate VM IDs, each request running inside an admission slot.
    NextId {
        /// How many IDs to allocate concurrently.
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let provider = match ProviderConfig::from_env().and_then(Provider::configure) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let result = match cli.command {
        Command::Check => check(&provider),
        Command::NextId { count } => next_ids(&provider, count).await,
    };

    provider.shutdown();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn check(provider: &Provider) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(provider.config())
        .context("failed to serialize configuration")?;
    println!("{json}");
    Ok(())
}

async fn next_ids(provider: &Provider, count: usize) -> anyhow::Result<()> {
    let tasks: Vec<_> = (0..count)
        .map(|_| {
            let state = Arc::clone(provider.coordination());
            tokio::spawn(async move {
                let _slot = state.begin().await?;
                let id = state.next_vm_id().await?;
                anyhow::Ok(id)
            })
        })
        .collect();

    for task in tasks {
        let id = task.await.context("allocation task panicked")??;
        tracing::debug!(vm_id = %id, "Allocated");
        println!("{id}");
    }

    Ok(())
}
