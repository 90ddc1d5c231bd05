use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hive_executor::MemoryEngine;

/// hive executor -- serves bridge commands against the in-memory engine.
///
/// Connects to the controller address given as the last argument; any
/// arguments before it are engine options and are logged but not
/// interpreted.
#[derive(Parser, Debug)]
#[command(name = "hive-executor", version, about)]
struct Cli {
    /// Directory relative script paths are resolved against
    #[arg(long, default_value = ".")]
    library_path: PathBuf,

    /// Engine options followed by the controller address
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Stdout and stderr are forwarded into the controller's log.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (address, options) = cli
        .args
        .split_last()
        .context("no controller address given")?;
    if !options.is_empty() {
        tracing::debug!(?options, "ignoring engine options");
    }

    let engine = MemoryEngine::new(cli.library_path);
    hive_executor::serve(address, engine)
        .await
        .with_context(|| format!("executor session at {address} failed"))?;
    Ok(())
}
