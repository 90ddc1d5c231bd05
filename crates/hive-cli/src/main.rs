mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// hive -- drive a headless executor from the command line.
#[derive(Parser, Debug)]
#[command(name = "hive", version, about)]
struct Cli {
    /// Configuration file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Executor program, overriding the configuration
    #[arg(long, global = true)]
    executor: Option<PathBuf>,

    /// Request timeout in seconds, overriding the configuration (0 disables)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open a page and print the requested results as JSON
    Run {
        /// Address to open
        url: String,

        /// Render the page to this file after loading
        #[arg(long)]
        render: Option<PathBuf>,

        /// Function source to evaluate in the page
        #[arg(long)]
        eval: Option<String>,

        /// Page property to read (repeatable)
        #[arg(long = "get")]
        get: Vec<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref(), cli.executor, cli.timeout)?;

    match cli.command {
        Commands::Run {
            url,
            render,
            eval,
            get,
        } => {
            let runtime = tokio::runtime::Runtime::new()?;
            let request = commands::run::Request {
                url,
                render,
                eval,
                get,
            };
            runtime.block_on(commands::run::run(&config, request))
        }
        Commands::Config => commands::print_config(&config),
    }
}
