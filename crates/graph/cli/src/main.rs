//! FrameGraph CLI
//!
//! Runs scripted transactions against an in-process FrameGraph service:
//! - `config` prints the effective configuration
//! - `run <script>` executes a JSON or YAML script and prints one JSON
//!   record per result, commit and notification

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use framegraph_service::{FrameGraphConfig, FrameGraphService};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod runner;
mod script;

use runner::Runner;
use script::Script;

/// FrameGraph CLI
#[derive(Parser)]
#[command(name = "framegraph")]
#[command(about = "FrameGraph - transactional graph of uncertain coordinate frames", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FRAMEGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overrides the configuration)
    #[arg(long, env = "FRAMEGRAPH_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration as JSON
    Config,

    /// Execute a script of transactions and watches
    Run {
        /// Script path (.json, otherwise YAML)
        script: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = FrameGraphConfig::load(cli.config.as_deref())?;

    // Initialize tracing; logs go to stderr so stdout stays machine-readable
    let level = cli.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Run { script } => {
            let parsed = Script::load(&script)?;
            info!(script = %script.display(), steps = parsed.steps.len(), "Running script");

            let service = FrameGraphService::new(&config)?;
            let records = Runner::new(service).await.run(&parsed).await;
            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
        }
    }

    Ok(())
}
