//! fleetctl - run the fleet normalization engine against device JSON files.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use fleetctl::commands;

#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(about = "Normalize fleet device telemetry", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the canonical model of one raw device record
    Normalize {
        /// Raw device JSON file
        file: PathBuf,

        /// Separate events feed for the device
        #[arg(long)]
        events: Option<PathBuf>,

        /// Config file (default: ./fleet.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Single-line JSON
        #[arg(long)]
        compact: bool,
    },

    /// Summarize every device file in a directory
    Fleet {
        /// Directory of raw device JSON files
        dir: PathBuf,

        /// Config file (default: ./fleet.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("FLEET_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Normalize {
            file,
            events,
            config,
            compact,
        } => commands::handle_normalize(file, events, config, compact).await,
        Commands::Fleet { dir, config } => commands::handle_fleet(dir, config).await,
    }
}
