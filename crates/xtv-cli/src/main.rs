//! xtv CLI - Headless tool for the xtv playback core
//!
//! Features:
//! - Stream resolution against the xtv server API
//! - Attach plans (engine profile selection) for a URL
//! - Key binding listing
//! - Event-script replay through the controller with a recording host

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use xtv_core::{ContentKind, PlayerConfig};

mod commands;
mod output;

/// xtv CLI - Playback core toolkit
#[derive(Parser)]
#[command(name = "xtv")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Headless playback controller toolkit for xtv", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Player configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a stream through the server API
    Resolve {
        /// Content kind (live, movie, episode)
        kind: ContentKind,

        /// Stream identifier
        id: String,

        /// Server base URL
        #[arg(short, long, env = "XTV_SERVER", default_value = "http://localhost:3000")]
        server: String,

        /// Container extension hint (episodes)
        #[arg(short, long)]
        extension: Option<String>,
    },

    /// Show how a URL would be attached
    Plan {
        /// Stream URL
        url: String,

        /// Content kind (live, movie, episode)
        #[arg(short, long, default_value = "movie")]
        kind: ContentKind,

        /// Assume the adaptive engine is unavailable
        #[arg(long)]
        no_engine: bool,

        /// Assume the element plays HLS natively
        #[arg(long)]
        native_hls: bool,
    },

    /// List keyboard shortcuts
    Keys,

    /// Print the effective configuration
    Config,

    /// Replay an event script through the controller
    Replay {
        /// Script file (JSON)
        script: PathBuf,

        /// Include every host call in the report
        #[arg(long)]
        calls: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PlayerConfig> {
    match path {
        Some(path) => Ok(PlayerConfig::from_path(path)?),
        None => Ok(PlayerConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();
    xtv_core::init();

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Resolve { kind, id, server, extension } => {
            commands::resolve(&server, kind, &id, extension, &config, &cli.format).await?;
        }
        Commands::Plan { url, kind, no_engine, native_hls } => {
            commands::plan(&url, kind, !no_engine, native_hls, &config, &cli.format)?;
        }
        Commands::Keys => {
            commands::keys(&config, &cli.format)?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Replay { script, calls } => {
            commands::replay(&script, calls, config, &cli.format)?;
        }
    }

    Ok(())
}
