//! Chromix CLI — Command-line interface for chroma-key compositing.
//!
//! Usage:
//!   chromix composite <FOREGROUND> <BACKGROUND> [OPTIONS]
//!   chromix probe <PATH>     Show media information as JSON
//!   chromix check            Check external tool availability

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "chromix",
    about = "Green-screen removal and timed video compositing",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove the key-colored backdrop from a foreground clip and
    /// composite it onto a background clip
    Composite(commands::composite::CompositeArgs),

    /// Show media information for a file
    Probe {
        /// Path to the media file
        path: std::path::PathBuf,
    },

    /// Check external tool availability
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    chromix_common::logging::init_logging(&chromix_common::config::LoggingConfig {
        level: log_level.to_string(),
        json: false,
        file: None,
    });

    match cli.command {
        Commands::Composite(args) => commands::composite::run(args).await,
        Commands::Probe { path } => commands::probe::run(path),
        Commands::Check => commands::check::run(),
    }
}
