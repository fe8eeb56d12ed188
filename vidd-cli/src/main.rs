//! vidd CLI
//!
//! Drive the virtual display core against a simulated compositor.
//!
//! # Usage
//!
//! ```bash
//! # Show the modes the virtual monitor advertises
//! vidd modes
//!
//! # Dump the generated EDID
//! vidd edid
//!
//! # Run the full adapter/monitor/swap-chain lifecycle for 600 frames
//! vidd simulate --frames 600 --mode 2560x1440@60
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// vidd - virtual indirect display driver core
#[derive(Parser)]
#[command(name = "vidd")]
#[command(version)]
#[command(about = "Virtual indirect display adapter, monitor and swap-chain processing", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (defaults to the per-user config path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the modes the virtual monitor advertises
    Modes,

    /// Show the generated EDID
    Edid(commands::EdidArgs),

    /// Manage the configuration file
    Config(commands::ConfigArgs),

    /// Run the driver lifecycle against a simulated compositor
    #[command(alias = "sim")]
    Simulate(commands::SimulateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["vidd", "vidd_core"] {
        filter = filter.add_directive(format!("{}={}", target, level).parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Modes => commands::modes(cli.config).await?,
        Commands::Edid(args) => commands::edid(cli.config, args).await?,
        Commands::Config(args) => commands::config(cli.config, args).await?,
        Commands::Simulate(args) => commands::simulate(cli.config, args).await?,
    }

    Ok(())
}
