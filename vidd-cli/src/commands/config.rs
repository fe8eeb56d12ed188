//! Config command - manage configuration files

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use vidd_core::config::{ConfigFile, sample_config};

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the path to the config file
    Path,

    /// Show the effective configuration
    Show,

    /// Generate a default config file
    Init {
        /// Force overwrite if file exists
        #[arg(short, long)]
        force: bool,
    },

    /// Print a sample configuration to stdout
    Sample,
}

/// Run config subcommand
pub async fn config(config_path: Option<PathBuf>, args: ConfigArgs) -> Result<()> {
    let path = config_path.unwrap_or_else(ConfigFile::default_path);

    match args.command {
        ConfigCommand::Path => {
            println!("{}", path.display());
            if path.exists() {
                println!("(file exists)");
            } else {
                println!("(file does not exist)");
            }
        }
        ConfigCommand::Show => {
            if !path.exists() {
                println!("No configuration file found at: {}", path.display());
                println!();
                println!("Using default settings. Create a config file with:");
                println!("  vidd config init");
                println!();
            } else {
                println!("Configuration file: {}\n", path.display());
            }

            let config = ConfigFile::load_from(path).context("Failed to load config file")?;
            let caps = config.adapter_caps().context("Invalid mode file")?;
            caps.validate().context("Invalid [adapter] section")?;
            let descriptor = config
                .monitor_descriptor()
                .context("Invalid [monitor] section")?;
            let processor = config.processor_config();

            println!("Adapter:");
            println!("  Name:         {}", caps.endpoint.friendly_name);
            println!("  Manufacturer: {}", caps.endpoint.manufacturer);
            println!("  Model:        {}", caps.endpoint.model);
            println!("  Max monitors: {}", caps.max_monitors);
            println!(
                "  Features:     gamma={} cursor={} hdr={}",
                caps.features.gamma_ramp, caps.features.hardware_cursor, caps.features.hdr
            );
            println!();
            println!("Monitor:");
            println!("  Name:         {}", config.monitor.name);
            println!("  Modes:        {}", descriptor.modes().len());
            if let Some(mode) = descriptor.preferred_mode() {
                println!("  Preferred:    {}", mode);
            }
            println!();
            println!("Processor:");
            println!("  Queue depth:  {}", processor.forward_queue_depth);
            println!("  Stats every:  {} frames", processor.stats_interval);
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                println!("Configuration file already exists: {}", path.display());
                println!();
                println!("Use --force to overwrite, or edit the existing file.");
                return Ok(());
            }

            // Create parent directory if needed
            if let Some(parent) = path.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent).context("Failed to create config directory")?;
                }
            }

            // Write sample config
            std::fs::write(&path, sample_config()).context("Failed to write config file")?;

            println!("Created configuration file: {}", path.display());
            println!();
            println!("Edit this file to customize the virtual adapter and monitor.");
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}
