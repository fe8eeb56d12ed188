//! Modes command - list advertised display modes

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Print the configured mode list, preferred first
pub async fn modes(config_path: Option<PathBuf>) -> Result<()> {
    let config = super::load_config(config_path)?;
    let modes = config
        .monitor_modes()
        .context("Failed to resolve the monitor mode list")?;

    println!("vidd - Monitor Modes\n");

    if let Some(ref path) = config.monitor.mode_file {
        println!("Source: {}", path.display());
    } else {
        println!("Source: [monitor] modes");
    }
    println!("Monitor: {} ({})", config.monitor.name, config.monitor.manufacturer_id);
    println!();

    for (i, mode) in modes.iter().enumerate() {
        let marker = if i == 0 { " (preferred)" } else { "" };
        println!(
            "  {:>2}. {:>4}x{:<4} @ {:>3} Hz{}",
            i + 1,
            mode.width,
            mode.height,
            mode.refresh_hz,
            marker
        );
    }

    println!();
    println!("{} mode(s)", modes.len());
    Ok(())
}
