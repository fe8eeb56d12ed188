//! EDID command - show the generated identity block

use anyhow::{Context, Result};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use vidd_core::edid;

/// Arguments for the edid command
#[derive(Args)]
pub struct EdidArgs {
    /// Write the raw 128-byte block to stdout
    #[arg(long)]
    raw: bool,
}

/// Print the EDID generated from the configuration
pub async fn edid(config_path: Option<PathBuf>, args: EdidArgs) -> Result<()> {
    let config = super::load_config(config_path)?;
    let descriptor = config
        .monitor_descriptor()
        .context("Failed to build the monitor descriptor")?;
    let bytes = descriptor.edid();

    if args.raw {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(bytes).context("Failed to write EDID")?;
        stdout.flush()?;
        return Ok(());
    }

    let identity = edid::identity(bytes).context("Generated EDID failed to decode")?;

    println!("vidd - EDID\n");
    println!("Identity:");
    println!("  Manufacturer: {}", identity.manufacturer_id);
    println!("  Product code: 0x{:04X}", identity.product_code);
    println!("  Serial:       {}", identity.serial);
    if let Some(ref name) = identity.monitor_name {
        println!("  Name:         {}", name);
    }
    if let Some((w, h)) = identity.preferred_resolution {
        println!("  Preferred:    {}x{}", w, h);
    }
    println!();

    println!("Bytes ({}):", bytes.len());
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02X}", b)).collect();
        println!("  {:04X}: {}", row * 16, hex.join(" "));
    }

    Ok(())
}
