//! CLI command implementations

mod config;
mod edid;
mod modes;
mod simulate;

pub use config::{ConfigArgs, config};
pub use edid::{EdidArgs, edid};
pub use modes::modes;
pub use simulate::{SimulateArgs, simulate};

use anyhow::{Context, Result};
use std::path::PathBuf;
use vidd_core::ConfigFile;

/// Load the configuration from `path`, or the default location
pub(crate) fn load_config(path: Option<PathBuf>) -> Result<ConfigFile> {
    let path = path.unwrap_or_else(ConfigFile::default_path);
    ConfigFile::load_from(path.clone())
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}
