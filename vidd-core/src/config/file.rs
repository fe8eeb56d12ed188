//! Configuration file loading
//!
//! Loads user configuration from `~/.config/vidd/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{
    AdapterCaps, AdapterFeatures, EndpointDiagnostics, MonitorDescriptor, MonitorIdentity,
    ModeList, ProcessorConfig, default_modes, parse_mode_list,
};
use crate::error::{Result, ViddError};
use crate::types::DisplayMode;

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Adapter identity and capabilities
    #[serde(default)]
    pub adapter: AdapterSettings,

    /// Virtual monitor identity and modes
    #[serde(default)]
    pub monitor: MonitorSettings,

    /// Swap-chain processor tuning
    #[serde(default)]
    pub processor: ProcessorSettings,
}

/// Adapter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterSettings {
    /// Friendly name shown in device manager and task manager
    #[serde(default = "default_friendly_name")]
    pub friendly_name: String,

    /// Manufacturer string
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,

    /// Model string
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum simultaneous monitors
    #[serde(default = "default_max_monitors")]
    pub max_monitors: u32,

    /// Accept gamma ramps
    #[serde(default)]
    pub gamma_ramp: bool,

    /// Hardware cursor support
    #[serde(default)]
    pub hardware_cursor: bool,

    /// HDR swap-chains
    #[serde(default)]
    pub hdr: bool,
}

/// Monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Three-letter PNP manufacturer id
    #[serde(default = "default_manufacturer_id")]
    pub manufacturer_id: String,

    /// Product code
    #[serde(default = "default_product_code")]
    pub product_code: u16,

    /// Serial number
    #[serde(default = "default_serial")]
    pub serial: u32,

    /// Monitor name (at most 13 characters)
    #[serde(default = "default_monitor_name")]
    pub name: String,

    /// Modes as `WIDTHxHEIGHT@HZ`, preferred first
    #[serde(default = "default_mode_strings")]
    pub modes: Vec<String>,

    /// Optional mode list file; overrides `modes` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_file: Option<PathBuf>,
}

/// Processor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorSettings {
    /// Frames buffered between the acquire loop and the sink (0 = no forwarding)
    #[serde(default = "default_queue_depth")]
    pub forward_queue_depth: usize,

    /// Log statistics every N frames (0 = never)
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,

    /// Worker thread stack size in bytes (unset = platform default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_stack_size: Option<usize>,
}

fn default_friendly_name() -> String {
    super::DEFAULT_FRIENDLY_NAME.to_string()
}

fn default_manufacturer() -> String {
    super::DEFAULT_MANUFACTURER.to_string()
}

fn default_model() -> String {
    super::DEFAULT_MODEL.to_string()
}

fn default_max_monitors() -> u32 {
    1
}

fn default_manufacturer_id() -> String {
    MonitorIdentity::default().manufacturer_id
}

fn default_product_code() -> u16 {
    MonitorIdentity::default().product_code
}

fn default_serial() -> u32 {
    MonitorIdentity::default().serial
}

fn default_monitor_name() -> String {
    MonitorIdentity::default().name
}

fn default_mode_strings() -> Vec<String> {
    default_modes().iter().map(ToString::to_string).collect()
}

fn default_queue_depth() -> usize {
    ProcessorConfig::default().forward_queue_depth
}

fn default_stats_interval() -> u64 {
    ProcessorConfig::default().stats_interval
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            friendly_name: default_friendly_name(),
            manufacturer: default_manufacturer(),
            model: default_model(),
            max_monitors: default_max_monitors(),
            gamma_ramp: false,
            hardware_cursor: false,
            hdr: false,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            manufacturer_id: default_manufacturer_id(),
            product_code: default_product_code(),
            serial: default_serial(),
            name: default_monitor_name(),
            modes: default_mode_strings(),
            mode_file: None,
        }
    }
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            forward_queue_depth: default_queue_depth(),
            stats_interval: default_stats_interval(),
            worker_stack_size: None,
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("vidd").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("vidd")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/vidd/config.toml")
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| ViddError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ViddError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)?;

        std::fs::write(&path, content)
            .map_err(|e| ViddError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Capability block for adapter initialization
    ///
    /// A mode file's display count takes precedence over `[adapter] max_monitors`.
    pub fn adapter_caps(&self) -> Result<AdapterCaps> {
        let max_monitors = match self.mode_list()? {
            Some(list) => {
                if list.display_count != self.adapter.max_monitors {
                    warn!(
                        "Mode file requests {} display(s), overriding max_monitors = {}",
                        list.display_count, self.adapter.max_monitors
                    );
                }
                list.display_count
            }
            None => self.adapter.max_monitors,
        };

        Ok(AdapterCaps {
            max_monitors,
            endpoint: EndpointDiagnostics {
                friendly_name: self.adapter.friendly_name.clone(),
                manufacturer: self.adapter.manufacturer.clone(),
                model: self.adapter.model.clone(),
            },
            features: AdapterFeatures {
                gamma_ramp: self.adapter.gamma_ramp,
                hardware_cursor: self.adapter.hardware_cursor,
                hdr: self.adapter.hdr,
            },
        })
    }

    /// Monitor identity fields
    pub fn monitor_identity(&self) -> MonitorIdentity {
        MonitorIdentity {
            manufacturer_id: self.monitor.manufacturer_id.clone(),
            product_code: self.monitor.product_code,
            serial: self.monitor.serial,
            name: self.monitor.name.clone(),
        }
    }

    /// Resolve the configured mode list, preferred first
    pub fn monitor_modes(&self) -> Result<Vec<DisplayMode>> {
        if let Some(list) = self.mode_list()? {
            return Ok(list.modes);
        }

        self.monitor
            .modes
            .iter()
            .map(|s| s.parse::<DisplayMode>().map_err(ViddError::Config))
            .collect()
    }

    /// Parsed `mode_file`, if one is configured
    fn mode_list(&self) -> Result<Option<ModeList>> {
        let Some(ref path) = self.monitor.mode_file else {
            return Ok(None);
        };

        let text = std::fs::read_to_string(path).map_err(|e| {
            ViddError::Config(format!("Failed to read mode file {:?}: {}", path, e))
        })?;
        let list = parse_mode_list(&text)?;
        debug!(
            "Loaded {} modes for {} display(s) from {:?}",
            list.modes.len(),
            list.display_count,
            path
        );
        Ok(Some(list))
    }

    /// Build the monitor descriptor (EDID + modes)
    pub fn monitor_descriptor(&self) -> Result<MonitorDescriptor> {
        let modes = self.monitor_modes()?;
        MonitorDescriptor::from_identity(&self.monitor_identity(), &modes)
    }

    /// Processor tuning
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            forward_queue_depth: self.processor.forward_queue_depth,
            stats_interval: self.processor.stats_interval,
            worker_stack_size: self.processor.worker_stack_size,
        }
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# vidd Configuration

[adapter]
# Identity strings reported to the OS at adapter initialization
friendly_name = "NVIDIA GeForce GTX 780 Ti"
manufacturer = "NVIDIA Corporation"
model = "GK110"

# Maximum simultaneous virtual monitors (1-16)
max_monitors = 1

# Optional features
gamma_ramp = false
hardware_cursor = false
hdr = false

[monitor]
# EDID identity: three-letter PNP id, product code, serial, name (<= 13 chars)
manufacturer_id = "MTT"
product_code = 4919
serial = 1
name = "VDD by MTT"

# Supported modes, preferred first
modes = ["1920x1080@60", "1280x720@60", "2560x1440@60", "3840x2160@60"]

# Or load them from a mode list file (first line: display count, which
# replaces max_monitors, then one "width, height, refresh" per line)
# mode_file = "C:/VirtualDisplayDriver/option.txt"

[processor]
# Frames buffered between the acquire loop and the frame sink (0 = no forwarding)
forward_queue_depth = 2

# Log frame statistics every N frames (0 = never)
stats_interval = 300

# Stack size of each swap-chain worker thread in bytes
# worker_stack_size = 262144
"#
    .to_string()
}
