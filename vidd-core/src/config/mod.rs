//! Configuration types for vidd
//!
//! Static capability and descriptor data injected into the adapter and its
//! monitors at construction time. Nothing here is process-global.

mod file;
mod modes;

pub use file::{ConfigFile, sample_config};
pub use modes::{ModeList, default_modes, parse_mode_list};

use serde::{Deserialize, Serialize};

use crate::edid::{self, EdidBuilder};
use crate::error::{Result, ViddError};
use crate::types::DisplayMode;

/// Upper bound on monitors a single adapter may advertise
pub const MAX_SUPPORTED_MONITORS: u32 = 16;

/// Default adapter friendly name
pub const DEFAULT_FRIENDLY_NAME: &str = "NVIDIA GeForce GTX 780 Ti";

/// Default adapter manufacturer
pub const DEFAULT_MANUFACTURER: &str = "NVIDIA Corporation";

/// Default adapter model
pub const DEFAULT_MODEL: &str = "GK110";

/// Diagnostic strings the adapter reports to the OS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDiagnostics {
    /// Friendly adapter name
    pub friendly_name: String,
    /// Manufacturer name
    pub manufacturer: String,
    /// Model name
    pub model: String,
}

impl Default for EndpointDiagnostics {
    fn default() -> Self {
        Self {
            friendly_name: DEFAULT_FRIENDLY_NAME.to_string(),
            manufacturer: DEFAULT_MANUFACTURER.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Optional adapter features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdapterFeatures {
    /// Adapter accepts gamma ramps
    pub gamma_ramp: bool,
    /// Adapter draws a hardware cursor
    pub hardware_cursor: bool,
    /// Adapter can carry HDR (10-bit) swap-chains
    pub hdr: bool,
}

/// Static capability block of the virtual adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterCaps {
    /// Maximum number of monitors that may exist at once
    pub max_monitors: u32,
    /// Diagnostic identity strings
    pub endpoint: EndpointDiagnostics,
    /// Feature flags
    pub features: AdapterFeatures,
}

impl Default for AdapterCaps {
    fn default() -> Self {
        Self {
            max_monitors: 1,
            endpoint: EndpointDiagnostics::default(),
            features: AdapterFeatures::default(),
        }
    }
}

impl AdapterCaps {
    /// Capability block with the given identity strings
    pub fn new(
        friendly_name: impl Into<String>,
        manufacturer: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: EndpointDiagnostics {
                friendly_name: friendly_name.into(),
                manufacturer: manufacturer.into(),
                model: model.into(),
            },
            ..Self::default()
        }
    }

    /// Set the maximum monitor count
    pub fn with_max_monitors(mut self, max: u32) -> Self {
        self.max_monitors = max;
        self
    }

    /// Set the feature flags
    pub fn with_features(mut self, features: AdapterFeatures) -> Self {
        self.features = features;
        self
    }

    /// Reject malformed capability blocks
    pub fn validate(&self) -> Result<()> {
        if self.max_monitors == 0 || self.max_monitors > MAX_SUPPORTED_MONITORS {
            return Err(ViddError::config(format!(
                "max_monitors must be between 1 and {}, got {}",
                MAX_SUPPORTED_MONITORS, self.max_monitors
            )));
        }

        let fields = [
            ("friendly_name", &self.endpoint.friendly_name),
            ("manufacturer", &self.endpoint.manufacturer),
            ("model", &self.endpoint.model),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ViddError::config(format!("Adapter {} must not be empty", name)));
            }
        }

        Ok(())
    }
}

/// Identity fields used to generate a monitor's EDID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorIdentity {
    /// Three-letter PNP manufacturer id
    pub manufacturer_id: String,
    /// Product code
    pub product_code: u16,
    /// Serial number
    pub serial: u32,
    /// Monitor name (at most 13 characters)
    pub name: String,
}

impl Default for MonitorIdentity {
    fn default() -> Self {
        Self {
            manufacturer_id: "MTT".to_string(),
            product_code: 0x1337,
            serial: 0x0000_0001,
            name: "VDD by MTT".to_string(),
        }
    }
}

/// Identity block plus supported modes of one virtual monitor
///
/// Mode order is preference order; the first mode is preferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorDescriptor {
    edid: Vec<u8>,
    modes: Vec<DisplayMode>,
}

impl MonitorDescriptor {
    /// Wrap an EDID blob and mode list without checking them
    ///
    /// Problems surface at monitor arrival through [`MonitorDescriptor::validate`].
    pub fn new(edid: impl Into<Vec<u8>>, modes: impl Into<Vec<DisplayMode>>) -> Self {
        Self {
            edid: edid.into(),
            modes: modes.into(),
        }
    }

    /// Generate the EDID from identity fields and the preferred mode
    pub fn from_identity(identity: &MonitorIdentity, modes: &[DisplayMode]) -> Result<Self> {
        let preferred = modes
            .first()
            .copied()
            .ok_or_else(|| ViddError::config("Monitor mode list is empty"))?;
        for mode in modes {
            mode.validate()?;
        }

        let edid = EdidBuilder::new(preferred)
            .manufacturer_id(&identity.manufacturer_id)
            .product_code(identity.product_code)
            .serial(identity.serial)
            .monitor_name(&identity.name)
            .modes(modes)
            .build()?;

        Ok(Self::new(edid, modes))
    }

    /// EDID bytes
    pub fn edid(&self) -> &[u8] {
        &self.edid
    }

    /// Supported modes, preferred first
    pub fn modes(&self) -> &[DisplayMode] {
        &self.modes
    }

    /// The preferred mode, if any
    pub fn preferred_mode(&self) -> Option<DisplayMode> {
        self.modes.first().copied()
    }

    /// Whether a mode is advertised
    pub fn supports(&self, mode: &DisplayMode) -> bool {
        self.modes.contains(mode)
    }

    /// Reject descriptors the OS could not consume
    pub fn validate(&self) -> Result<()> {
        if self.modes.is_empty() {
            return Err(ViddError::config("Monitor mode list is empty"));
        }

        for (i, mode) in self.modes.iter().enumerate() {
            mode.validate()?;
            if self.modes[..i].contains(mode) {
                return Err(ViddError::config(format!("Mode {} is listed twice", mode)));
            }
        }

        edid::validate(&self.edid)
    }
}

/// Swap-chain processor tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Depth of the queue between the acquire loop and the frame sink (0 disables forwarding)
    pub forward_queue_depth: usize,
    /// Log statistics every N frames (0 disables)
    pub stats_interval: u64,
    /// Stack size of the swap-chain worker thread in bytes (platform default when unset)
    #[serde(default)]
    pub worker_stack_size: Option<usize>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            forward_queue_depth: 2,
            stats_interval: 300,
            worker_stack_size: None,
        }
    }
}

impl ProcessorConfig {
    /// Set the forwarding queue depth
    pub fn with_forward_queue_depth(mut self, depth: usize) -> Self {
        self.forward_queue_depth = depth;
        self
    }

    /// Set the statistics logging interval
    pub fn with_stats_interval(mut self, frames: u64) -> Self {
        self.stats_interval = frames;
        self
    }

    /// Set the worker thread stack size
    pub fn with_worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = Some(bytes);
        self
    }
}
