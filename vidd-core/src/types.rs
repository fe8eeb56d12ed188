//! Core types for vidd
//!
//! Value types shared by the adapter, monitors, swap-chain processors and
//! the mode/EDID store.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, ViddError};

/// Global handle counter for unique object IDs
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle identifying a driver object (swap-chain, processor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle(u64);

impl Handle {
    /// Create a new unique handle
    pub fn new() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

/// OS device handle passed at adapter initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceHandle(pub u64);

/// Connector index of a virtual monitor on its adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectorIndex(pub u32);

impl std::fmt::Display for ConnectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayMode {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Vertical refresh rate in Hz
    pub refresh_hz: u32,
}

impl DisplayMode {
    /// Create a new mode
    pub const fn new(width: u32, height: u32, refresh_hz: u32) -> Self {
        Self {
            width,
            height,
            refresh_hz,
        }
    }

    /// Pixels per frame
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Time between vsyncs
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.refresh_hz.max(1) as f64)
    }

    /// Reject zero or out-of-range dimensions and refresh rates
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.refresh_hz == 0 {
            return Err(ViddError::config(format!("Mode {} has a zero dimension", self)));
        }
        if self.width > MAX_MODE_DIMENSION || self.height > MAX_MODE_DIMENSION {
            return Err(ViddError::config(format!(
                "Mode {} exceeds the {} pixel limit",
                self, MAX_MODE_DIMENSION
            )));
        }
        if self.refresh_hz > MAX_REFRESH_HZ {
            return Err(ViddError::config(format!(
                "Mode {} exceeds the {} Hz refresh limit",
                self, MAX_REFRESH_HZ
            )));
        }
        Ok(())
    }
}

/// Largest width or height a mode may advertise
pub const MAX_MODE_DIMENSION: u32 = 16384;

/// Highest refresh rate a mode may advertise
pub const MAX_REFRESH_HZ: u32 = 1000;

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.refresh_hz)
    }
}

impl std::str::FromStr for DisplayMode {
    type Err = String;

    /// Parse `WIDTHxHEIGHT@HZ` (refresh defaults to 60 when omitted)
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let (res, hz) = match s.split_once('@') {
            Some((res, hz)) => (res, hz.trim()),
            None => (s.as_str(), "60"),
        };
        let (w, h) = res
            .split_once('x')
            .ok_or_else(|| format!("Invalid mode '{}': expected WIDTHxHEIGHT@HZ", s))?;
        let parse = |v: &str, what: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| format!("Invalid {} in mode '{}'", what, s))
        };
        let mode = Self::new(parse(w, "width")?, parse(h, "height")?, parse(hz, "refresh rate")?);
        mode.validate().map_err(|e| e.to_string())?;
        Ok(mode)
    }
}

/// Pixel layout of swap-chain buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit BGRA (DXGI_FORMAT_B8G8R8A8_UNORM)
    #[default]
    Bgra8,
    /// 10-bit RGB with 2-bit alpha (DXGI_FORMAT_R10G10B10A2_UNORM)
    Rgb10A2,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> u32 {
        4
    }
}

/// One BGRA8 pixel
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Bgra8 {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}

impl Bgra8 {
    /// Opaque pixel from RGB components
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { b, g, r, a: 0xFF }
    }
}

/// Rectangle in desktop coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// Rectangle covering a whole mode
    pub fn full(mode: &DisplayMode) -> Self {
        Self {
            left: 0,
            top: 0,
            right: mode.width as i32,
            bottom: mode.height as i32,
        }
    }

    /// Area in pixels (zero for degenerate rectangles)
    pub fn area(&self) -> u64 {
        let w = (self.right as i64 - self.left as i64).max(0) as u64;
        let h = (self.bottom as i64 - self.top as i64).max(0) as u64;
        w * h
    }
}

/// Frame format information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFormat {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub pixel_format: PixelFormat,
    /// Stride in bytes
    pub stride: u32,
}

impl FrameFormat {
    /// Tightly packed format for a mode
    pub fn for_mode(mode: &DisplayMode, pixel_format: PixelFormat) -> Result<Self> {
        let stride = mode
            .width
            .checked_mul(pixel_format.bytes_per_pixel())
            .ok_or_else(|| ViddError::config(format!("Row stride of mode {} overflows", mode)))?;
        Ok(Self {
            width: mode.width,
            height: mode.height,
            pixel_format,
            stride,
        })
    }

    /// Size of one frame in bytes
    pub fn frame_size(&self) -> usize {
        self.stride as usize * self.height as usize
    }
}

/// Metadata the compositor attaches to each presented frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Monotonic present counter assigned by the compositor
    pub present_id: u64,
    /// Presentation timestamp in nanoseconds
    pub pts: u64,
    /// Buffer format
    pub format: FrameFormat,
    /// Regions that changed since the previous frame
    pub dirty_rects: Vec<Rect>,
}

impl FrameMetadata {
    /// Total changed area across all dirty rectangles
    pub fn dirty_area(&self) -> u64 {
        self.dirty_rects.iter().map(Rect::area).sum()
    }
}

/// A buffer handed to the driver by an acquire call
///
/// Must be handed back with exactly one release on the swap-chain it came from.
#[derive(Debug, Clone)]
pub struct AcquiredFrame {
    /// Frame metadata
    pub metadata: FrameMetadata,
    /// CPU-visible pixel payload, when the compositor exposes one
    pub pixels: Option<Arc<[u8]>>,
}

impl AcquiredFrame {
    /// Present counter of this frame
    pub fn present_id(&self) -> u64 {
        self.metadata.present_id
    }
}
