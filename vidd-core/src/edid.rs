//! EDID identity block generation and inspection
//!
//! The virtual monitor reports a 128-byte EDID 1.4 base block. It is built
//! from static identity configuration and the preferred mode; there is no
//! real panel behind it.

use crate::error::{Result, ViddError};
use crate::types::DisplayMode;

/// Size of an EDID block
pub const EDID_BLOCK_LEN: usize = 128;

const HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];

/// sRGB primaries, pre-encoded
const SRGB_CHROMATICITY: [u8; 10] = [0xEE, 0x91, 0xA3, 0x54, 0x4C, 0x99, 0x26, 0x0F, 0x50, 0x54];

const TAG_SERIAL: u8 = 0xFF;
const TAG_NAME: u8 = 0xFC;
const TAG_RANGE_LIMITS: u8 = 0xFD;

/// Reduced-blanking horizontal timings (pixels)
const RB_H_BLANK: u32 = 160;
const RB_H_FRONT: u32 = 48;
const RB_H_SYNC: u32 = 32;
/// Reduced-blanking vertical timings (lines)
const RB_V_FRONT: u32 = 3;
const RB_V_SYNC: u32 = 6;
const RB_MIN_V_BLANK_US: f64 = 460.0;

/// Assumed panel density used to derive a physical size
const ASSUMED_DPI: f64 = 96.0;

/// Builder for an EDID base block
#[derive(Debug, Clone)]
pub struct EdidBuilder {
    manufacturer_id: String,
    product_code: u16,
    serial: u32,
    serial_text: Option<String>,
    week: u8,
    year: u16,
    monitor_name: String,
    preferred: DisplayMode,
    modes: Vec<DisplayMode>,
}

impl EdidBuilder {
    /// Start a block for the given preferred mode
    pub fn new(preferred: DisplayMode) -> Self {
        Self {
            manufacturer_id: "MTT".to_string(),
            product_code: 0x1337,
            serial: 0,
            serial_text: None,
            week: 1,
            year: 2024,
            monitor_name: "Virtual Display".to_string(),
            preferred,
            modes: vec![preferred],
        }
    }

    /// Three-letter PNP manufacturer id (A-Z)
    pub fn manufacturer_id(mut self, id: impl Into<String>) -> Self {
        self.manufacturer_id = id.into();
        self
    }

    /// Vendor product code
    pub fn product_code(mut self, code: u16) -> Self {
        self.product_code = code;
        self
    }

    /// Numeric serial number
    pub fn serial(mut self, serial: u32) -> Self {
        self.serial = serial;
        self
    }

    /// Serial number string descriptor (at most 13 characters)
    pub fn serial_text(mut self, serial: impl Into<String>) -> Self {
        self.serial_text = Some(serial.into());
        self
    }

    /// Manufacture week and year
    pub fn manufactured(mut self, week: u8, year: u16) -> Self {
        self.week = week;
        self.year = year;
        self
    }

    /// Monitor name descriptor (at most 13 characters)
    pub fn monitor_name(mut self, name: impl Into<String>) -> Self {
        self.monitor_name = name.into();
        self
    }

    /// All advertised modes; used for the range-limits descriptor
    pub fn modes(mut self, modes: &[DisplayMode]) -> Self {
        self.modes = modes.to_vec();
        if !self.modes.contains(&self.preferred) {
            self.modes.push(self.preferred);
        }
        self
    }

    /// Assemble the block
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut edid = vec![0u8; EDID_BLOCK_LEN];
        edid[..8].copy_from_slice(&HEADER);

        let mfg = encode_manufacturer(&self.manufacturer_id)?;
        edid[8..10].copy_from_slice(&mfg.to_be_bytes());
        edid[10..12].copy_from_slice(&self.product_code.to_le_bytes());
        edid[12..16].copy_from_slice(&self.serial.to_le_bytes());

        if !(1990..=2245).contains(&self.year) {
            return Err(ViddError::config(format!(
                "EDID manufacture year {} out of range 1990-2245",
                self.year
            )));
        }
        edid[16] = self.week.min(54);
        edid[17] = (self.year - 1990) as u8;

        // EDID 1.4
        edid[18] = 1;
        edid[19] = 4;
        // Digital input, 8 bits per color, DisplayPort
        edid[20] = 0xA5;

        let (width_mm, height_mm) = physical_size_mm(&self.preferred);
        edid[21] = (width_mm / 10).clamp(1, 255) as u8;
        edid[22] = (height_mm / 10).clamp(1, 255) as u8;
        // Gamma 2.2
        edid[23] = 120;
        // sRGB default, preferred timing is native
        edid[24] = 0x06;
        edid[25..35].copy_from_slice(&SRGB_CHROMATICITY);

        // No established timings, unused standard timings
        for slot in edid[38..54].chunks_mut(2) {
            slot.copy_from_slice(&[0x01, 0x01]);
        }

        let preferred = Timing::reduced_blanking(&self.preferred);
        edid[54..72].copy_from_slice(&preferred.detailed_descriptor(width_mm, height_mm)?);
        edid[72..90].copy_from_slice(&text_descriptor(TAG_NAME, &self.monitor_name)?);
        edid[90..108].copy_from_slice(&self.range_limits());
        let serial = self
            .serial_text
            .clone()
            .unwrap_or_else(|| format!("{:08X}", self.serial));
        edid[108..126].copy_from_slice(&text_descriptor(TAG_SERIAL, &serial)?);

        // No extension blocks
        edid[126] = 0;
        edid[127] = checksum(&edid[..127]);
        Ok(edid)
    }

    fn range_limits(&self) -> [u8; 18] {
        let timings: Vec<Timing> = self.modes.iter().map(Timing::reduced_blanking).collect();

        let min_v = self.modes.iter().map(|m| m.refresh_hz).min().unwrap_or(60);
        let max_v = self.modes.iter().map(|m| m.refresh_hz).max().unwrap_or(60);
        let min_h = timings.iter().map(Timing::h_freq_khz).min().unwrap_or(1);
        let max_h = timings.iter().map(Timing::h_freq_khz).max().unwrap_or(1);
        let max_clock_10mhz = timings
            .iter()
            .map(|t| t.pixel_clock_khz.div_ceil(10_000))
            .max()
            .unwrap_or(1);

        let mut d = [0u8; 18];
        d[3] = TAG_RANGE_LIMITS;
        d[5] = min_v.clamp(1, 255) as u8;
        d[6] = max_v.clamp(1, 255) as u8;
        d[7] = min_h.clamp(1, 255) as u8;
        d[8] = max_h.clamp(1, 255) as u8;
        d[9] = max_clock_10mhz.clamp(1, 255) as u8;
        // Range limits only, no timing formula
        d[10] = 0x01;
        d[11] = 0x0A;
        for b in &mut d[12..] {
            *b = 0x20;
        }
        d
    }
}

/// Detailed timing derived for a mode
#[derive(Debug, Clone, Copy)]
struct Timing {
    mode: DisplayMode,
    h_blank: u32,
    v_blank: u32,
    pixel_clock_khz: u64,
}

impl Timing {
    fn reduced_blanking(mode: &DisplayMode) -> Self {
        let refresh = mode.refresh_hz.max(1) as f64;
        let frame_us = 1_000_000.0 / refresh;
        let line_us = (frame_us - RB_MIN_V_BLANK_US).max(1.0) / mode.height.max(1) as f64;
        let v_blank = ((RB_MIN_V_BLANK_US / line_us).ceil() as u32).max(RB_V_FRONT + RB_V_SYNC + 6);

        // u64 throughout: u32::MAX dimensions must not wrap
        let h_total = mode.width as u64 + RB_H_BLANK as u64;
        let v_total = mode.height as u64 + v_blank as u64;
        let clock_hz = h_total
            .saturating_mul(v_total)
            .saturating_mul(mode.refresh_hz.max(1) as u64);

        Self {
            mode: *mode,
            h_blank: RB_H_BLANK,
            v_blank,
            pixel_clock_khz: clock_hz.div_ceil(1000),
        }
    }

    fn h_freq_khz(&self) -> u64 {
        let h_total = self.mode.width as u64 + self.h_blank as u64;
        self.pixel_clock_khz / h_total
    }

    fn detailed_descriptor(&self, width_mm: u32, height_mm: u32) -> Result<[u8; 18]> {
        let clock_10khz = self.pixel_clock_khz.div_ceil(10);
        if clock_10khz > u16::MAX as u64 {
            return Err(ViddError::config(format!(
                "Preferred mode {} needs a {} MHz pixel clock, beyond the EDID detailed timing range",
                self.mode,
                self.pixel_clock_khz / 1000
            )));
        }
        let (ha, hb) = (self.mode.width, self.h_blank);
        let (va, vb) = (self.mode.height, self.v_blank);
        if ha > 0xFFF || va > 0xFFF || vb > 0xFFF {
            return Err(ViddError::config(format!(
                "Mode {} does not fit a detailed timing descriptor",
                self.mode
            )));
        }

        let mut d = [0u8; 18];
        d[0..2].copy_from_slice(&(clock_10khz as u16).to_le_bytes());
        d[2] = (ha & 0xFF) as u8;
        d[3] = (hb & 0xFF) as u8;
        d[4] = (((ha >> 8) & 0x0F) << 4 | ((hb >> 8) & 0x0F)) as u8;
        d[5] = (va & 0xFF) as u8;
        d[6] = (vb & 0xFF) as u8;
        d[7] = (((va >> 8) & 0x0F) << 4 | ((vb >> 8) & 0x0F)) as u8;
        d[8] = (RB_H_FRONT & 0xFF) as u8;
        d[9] = (RB_H_SYNC & 0xFF) as u8;
        d[10] = (((RB_V_FRONT & 0x0F) << 4) | (RB_V_SYNC & 0x0F)) as u8;
        d[11] = (((RB_H_FRONT >> 8) & 0x03) << 6
            | ((RB_H_SYNC >> 8) & 0x03) << 4
            | ((RB_V_FRONT >> 4) & 0x03) << 2
            | ((RB_V_SYNC >> 4) & 0x03)) as u8;
        let (wmm, hmm) = (width_mm.min(0xFFF), height_mm.min(0xFFF));
        d[12] = (wmm & 0xFF) as u8;
        d[13] = (hmm & 0xFF) as u8;
        d[14] = (((wmm >> 8) & 0x0F) << 4 | ((hmm >> 8) & 0x0F)) as u8;
        // Digital separate sync, hsync+, vsync-
        d[17] = 0x1A;
        Ok(d)
    }
}

/// Decoded identity of an EDID block
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EdidIdentity {
    pub manufacturer_id: String,
    pub product_code: u16,
    pub serial: u32,
    pub monitor_name: Option<String>,
    /// Active area of the first detailed timing
    pub preferred_resolution: Option<(u32, u32)>,
}

/// Validate an EDID blob: length, header and base-block checksum
pub fn validate(edid: &[u8]) -> Result<()> {
    if edid.len() < EDID_BLOCK_LEN || edid.len() % EDID_BLOCK_LEN != 0 {
        return Err(ViddError::config(format!(
            "EDID must be a non-empty multiple of {} bytes, got {}",
            EDID_BLOCK_LEN,
            edid.len()
        )));
    }
    if edid[..8] != HEADER {
        return Err(ViddError::config("EDID header is invalid"));
    }
    let sum = edid[..EDID_BLOCK_LEN]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != 0 {
        return Err(ViddError::config("EDID base block checksum mismatch"));
    }
    let extensions = edid[126] as usize;
    if edid.len() != EDID_BLOCK_LEN * (1 + extensions) {
        return Err(ViddError::config(format!(
            "EDID declares {} extension block(s) but carries {}",
            extensions,
            edid.len() / EDID_BLOCK_LEN - 1
        )));
    }
    Ok(())
}

/// Decode the identity fields of a validated EDID
pub fn identity(edid: &[u8]) -> Result<EdidIdentity> {
    validate(edid)?;
    let mfg = u16::from_be_bytes([edid[8], edid[9]]);
    let manufacturer_id = (0..3)
        .rev()
        .map(|i| (((mfg >> (i * 5)) & 0x1F) as u8 + b'@') as char)
        .collect();

    let mut monitor_name = None;
    let mut preferred_resolution = None;
    for d in edid[54..126].chunks(18) {
        if d[0] != 0 || d[1] != 0 {
            if preferred_resolution.is_none() {
                let w = d[2] as u32 | ((d[4] as u32 >> 4) << 8);
                let h = d[5] as u32 | ((d[7] as u32 >> 4) << 8);
                preferred_resolution = Some((w, h));
            }
        } else if d[3] == TAG_NAME {
            monitor_name = Some(decode_text(&d[5..18]));
        }
    }

    Ok(EdidIdentity {
        manufacturer_id,
        product_code: u16::from_le_bytes([edid[10], edid[11]]),
        serial: u32::from_le_bytes([edid[12], edid[13], edid[14], edid[15]]),
        monitor_name,
        preferred_resolution,
    })
}

fn encode_manufacturer(id: &str) -> Result<u16> {
    let bytes = id.as_bytes();
    if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_uppercase) {
        return Err(ViddError::config(format!(
            "EDID manufacturer id must be three uppercase letters, got '{}'",
            id
        )));
    }
    Ok(bytes
        .iter()
        .fold(0u16, |acc, c| (acc << 5) | (c - b'@') as u16))
}

fn text_descriptor(tag: u8, text: &str) -> Result<[u8; 18]> {
    if !text.is_ascii() || text.len() > 13 {
        return Err(ViddError::config(format!(
            "EDID text '{}' must be ASCII and at most 13 characters",
            text
        )));
    }
    let mut d = [0u8; 18];
    d[3] = tag;
    let body = &mut d[5..18];
    body.fill(0x20);
    body[..text.len()].copy_from_slice(text.as_bytes());
    if text.len() < 13 {
        body[text.len()] = 0x0A;
    }
    Ok(d)
}

fn decode_text(body: &[u8]) -> String {
    body.iter()
        .take_while(|b| **b != 0x0A)
        .map(|b| *b as char)
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn physical_size_mm(mode: &DisplayMode) -> (u32, u32) {
    let to_mm = |px: u32| (px as f64 * 25.4 / ASSUMED_DPI).round() as u32;
    (to_mm(mode.width), to_mm(mode.height))
}

fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0u8.wrapping_sub(sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        EdidBuilder::new(DisplayMode::new(1920, 1080, 60))
            .manufacturer_id("GSM")
            .product_code(0x5B7F)
            .serial(0x0001_E240)
            .monitor_name("GPU-SIM VDD")
            .build()
            .unwrap()
    }

    #[test]
    fn test_block_is_valid() {
        let edid = sample();
        assert_eq!(edid.len(), EDID_BLOCK_LEN);
        assert!(validate(&edid).is_ok());
    }

    #[test]
    fn test_identity_round_trip() {
        let id = identity(&sample()).unwrap();
        assert_eq!(id.manufacturer_id, "GSM");
        assert_eq!(id.product_code, 0x5B7F);
        assert_eq!(id.serial, 0x0001_E240);
        assert_eq!(id.monitor_name.as_deref(), Some("GPU-SIM VDD"));
        assert_eq!(id.preferred_resolution, Some((1920, 1080)));
    }

    #[test]
    fn test_corrupted_checksum_rejected() {
        let mut edid = sample();
        edid[20] ^= 0x01;
        assert!(validate(&edid).is_err());
    }

    #[test]
    fn test_truncated_rejected() {
        let edid = sample();
        assert!(validate(&edid[..100]).is_err());
        assert!(validate(&[]).is_err());
    }

    #[test]
    fn test_bad_manufacturer_rejected() {
        let result = EdidBuilder::new(DisplayMode::new(1920, 1080, 60))
            .manufacturer_id("gs1")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_long_name_rejected() {
        let result = EdidBuilder::new(DisplayMode::new(1920, 1080, 60))
            .monitor_name("A name that is far too long")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_4k_preferred_fits() {
        let edid = EdidBuilder::new(DisplayMode::new(3840, 2160, 60))
            .modes(&[DisplayMode::new(1920, 1080, 60), DisplayMode::new(3840, 2160, 60)])
            .build()
            .unwrap();
        assert_eq!(identity(&edid).unwrap().preferred_resolution, Some((3840, 2160)));
    }

    #[test]
    fn test_extreme_modes_error_instead_of_wrapping() {
        let huge = DisplayMode::new(u32::MAX, u32::MAX, u32::MAX);

        // Only listed: the range descriptor clamps
        let edid = EdidBuilder::new(DisplayMode::new(1920, 1080, 60))
            .modes(&[DisplayMode::new(1920, 1080, 60), huge])
            .build()
            .unwrap();
        assert!(validate(&edid).is_ok());

        // Preferred: no detailed timing can describe it
        let err = EdidBuilder::new(huge).build().unwrap_err();
        assert!(err.is_configuration());
    }
}
