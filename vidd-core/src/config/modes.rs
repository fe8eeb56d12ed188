//! Mode list loading
//!
//! Plain-text mode lists, as dropped next to the installed driver:
//!
//! ```text
//! 1
//! # Number of virtual displays (first line)
//! # Format: width, height, refresh_rate
//! 1920, 1080, 60
//! 1280, 720, 60
//! ```

use crate::error::{Result, ViddError};
use crate::types::DisplayMode;

/// Modes advertised when nothing is configured
pub fn default_modes() -> Vec<DisplayMode> {
    vec![
        DisplayMode::new(1920, 1080, 60),
        DisplayMode::new(1280, 720, 60),
        DisplayMode::new(2560, 1440, 60),
        DisplayMode::new(3840, 2160, 60),
    ]
}

/// Parsed mode list file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeList {
    /// Number of virtual displays requested
    pub display_count: u32,
    /// Modes in preference order
    pub modes: Vec<DisplayMode>,
}

/// Parse a mode list
///
/// The first non-comment line is the display count; every following
/// non-comment line is `width, height, refresh`.
pub fn parse_mode_list(text: &str) -> Result<ModeList> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(n, line)| (n + 1, strip_comment(line)))
        .filter(|(_, line)| !line.is_empty());

    let (count_line, count) = lines
        .next()
        .ok_or_else(|| ViddError::config("Mode list is empty"))?;
    let display_count: u32 = count.parse().map_err(|_| {
        ViddError::config(format!(
            "Line {}: expected display count, got '{}'",
            count_line, count
        ))
    })?;

    let mut modes = Vec::new();
    for (n, line) in lines {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [w, h, r] = fields.as_slice() else {
            return Err(ViddError::config(format!(
                "Line {}: expected 'width, height, refresh', got '{}'",
                n, line
            )));
        };
        let parse = |v: &str| {
            v.parse::<u32>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| ViddError::config(format!("Line {}: invalid number '{}'", n, v)))
        };
        let mode = DisplayMode::new(parse(*w)?, parse(*h)?, parse(*r)?);
        mode.validate()
            .map_err(|e| ViddError::config(format!("Line {}: {}", n, e)))?;
        if modes.contains(&mode) {
            return Err(ViddError::config(format!("Line {}: mode {} is listed twice", n, mode)));
        }
        modes.push(mode);
    }

    if modes.is_empty() {
        return Err(ViddError::config("Mode list contains no modes"));
    }

    Ok(ModeList {
        display_count,
        modes,
    })
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => line[..idx].trim(),
        None => line.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTALLER_OPTIONS: &str = "1
# GPU-SIM Virtual Display Configuration
# Number of virtual displays (first line)
# Format: width, height, refresh_rate
1920, 1080, 60
1280, 720, 60
2560, 1440, 60
3840, 2160, 60
";

    #[test]
    fn test_parse_installer_file() {
        let list = parse_mode_list(INSTALLER_OPTIONS).unwrap();
        assert_eq!(list.display_count, 1);
        assert_eq!(list.modes, default_modes());
    }

    #[test]
    fn test_order_preserved() {
        let list = parse_mode_list("1\n1280,720,60\n1920,1080,144 # fast\n").unwrap();
        assert_eq!(
            list.modes,
            vec![DisplayMode::new(1280, 720, 60), DisplayMode::new(1920, 1080, 144)]
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = parse_mode_list("1\n1920,1080,60\n1920, 1080, 60\n").unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(parse_mode_list("").is_err());
        assert!(parse_mode_list("one\n1920,1080,60").is_err());
        assert!(parse_mode_list("1\n1920x1080").is_err());
        assert!(parse_mode_list("1\n1920,0,60").is_err());
        assert!(parse_mode_list("1\n").is_err());
    }

    #[test]
    fn test_oversized_mode_rejected() {
        let err = parse_mode_list("1\n1920, 1080, 60\n4294967295, 1080, 60\n").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Line 3"));
    }
}
