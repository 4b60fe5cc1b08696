//! Terminal capability record
//!
//! The hosting engine fills one [`ProtocolCaps`] per raster protocol after
//! querying the terminal. [`TerminalCaps::from_env`] is a best-effort guess
//! from environment variables for hosts that have no query support:
//! - graphics protocol support (Kitty, Sixel, iTerm2)
//! - color depth (TrueColor, 256, 16)
//! - cell dimensions

use std::env;

use serde::{Deserialize, Serialize};

/// Raster graphics protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterProtocol {
    /// Sixel graphics - DEC standard, widely supported
    Sixel,
    /// Kitty Graphics Protocol
    Kitty,
    /// iTerm2 inline images
    #[serde(rename = "iterm2")]
    ITerm2,
}

impl RasterProtocol {
    pub fn name(self) -> &'static str {
        match self {
            RasterProtocol::Sixel => "sixel",
            RasterProtocol::Kitty => "kitty",
            RasterProtocol::ITerm2 => "iterm2",
        }
    }
}

/// Color depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorDepth {
    /// 24-bit RGB (16 million colors)
    #[default]
    TrueColor,
    /// 256 color palette
    Color256,
    /// 16 ANSI colors
    Color16,
    /// Monochrome
    Mono,
}

/// Support for one raster protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolCaps {
    pub supported: bool,
    /// Pixels per cell (width)
    pub cell_width: u32,
    /// Pixels per cell (height)
    pub cell_height: u32,
}

impl ProtocolCaps {
    pub fn supported(cell_width: u32, cell_height: u32) -> Self {
        Self {
            supported: true,
            cell_width,
            cell_height,
        }
    }

    /// Supported with a known, non-zero cell size
    pub fn usable(&self) -> bool {
        self.supported && self.cell_width > 0 && self.cell_height > 0
    }
}

/// Terminal capabilities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalCaps {
    /// Terminal columns
    pub cols: u16,
    /// Terminal rows
    pub rows: u16,
    pub sixel: ProtocolCaps,
    pub kitty: ProtocolCaps,
    pub iterm2: ProtocolCaps,
    /// Color depth
    pub colors: ColorDepth,
    /// Terminal name/type
    pub term_name: String,
}

impl Default for TerminalCaps {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            sixel: ProtocolCaps::default(),
            kitty: ProtocolCaps::default(),
            iterm2: ProtocolCaps::default(),
            colors: ColorDepth::TrueColor,
            term_name: String::new(),
        }
    }
}

impl TerminalCaps {
    /// Guess capabilities from the environment
    pub fn from_env() -> Self {
        let (cols, rows) = crossterm::terminal::size().unwrap_or((80, 24));
        let term_name = env::var("TERM").unwrap_or_default();
        let (cell_width, cell_height) = estimate_cell_size(&term_name);

        let mut caps = Self {
            cols,
            rows,
            colors: detect_color_depth(),
            term_name,
            ..Self::default()
        };
        for protocol in detect_protocols() {
            caps.set_protocol(protocol, ProtocolCaps::supported(cell_width, cell_height));
        }
        caps
    }

    pub fn protocol(&self, protocol: RasterProtocol) -> ProtocolCaps {
        match protocol {
            RasterProtocol::Sixel => self.sixel,
            RasterProtocol::Kitty => self.kitty,
            RasterProtocol::ITerm2 => self.iterm2,
        }
    }

    pub fn set_protocol(&mut self, protocol: RasterProtocol, caps: ProtocolCaps) {
        match protocol {
            RasterProtocol::Sixel => self.sixel = caps,
            RasterProtocol::Kitty => self.kitty = caps,
            RasterProtocol::ITerm2 => self.iterm2 = caps,
        }
    }

    /// Builder form of [`set_protocol`](Self::set_protocol)
    pub fn with_protocol(mut self, protocol: RasterProtocol, caps: ProtocolCaps) -> Self {
        self.set_protocol(protocol, caps);
        self
    }

    pub fn with_colors(mut self, colors: ColorDepth) -> Self {
        self.colors = colors;
        self
    }

    /// Best usable raster protocol: Kitty, then iTerm2, then Sixel
    pub fn best_protocol(&self) -> Option<RasterProtocol> {
        [RasterProtocol::Kitty, RasterProtocol::ITerm2, RasterProtocol::Sixel]
            .into_iter()
            .find(|p| self.protocol(*p).usable())
    }
}

fn estimate_cell_size(term: &str) -> (u32, u32) {
    // Common terminal cell sizes
    match term {
        t if t.contains("kitty") => (10, 20),
        t if t.contains("alacritty") || t.contains("wezterm") => (9, 18),
        _ => (8, 16),
    }
}

/// Protocols hinted at by environment variables
fn detect_protocols() -> Vec<RasterProtocol> {
    let mut found = Vec::new();
    let term = env::var("TERM").unwrap_or_default();
    let program = env::var("TERM_PROGRAM").unwrap_or_default();

    if env::var("KITTY_WINDOW_ID").is_ok()
        || env::var("WEZTERM_PANE").is_ok()
        || term.contains("kitty")
        || matches!(program.as_str(), "WezTerm" | "ghostty" | "Ghostty")
    {
        found.push(RasterProtocol::Kitty);
    }
    if env::var("ITERM_SESSION_ID").is_ok() || matches!(program.as_str(), "iTerm.app" | "WezTerm") {
        found.push(RasterProtocol::ITerm2);
    }
    if term.contains("foot") || term.contains("mlterm") || term.contains("sixel") || program == "WezTerm" {
        found.push(RasterProtocol::Sixel);
    }
    found
}

/// Detect color depth
fn detect_color_depth() -> ColorDepth {
    if let Ok(ct) = env::var("COLORTERM") {
        if ct == "truecolor" || ct == "24bit" {
            return ColorDepth::TrueColor;
        }
    }

    if let Ok(term) = env::var("TERM") {
        if term.contains("24bit") || term.contains("truecolor") || term.contains("direct") {
            return ColorDepth::TrueColor;
        }
        if term.contains("256color") {
            return ColorDepth::Color256;
        }
        if term == "dumb" {
            return ColorDepth::Mono;
        }
        if term.contains("color") || term.starts_with("xterm") || term.starts_with("linux") {
            return ColorDepth::Color16;
        }
    }

    // Most modern terminals support truecolor
    ColorDepth::TrueColor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_caps() {
        let caps = TerminalCaps::default();
        assert_eq!(caps.cols, 80);
        assert_eq!(caps.rows, 24);
        assert_eq!(caps.best_protocol(), None);
    }

    #[test]
    fn test_protocol_usable_needs_cell_size() {
        assert!(!ProtocolCaps::default().usable());
        assert!(!ProtocolCaps {
            supported: true,
            cell_width: 0,
            cell_height: 16
        }
        .usable());
        assert!(ProtocolCaps::supported(8, 16).usable());
    }

    #[test]
    fn test_best_protocol_order() {
        let caps = TerminalCaps::default()
            .with_protocol(RasterProtocol::Sixel, ProtocolCaps::supported(8, 16))
            .with_protocol(RasterProtocol::ITerm2, ProtocolCaps::supported(8, 16));
        assert_eq!(caps.best_protocol(), Some(RasterProtocol::ITerm2));
        assert_eq!(caps.protocol(RasterProtocol::Kitty), ProtocolCaps::default());
    }

    #[test]
    fn test_cell_size_estimates() {
        assert_eq!(estimate_cell_size("xterm-kitty"), (10, 20));
        assert_eq!(estimate_cell_size("alacritty"), (9, 18));
        assert_eq!(estimate_cell_size("vt100"), (8, 16));
    }

    #[test]
    fn test_protocol_serde_names() {
        let p: RasterProtocol = serde_json::from_str("\"iterm2\"").unwrap();
        assert_eq!(p, RasterProtocol::ITerm2);
        assert_eq!(RasterProtocol::Kitty.name(), "kitty");
    }
}
