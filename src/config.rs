//! Canvas options and their validated form
//!
//! [`CanvasOptions`] is the loose, serde-facing surface (TOML or JSON props).
//! [`CanvasOptions::validate`] turns it into a [`CanvasConfig`] with typed
//! fields and a tagged [`GfxMode`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::canvas::caps::{ColorDepth, RasterProtocol};
use crate::canvas::color::Color;
use crate::canvas::dither::DitherAlgorithm;
use crate::canvas::image::ObjectFit;
use crate::canvas::shader::DEFAULT_SHADER_FPS;
use crate::errors::{CanvasError, Result};

/// Character-cell encoding used by [`GfxMode::Character`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterStyle {
    /// 2x3 Unicode sextant blocks, two colors per cell
    #[default]
    Sextant,
    /// One averaged color per cell
    Block,
    /// ASCII glyph chosen by the 2x3 on/off pattern
    Pattern,
    /// ASCII glyph chosen by mean brightness
    Luma,
}

/// How the canvas reaches the terminal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GfxMode {
    Character {
        style: CharacterStyle,
        /// Width/height of one terminal cell
        char_aspect_ratio: f64,
    },
    Raster {
        protocol: RasterProtocol,
    },
}

impl Default for GfxMode {
    fn default() -> Self {
        GfxMode::Character {
            style: CharacterStyle::Sextant,
            char_aspect_ratio: DEFAULT_CHAR_ASPECT_RATIO,
        }
    }
}

impl GfxMode {
    /// Parse a `gfx_mode` name
    pub fn from_name(name: &str, char_aspect_ratio: f64) -> Option<Self> {
        let character = |style| GfxMode::Character {
            style,
            char_aspect_ratio,
        };
        let mode = match name.trim().to_ascii_lowercase().as_str() {
            "sextant" => character(CharacterStyle::Sextant),
            "block" => character(CharacterStyle::Block),
            "ascii" | "pattern" | "ascii-pattern" => character(CharacterStyle::Pattern),
            "luma" | "ascii-luma" => character(CharacterStyle::Luma),
            "sixel" => GfxMode::Raster {
                protocol: RasterProtocol::Sixel,
            },
            "kitty" => GfxMode::Raster {
                protocol: RasterProtocol::Kitty,
            },
            "iterm2" | "iterm" => GfxMode::Raster {
                protocol: RasterProtocol::ITerm2,
            },
            _ => return None,
        };
        Some(mode)
    }

    pub fn is_raster(&self) -> bool {
        matches!(self, GfxMode::Raster { .. })
    }

    /// Width/height of one buffer pixel as displayed
    ///
    /// A sextant sub-cell is half a cell wide and a third of a cell tall.
    pub fn pixel_aspect_ratio(&self) -> f64 {
        match self {
            GfxMode::Character {
                char_aspect_ratio, ..
            } => (0.5 / (1.0 / 3.0)) * char_aspect_ratio,
            GfxMode::Raster { .. } => 1.0,
        }
    }
}

/// Dithering choice after validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DitherSetting {
    /// Pick from the terminal's color depth and the content kind
    #[default]
    Auto,
    None,
    Algorithm(DitherAlgorithm),
}

impl DitherSetting {
    /// Algorithm and bit depth to apply, or `None` to skip dithering
    ///
    /// `dynamic` marks animated content, which gets a frame-stable algorithm.
    pub fn resolve(
        self,
        bits: Option<u8>,
        depth: ColorDepth,
        raster: bool,
        dynamic: bool,
    ) -> Option<(DitherAlgorithm, u8)> {
        match self {
            DitherSetting::None => None,
            DitherSetting::Algorithm(algorithm) => Some((algorithm, bits.unwrap_or(default_bits(depth)))),
            DitherSetting::Auto => {
                let algorithm = if dynamic {
                    DitherAlgorithm::BlueNoise
                } else {
                    DitherAlgorithm::FloydSteinberg
                };
                let auto_bits = match depth {
                    ColorDepth::TrueColor if raster && dynamic => 6,
                    ColorDepth::TrueColor => return None,
                    ColorDepth::Color256 => 3,
                    ColorDepth::Color16 | ColorDepth::Mono => 1,
                };
                Some((algorithm, bits.unwrap_or(auto_bits)))
            }
        }
    }
}

fn default_bits(depth: ColorDepth) -> u8 {
    match depth {
        ColorDepth::TrueColor => 4,
        ColorDepth::Color256 => 3,
        ColorDepth::Color16 | ColorDepth::Mono => 1,
    }
}

/// `dither` accepts a boolean or a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DitherOption {
    Enabled(bool),
    Named(String),
}

impl Default for DitherOption {
    fn default() -> Self {
        DitherOption::Named("auto".to_string())
    }
}

impl DitherOption {
    fn to_setting(&self) -> Result<DitherSetting> {
        match self {
            DitherOption::Enabled(true) => Ok(DitherSetting::Auto),
            DitherOption::Enabled(false) => Ok(DitherSetting::None),
            DitherOption::Named(name) => match name.trim().to_ascii_lowercase().as_str() {
                "auto" => Ok(DitherSetting::Auto),
                "none" | "off" => Ok(DitherSetting::None),
                other => DitherAlgorithm::from_name(other)
                    .map(DitherSetting::Algorithm)
                    .ok_or_else(|| CanvasError::invalid("dither", format!("unknown algorithm '{name}'"))),
            },
        }
    }
}

pub const DEFAULT_WIDTH: i64 = 40;
pub const DEFAULT_HEIGHT: i64 = 12;
pub const DEFAULT_CHAR_ASPECT_RATIO: f64 = 0.5;

fn default_width() -> i64 {
    DEFAULT_WIDTH
}

fn default_height() -> i64 {
    DEFAULT_HEIGHT
}

fn default_scale() -> i64 {
    1
}

fn default_background() -> String {
    "#000000".to_string()
}

fn default_char_aspect_ratio() -> f64 {
    DEFAULT_CHAR_ASPECT_RATIO
}

fn default_gfx_mode() -> String {
    "sextant".to_string()
}

fn default_shader_fps() -> i64 {
    i64::from(DEFAULT_SHADER_FPS)
}

/// Canvas options as written by a host
///
/// Field names are snake_case; camelCase aliases are accepted for hosts that
/// pass component props straight through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasOptions {
    /// Width in terminal columns
    #[serde(default = "default_width")]
    pub width: i64,

    /// Height in terminal rows
    #[serde(default = "default_height")]
    pub height: i64,

    /// Buffer pixels per sub-cell edge (character modes)
    #[serde(default = "default_scale")]
    pub scale: i64,

    #[serde(default = "default_background", alias = "backgroundColor")]
    pub background_color: String,

    #[serde(default = "default_char_aspect_ratio", alias = "charAspectRatio")]
    pub char_aspect_ratio: f64,

    #[serde(default, alias = "objectFit")]
    pub object_fit: ObjectFit,

    #[serde(default)]
    pub dither: DitherOption,

    #[serde(default, alias = "ditherBits")]
    pub dither_bits: Option<i64>,

    #[serde(default = "default_gfx_mode", alias = "gfxMode")]
    pub gfx_mode: String,

    /// Image path or `data:` URL
    #[serde(default)]
    pub src: Option<String>,

    #[serde(default = "default_shader_fps", alias = "shaderFps")]
    pub shader_fps: i64,

    /// Seconds the shader runs before its last frame is frozen
    #[serde(default, alias = "shaderRunTime")]
    pub shader_run_time: Option<f64>,
}

impl Default for CanvasOptions {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            scale: default_scale(),
            background_color: default_background(),
            char_aspect_ratio: default_char_aspect_ratio(),
            object_fit: ObjectFit::default(),
            dither: DitherOption::default(),
            dither_bits: None,
            gfx_mode: default_gfx_mode(),
            src: None,
            shader_fps: default_shader_fps(),
            shader_run_time: None,
        }
    }
}

fn positive_u16(field: &'static str, value: i64) -> Result<u16> {
    if value <= 0 {
        return Err(CanvasError::invalid(field, format!("must be greater than zero, got {value}")));
    }
    u16::try_from(value).map_err(|_| CanvasError::invalid(field, format!("{value} is too large")))
}

impl CanvasOptions {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Check every field and build the typed configuration
    pub fn validate(&self) -> Result<CanvasConfig> {
        let cols = positive_u16("width", self.width)?;
        let rows = positive_u16("height", self.height)?;
        let scale = u32::from(positive_u16("scale", self.scale)?);

        if !self.char_aspect_ratio.is_finite() || self.char_aspect_ratio <= 0.0 {
            return Err(CanvasError::invalid(
                "char_aspect_ratio",
                format!("must be a positive number, got {}", self.char_aspect_ratio),
            ));
        }

        let background = Color::parse(&self.background_color)?;

        let dither = self.dither.to_setting()?;
        let dither_bits = match self.dither_bits {
            None => None,
            Some(bits @ 1..=8) => Some(bits as u8),
            Some(bits) => {
                return Err(CanvasError::invalid("dither_bits", format!("must be 1-8, got {bits}")));
            }
        };

        let mode = GfxMode::from_name(&self.gfx_mode, self.char_aspect_ratio)
            .ok_or_else(|| CanvasError::invalid("gfx_mode", format!("unknown mode '{}'", self.gfx_mode)))?;

        let shader_fps = u32::from(positive_u16("shader_fps", self.shader_fps)?);

        let shader_run_time = match self.shader_run_time {
            None => None,
            Some(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
            Some(secs) => {
                return Err(CanvasError::invalid(
                    "shader_run_time",
                    format!("must be a positive number of seconds, got {secs}"),
                ));
            }
        };

        Ok(CanvasConfig {
            cols,
            rows,
            scale,
            background,
            object_fit: self.object_fit,
            dither,
            dither_bits,
            mode,
            src: self.src.clone().filter(|s| !s.trim().is_empty()),
            shader_fps,
            shader_run_time,
        })
    }
}

/// Validated canvas configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasConfig {
    pub cols: u16,
    pub rows: u16,
    pub scale: u32,
    pub background: Color,
    pub object_fit: ObjectFit,
    pub dither: DitherSetting,
    pub dither_bits: Option<u8>,
    pub mode: GfxMode,
    pub src: Option<String>,
    pub shader_fps: u32,
    pub shader_run_time: Option<Duration>,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            cols: DEFAULT_WIDTH as u16,
            rows: DEFAULT_HEIGHT as u16,
            scale: 1,
            background: Color::BLACK,
            object_fit: ObjectFit::default(),
            dither: DitherSetting::Auto,
            dither_bits: None,
            mode: GfxMode::default(),
            src: None,
            shader_fps: DEFAULT_SHADER_FPS,
            shader_run_time: None,
        }
    }
}

impl CanvasConfig {
    pub fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    pub fn with_mode(mut self, mode: GfxMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_dither(mut self, dither: DitherSetting, bits: Option<u8>) -> Self {
        self.dither = dither;
        self.dither_bits = bits;
        self
    }

    pub fn with_fit(mut self, fit: ObjectFit) -> Self {
        self.object_fit = fit;
        self
    }

    pub fn with_shader_timing(mut self, fps: u32, run_time: Option<Duration>) -> Self {
        self.shader_fps = fps.max(1);
        self.shader_run_time = run_time;
        self
    }
}
