//! Decoded images, fit/scale math and the image-layer compositor

use std::path::PathBuf;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::color::{pack_rgba, Color, TRANSPARENT};
use super::shader::{Resolution, ShaderFn, ShaderSource, ShaderUtils};
use crate::errors::{CanvasError, Result};

/// Pixels with alpha below this are dropped instead of blended
pub const MIN_VISIBLE_ALPHA: u8 = 16;

/// A decoded raster: RGB or RGBA bytes, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
    bytes_per_pixel: u8,
}

impl LoadedImage {
    /// Wrap decoded bytes; `bytes_per_pixel` must be 3 or 4 and the length must match
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, bytes_per_pixel: u8) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CanvasError::InvalidImage(Arc::new(format!(
                "image has zero size ({width}x{height})"
            ))));
        }
        if bytes_per_pixel != 3 && bytes_per_pixel != 4 {
            return Err(CanvasError::InvalidImage(Arc::new(format!(
                "unsupported bytes per pixel: {bytes_per_pixel}"
            ))));
        }
        let expected = width as usize * height as usize * bytes_per_pixel as usize;
        if pixels.len() != expected {
            return Err(CanvasError::InvalidImage(Arc::new(format!(
                "expected {expected} bytes, got {}",
                pixels.len()
            ))));
        }
        Ok(Self {
            width,
            height,
            pixels: pixels.into(),
            bytes_per_pixel,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn bytes_per_pixel(&self) -> u8 {
        self.bytes_per_pixel
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA at a coordinate; RGB images report alpha 255
    #[inline]
    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        let bpp = self.bytes_per_pixel as usize;
        let i = (y as usize * self.width as usize + x as usize) * bpp;
        let p = &self.pixels[i..i + bpp];
        if bpp == 4 {
            [p[0], p[1], p[2], p[3]]
        } else {
            [p[0], p[1], p[2], 255]
        }
    }
}

/// How an image is fitted into the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectFit {
    /// Scale to fit entirely, preserving aspect ratio
    #[default]
    Contain,
    /// Scale to cover the whole canvas, preserving aspect ratio
    Cover,
    /// Stretch to exactly the canvas size
    Fill,
}

/// Scaled size and placement of an image within a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitLayout {
    pub width: u32,
    pub height: u32,
    pub offset_x: i32,
    pub offset_y: i32,
}

/// Compute scaled dimensions and centering offset
///
/// Image pixels are square; canvas pixels are `pixel_aspect` wide per unit of
/// height, so the source is treated as `src_w / pixel_aspect` canvas pixels wide.
pub fn compute_fit(
    src_w: u32,
    src_h: u32,
    dst_w: u32,
    dst_h: u32,
    fit: ObjectFit,
    pixel_aspect: f64,
) -> FitLayout {
    if fit == ObjectFit::Fill || src_w == 0 || src_h == 0 {
        return FitLayout {
            width: dst_w,
            height: dst_h,
            offset_x: 0,
            offset_y: 0,
        };
    }

    let aspect = if pixel_aspect.is_finite() && pixel_aspect > 0.0 {
        pixel_aspect
    } else {
        1.0
    };
    let visual_w = f64::from(src_w) / aspect;
    let visual_h = f64::from(src_h);
    let scale_x = f64::from(dst_w) / visual_w;
    let scale_y = f64::from(dst_h) / visual_h;
    let scale = match fit {
        ObjectFit::Cover => scale_x.max(scale_y),
        _ => scale_x.min(scale_y),
    };

    let width = (visual_w * scale).round().max(1.0) as u32;
    let height = (visual_h * scale).round().max(1.0) as u32;
    FitLayout {
        width,
        height,
        offset_x: (i64::from(dst_w) - i64::from(width)).div_euclid(2) as i32,
        offset_y: (i64::from(dst_h) - i64::from(height)).div_euclid(2) as i32,
    }
}

/// Scale `image` into a `dst_w` x `dst_h` image layer
///
/// Nearest-neighbor sampling. Nearly transparent pixels are dropped and
/// partially transparent ones are pre-blended over `background`, since a
/// terminal cell cannot composite alpha.
pub fn composite_image(
    image: &LoadedImage,
    dst_w: u32,
    dst_h: u32,
    fit: ObjectFit,
    pixel_aspect: f64,
    background: Color,
) -> Vec<u32> {
    let layout = compute_fit(image.width, image.height, dst_w, dst_h, fit, pixel_aspect);
    let mut out = vec![TRANSPARENT; dst_w as usize * dst_h as usize];

    for dy in 0..dst_h {
        let sy_scaled = i64::from(dy) - i64::from(layout.offset_y);
        if sy_scaled < 0 || sy_scaled >= i64::from(layout.height) {
            continue;
        }
        let src_y = (sy_scaled as u64 * u64::from(image.height) / u64::from(layout.height)) as u32;

        for dx in 0..dst_w {
            let sx_scaled = i64::from(dx) - i64::from(layout.offset_x);
            if sx_scaled < 0 || sx_scaled >= i64::from(layout.width) {
                continue;
            }
            let src_x =
                (sx_scaled as u64 * u64::from(image.width) / u64::from(layout.width)) as u32;

            let [r, g, b, a] = image.rgba_at(src_x, src_y);
            let packed = if a < MIN_VISIBLE_ALPHA {
                TRANSPARENT
            } else if a == 255 {
                pack_rgba(r, g, b, 255)
            } else {
                Color::rgba(r, g, b, a).blend_over(background).pack()
            };
            out[(dy * dst_w + dx) as usize] = packed;
        }
    }

    debug!(
        "Composited {}x{} image into {}x{} ({:?} -> {}x{} at {},{})",
        image.width,
        image.height,
        dst_w,
        dst_h,
        fit,
        layout.width,
        layout.height,
        layout.offset_x,
        layout.offset_y
    );
    out
}

/// Run a one-shot filter over every visible pixel of an image layer
///
/// The filter sees the unfiltered layer through its source accessor and is
/// invoked with time `0.0`.
pub fn apply_filter(layer: &mut [u32], width: u32, height: u32, pixel_aspect: f64, filter: &mut ShaderFn) {
    let snapshot = layer.to_vec();
    let source = ShaderSource::new(&snapshot, width, height, None);
    let resolution = Resolution::new(width, height, pixel_aspect);
    let utils = ShaderUtils::new(None);

    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;
            if snapshot[idx] == TRANSPARENT {
                continue;
            }
            layer[idx] = filter(x, y, 0.0, &resolution, &source, &utils).to_packed();
        }
    }
}

/// Decoder boundary: raw file bytes in, [`LoadedImage`] out
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<LoadedImage>;
}

/// PNG/JPEG/GIF decoding through the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultImageDecoder;

impl ImageDecoder for DefaultImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<LoadedImage> {
        let decoded = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = decoded.dimensions();
        LoadedImage::new(width, height, decoded.into_raw(), 4)
    }
}

/// Where image bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    DataUrl { mime: String, bytes: Vec<u8> },
}

impl ImageSource {
    /// Parse a `src` option: `data:<mime>;base64,<payload>` or a file path
    pub fn parse(src: &str) -> Result<Self> {
        let Some(rest) = src.strip_prefix("data:") else {
            return Ok(ImageSource::Path(PathBuf::from(src)));
        };
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| CanvasError::InvalidDataUrl(Arc::new("missing ','".to_string())))?;
        let mime = header.strip_suffix(";base64").ok_or_else(|| {
            CanvasError::InvalidDataUrl(Arc::new("only base64 data URLs are supported".to_string()))
        })?;
        let bytes = BASE64.decode(payload.trim())?;
        Ok(ImageSource::DataUrl {
            mime: mime.to_string(),
            bytes,
        })
    }

    /// Raw encoded bytes for the decoder
    pub async fn read_bytes(&self) -> Result<Vec<u8>> {
        match self {
            ImageSource::DataUrl { bytes, .. } => Ok(bytes.clone()),
            ImageSource::Path(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|e| CanvasError::ImageLoad {
                        path: path.clone(),
                        message: Arc::new(e.to_string()),
                    })
            }
        }
    }
}

/// Read and decode `src` off the async thread
pub async fn fetch_image(src: &str, decoder: Arc<dyn ImageDecoder>) -> Result<LoadedImage> {
    let source = ImageSource::parse(src)?;
    let bytes = source.read_bytes().await?;
    tokio::task::spawn_blocking(move || decoder.decode(&bytes))
        .await
        .map_err(|e| CanvasError::ImageDecode(Arc::new(e.to_string())))?
}

/// Identifies one image load request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket(u64);

/// Last-request-wins bookkeeping for image loads
#[derive(Debug, Default)]
pub struct LoadTracker {
    latest: u64,
}

impl LoadTracker {
    /// Start a new request, superseding every earlier one
    pub fn begin(&mut self) -> LoadTicket {
        self.latest += 1;
        LoadTicket(self.latest)
    }

    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.0 == self.latest
    }
}
