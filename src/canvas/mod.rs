//! # Canvas - pixel graphics for terminal UIs
//!
//! Rendering strategies, picked per canvas by its gfx mode:
//! 1. Raster protocols (Kitty, iTerm2, Sixel) - native pixels where supported
//! 2. Sextant ▌▐█🬀 (2x3 sub-pixels, 2 colors per cell) - universal fallback
//! 3. Block and ASCII (pattern or brightness ramp) - minimal terminals
//!
//! ## Architecture
//!
//! ```text
//!     paint / shader          image (decoded, fitted)
//!            │                        │
//!            ▼                        ▼
//!     ┌──────────────┐         ┌──────────────┐
//!     │ drawing layer│         │ image layer  │
//!     └──────┬───────┘         └──────┬───────┘
//!            └───────────┬────────────┘
//!                        ▼
//!                 composite → dither
//!                        │
//!          ┌─────────────┼──────────────┐
//!          ▼             ▼              ▼
//!    ┌───────────┐ ┌───────────┐ ┌────────────┐
//!    │  Sextant  │ │ Block/    │ │ Sixel/Kitty│
//!    │  🬀🬁🬂▌▐█   │ │ ASCII     │ │ /iTerm2    │
//!    └───────────┘ └───────────┘ └────────────┘
//! ```

pub mod ascii;
pub mod block;
pub mod buffer;
#[allow(clippy::module_inception)]
pub mod canvas;
pub mod caps;
pub mod color;
pub mod context;
pub mod dither;
pub mod handle;
pub mod image;
pub mod iterm2;
pub mod kitty;
pub mod palette;
pub mod quantize;
pub mod rasterizer;
pub mod sextant;
pub mod shader;
pub mod shapes;
pub mod sixel;

pub use buffer::{Layer, PixelBuffer, RedrawPolicy};
pub use canvas::{Canvas, PaintFn};
pub use caps::{ColorDepth, ProtocolCaps, RasterProtocol, TerminalCaps};
pub use color::Color;
pub use context::{Capability, RenderContext, StaticContext};
pub use dither::{DitherAlgorithm, ScanOrder, ThresholdMatrix};
pub use handle::CanvasHandle;
pub use image::{DefaultImageDecoder, ImageDecoder, LoadedImage, ObjectFit};
pub use palette::{KeyframeTolerance, Palette, PaletteMode};
pub use rasterizer::{RasterOutput, RasterPayload, Rasterizer, SkipReason};
pub use shader::{FrameOutcome, Resolution, ShaderColor, ShaderFn, ShaderSource, ShaderState, ShaderUtils};
pub use shapes::{Circle, Ellipse, Line, Painter, Point, Rectangle, Shape};
