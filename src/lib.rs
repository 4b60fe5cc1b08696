#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

//! # termcanvas
//!
//! A pixel canvas for terminal UIs. Draw with primitives, load images, or
//! animate with per-pixel shaders; the canvas encodes the result as Unicode
//! sextant cells, ASCII, solid blocks, or Sixel/Kitty/iTerm2 graphics,
//! with optional dithering for limited color depths.
//!
//! Cells are written into a [`ratatui::buffer::Buffer`]; raster protocols
//! return a [`canvas::RasterPayload`] for the host's output stage.

pub mod canvas;
pub mod config;
pub mod errors;

pub use canvas::{Canvas, CanvasHandle, Color, RasterOutput, RenderContext, TerminalCaps};
pub use config::{CanvasConfig, CanvasOptions, GfxMode};
pub use errors::{CanvasError, Result};
