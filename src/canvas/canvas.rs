//! The canvas: pixel layers, image, dithering and encoder in one place
//!
//! A [`Canvas`] is sized in terminal cells. Its pixel buffer is the cell
//! count times the per-cell pixel geometry of the active gfx mode. Each
//! [`render`](Canvas::render) runs the paint callback, recomposites a stale
//! image, dithers if configured and hands the frame to the rasterizer.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::buffer::{PixelBuffer, RedrawPolicy};
use super::caps::TerminalCaps;
use super::color::{pack_rgba, Color, TRANSPARENT};
use super::context::RenderContext;
use super::dither::{DitherCache, ThresholdMatrix};
use super::image::{apply_filter, composite_image, LoadTicket, LoadTracker, LoadedImage, ObjectFit};
use super::rasterizer::{select_rasterizer, CellGeometry, FrameView, RasterOutput, Rasterizer, SkipReason};
use super::shader::{FrameOutcome, Resolution, ShaderFn, ShaderRuntime, ShaderSource, ShaderState, ShaderUtils};
use super::shapes::Painter;
use crate::config::{CanvasConfig, CanvasOptions, CharacterStyle, GfxMode, DEFAULT_CHAR_ASPECT_RATIO};
use crate::errors::{CanvasError, Result};

/// Paint callback, run at the start of every render
pub type PaintFn = Box<dyn FnMut(&mut Painter<'_>) + Send>;

/// Pixel canvas rendered into terminal cells or a raster payload
pub struct Canvas {
    config: CanvasConfig,
    /// Effective mode; differs from the configured one after a raster fallback
    mode: GfxMode,
    cols: u16,
    rows: u16,
    geometry: CellGeometry,
    buffer: PixelBuffer,
    rasterizer: Box<dyn Rasterizer>,

    image: Option<LoadedImage>,
    image_fit: ObjectFit,
    image_stale: bool,
    loads: LoadTracker,

    dither: DitherCache,
    threshold: Option<ThresholdMatrix>,
    frame: Vec<u32>,
    content_generation: u64,
    force_refresh: bool,
    unsupported_logged: bool,

    on_paint: Option<PaintFn>,
    on_filter: Option<ShaderFn>,
    on_shader: Option<ShaderFn>,
    runtime: ShaderRuntime,
    shader_context: Option<Arc<dyn RenderContext>>,
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canvas")
            .field("mode", &self.mode)
            .field("cols", &self.cols)
            .field("rows", &self.rows)
            .field("geometry", &self.geometry)
            .field("rasterizer", &self.rasterizer.name())
            .field("has_image", &self.image.is_some())
            .field("shader", &self.runtime.state())
            .finish_non_exhaustive()
    }
}

impl Canvas {
    /// Build a canvas for `caps`
    ///
    /// A raster mode whose protocol is not usable on this terminal falls back
    /// to sextant characters.
    pub fn new(config: CanvasConfig, caps: &TerminalCaps) -> Result<Self> {
        if config.cols == 0 || config.rows == 0 {
            return Err(CanvasError::invalid(
                "size",
                format!("canvas needs at least one cell, got {}x{}", config.cols, config.rows),
            ));
        }
        if config.scale == 0 {
            return Err(CanvasError::invalid("scale", "scale must be at least 1"));
        }

        let mut mode = config.mode;
        let geometry = match mode {
            GfxMode::Character { .. } => CellGeometry::character(config.scale),
            GfxMode::Raster { protocol } => {
                let pc = caps.protocol(protocol);
                if pc.usable() {
                    CellGeometry::raster(pc.cell_width, pc.cell_height)
                } else {
                    warn!(
                        "Terminal does not support {} graphics; falling back to sextant",
                        protocol.name()
                    );
                    mode = GfxMode::Character {
                        style: CharacterStyle::Sextant,
                        char_aspect_ratio: DEFAULT_CHAR_ASPECT_RATIO,
                    };
                    CellGeometry::character(config.scale)
                }
            }
        };

        let buffer = PixelBuffer::new(
            u32::from(config.cols) * geometry.cell_width,
            u32::from(config.rows) * geometry.cell_height,
        )?;
        let rasterizer = select_rasterizer(&mode);
        debug!(
            "Canvas {}x{} cells, {}x{} pixels, {} rasterizer",
            config.cols,
            config.rows,
            buffer.width(),
            buffer.height(),
            rasterizer.name()
        );

        Ok(Self {
            cols: config.cols,
            rows: config.rows,
            image_fit: config.object_fit,
            runtime: ShaderRuntime::new(config.shader_fps, config.shader_run_time),
            config,
            mode,
            geometry,
            buffer,
            rasterizer,
            image: None,
            image_stale: false,
            loads: LoadTracker::default(),
            dither: DitherCache::new(),
            threshold: None,
            frame: Vec::new(),
            content_generation: 0,
            force_refresh: true,
            unsupported_logged: false,
            on_paint: None,
            on_filter: None,
            on_shader: None,
            shader_context: None,
        })
    }

    /// Validate `options` and build a canvas
    pub fn from_options(options: &CanvasOptions, caps: &TerminalCaps) -> Result<Self> {
        Self::new(options.validate()?, caps)
    }

    pub fn with_paint(mut self, paint: impl FnMut(&mut Painter<'_>) + Send + 'static) -> Self {
        self.on_paint = Some(Box::new(paint));
        self
    }

    /// One-shot filter applied whenever the image layer is recomposited
    pub fn with_filter(mut self, filter: ShaderFn) -> Self {
        self.on_filter = Some(filter);
        self.image_stale = self.image.is_some();
        self
    }

    pub fn with_shader(mut self, shader: ShaderFn) -> Self {
        self.on_shader = Some(shader);
        self
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    /// Active gfx mode (after any fallback)
    pub fn mode(&self) -> GfxMode {
        self.mode
    }

    /// Size in terminal cells
    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    pub fn geometry(&self) -> CellGeometry {
        self.geometry
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut PixelBuffer {
        &mut self.buffer
    }

    /// Drawing facade over the drawing layer
    pub fn painter(&mut self) -> Painter<'_> {
        let aspect = self.pixel_aspect_ratio();
        Painter::new(&mut self.buffer, aspect)
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: Color) {
        self.buffer.set_pixel(x, y, color.pack());
    }

    pub fn get_pixel(&self, x: i32, y: i32) -> Option<Color> {
        self.buffer.get_pixel(x, y).map(Color::unpack)
    }

    /// Clear the drawing layer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn rasterizer_name(&self) -> &'static str {
        self.rasterizer.name()
    }

    /// Width/height of one buffer pixel as displayed
    pub fn pixel_aspect_ratio(&self) -> f64 {
        self.mode.pixel_aspect_ratio()
    }

    /// Resize to `cols` x `rows` cells
    ///
    /// Every plane is reallocated and every derived cache dropped. A loaded
    /// image is recomposited on the next render. Use
    /// [`CanvasHandle::set_size`](super::CanvasHandle::set_size) while a shader
    /// is running.
    pub fn set_size(&mut self, cols: u16, rows: u16) -> Result<()> {
        if cols == 0 || rows == 0 {
            return Err(CanvasError::invalid(
                "size",
                format!("canvas needs at least one cell, got {cols}x{rows}"),
            ));
        }
        self.buffer.resize(
            u32::from(cols) * self.geometry.cell_width,
            u32::from(rows) * self.geometry.cell_height,
        )?;
        self.cols = cols;
        self.rows = rows;
        self.invalidate_caches();
        self.image_stale = self.image.is_some();
        info!("Canvas resized to {}x{} cells", cols, rows);
        Ok(())
    }

    fn invalidate_caches(&mut self) {
        self.dither.reset();
        self.rasterizer.invalidate();
        self.runtime.invalidate_output();
        self.frame = Vec::new();
        self.force_refresh = true;
    }

    /// Whether any derived cache currently holds data
    pub fn has_valid_caches(&self) -> bool {
        self.dither.is_valid() || self.rasterizer.has_valid_cache() || self.runtime.has_output()
    }

    pub fn image(&self) -> Option<&LoadedImage> {
        self.image.as_ref()
    }

    /// Replace the image; it is composited with the configured fit on the next render
    pub fn set_image(&mut self, image: LoadedImage) {
        debug!("Image set: {}x{}", image.width(), image.height());
        self.image = Some(image);
        self.image_fit = self.config.object_fit;
        self.image_stale = true;
    }

    pub fn clear_image(&mut self) {
        self.image = None;
        self.image_stale = true;
    }

    /// Use `image` as the matrix for threshold dithering
    pub fn set_threshold_image(&mut self, image: &LoadedImage) {
        self.threshold = Some(ThresholdMatrix::from_image(image));
        self.dither.invalidate();
    }

    /// Start an image load; only the latest ticket's result is applied
    pub fn begin_image_load(&mut self) -> LoadTicket {
        self.loads.begin()
    }

    /// Apply a finished load
    ///
    /// Returns `Ok(false)` for a superseded request. A failed load leaves the
    /// current image untouched.
    pub fn finish_image_load(&mut self, ticket: LoadTicket, result: Result<LoadedImage>) -> Result<bool> {
        if !self.loads.is_current(ticket) {
            debug!("Discarding superseded image load");
            return Ok(false);
        }
        match result {
            Ok(image) => {
                self.set_image(image);
                Ok(true)
            }
            Err(e) => {
                error!("Image load failed: {}", e);
                Err(e)
            }
        }
    }

    fn recomposite_image(&mut self) {
        let (w, h) = (self.buffer.width(), self.buffer.height());
        let aspect = self.pixel_aspect_ratio();
        match &self.image {
            Some(image) => {
                let mut layer = composite_image(image, w, h, self.image_fit, aspect, self.config.background);
                if let Some(filter) = self.on_filter.as_mut() {
                    apply_filter(&mut layer, w, h, aspect, filter);
                }
                if let Err(e) = self.buffer.set_image_layer(layer) {
                    warn!("Dropping composited image: {}", e);
                }
            }
            None => self.buffer.clear_image(),
        }
        self.image_stale = false;
        self.force_refresh = true;
    }

    fn content_changed(&self) -> bool {
        self.force_refresh || (self.buffer.is_dirty() && self.buffer.changed_since_clean())
    }

    /// Render into `buf` at `bounds`
    ///
    /// Character modes write styled cells; raster modes return a payload for
    /// the output stage. The frame is marked clean afterwards.
    pub fn render(&mut self, bounds: Rect, inherited: Style, buf: &mut Buffer, ctx: &dyn RenderContext) -> RasterOutput {
        let aspect = self.pixel_aspect_ratio();
        if let Some(paint) = self.on_paint.as_mut() {
            let mut painter = Painter::new(&mut self.buffer, aspect);
            paint(&mut painter);
        }
        if self.image_stale {
            self.recomposite_image();
        }
        if self.content_changed() {
            self.content_generation += 1;
            self.dither.invalidate();
            self.force_refresh = false;
        }

        let caps = ctx.terminal_caps();
        if let GfxMode::Raster { protocol } = self.mode {
            if !caps.protocol(protocol).usable() {
                if !self.unsupported_logged {
                    warn!("{} graphics no longer available; skipping canvas", protocol.name());
                    self.unsupported_logged = true;
                }
                self.buffer.mark_clean();
                return RasterOutput::Skipped(SkipReason::Unsupported);
            }
        }

        let dynamic = self.runtime.is_running() || self.on_paint.is_some();
        let dither = self
            .config
            .dither
            .resolve(self.config.dither_bits, caps.colors, self.mode.is_raster(), dynamic);
        match dither {
            Some((algorithm, bits)) => {
                let bytes = self
                    .dither
                    .get_or_update(&self.buffer, algorithm, bits, self.threshold.as_ref());
                unpack_bytes(bytes, &mut self.frame);
            }
            None => self.buffer.composite_into(&mut self.frame),
        }

        let clip = ctx.clip().map_or(buf.area, |c| c.intersection(buf.area));
        let view = FrameView {
            pixels: &self.frame,
            drawing: self.buffer.drawing(),
            width: self.buffer.width(),
            height: self.buffer.height(),
            geometry: self.geometry,
            source_id: self.content_generation,
            dynamic,
            clip,
        };
        let output = self.rasterizer.rasterize(&view, bounds, buf, inherited);
        self.buffer.mark_clean();
        output
    }

    pub fn has_shader(&self) -> bool {
        self.on_shader.is_some()
    }

    pub fn shader_state(&self) -> ShaderState {
        self.runtime.state()
    }

    pub fn shader_runtime(&self) -> &ShaderRuntime {
        &self.runtime
    }

    /// Context the running shader requests renders through
    pub fn shader_context(&self) -> Option<Arc<dyn RenderContext>> {
        self.shader_context.clone()
    }

    /// Mouse position in buffer pixels, `None` when the pointer left the canvas
    pub fn set_mouse_position(&mut self, position: Option<(i32, i32)>) {
        self.runtime.set_mouse(position);
    }

    /// Returns true the first time the shader permission was missing
    pub fn note_shader_denied(&mut self) -> bool {
        self.runtime.note_denied()
    }

    /// Record a spawned frame task and switch to full-frame redraws
    pub fn shader_started(&mut self, now: Instant, resume: bool, task: JoinHandle<()>, ctx: Arc<dyn RenderContext>) {
        self.runtime.begin(now, resume, task);
        self.shader_context = Some(ctx);
        self.buffer.set_policy(RedrawPolicy::FullFrame);
    }

    /// Generation the next frame task must carry
    pub fn next_shader_generation(&mut self) -> u64 {
        self.runtime.next_generation()
    }

    /// Abort the frame task; idempotent
    pub fn stop_shader(&mut self, now: Instant) {
        self.runtime.stop(now);
        self.buffer.set_policy(RedrawPolicy::Incremental);
    }

    /// Run one shader frame at `now`
    pub fn shader_frame(&mut self, now: Instant) -> FrameOutcome {
        if !self.runtime.is_running() {
            return FrameOutcome::Finished;
        }
        if self.runtime.run_time_expired(now) {
            self.freeze_shader(now);
            return FrameOutcome::Finished;
        }
        let Some(mut shader) = self.on_shader.take() else {
            self.finish_shader(now);
            return FrameOutcome::Finished;
        };

        let (w, h) = (self.buffer.width(), self.buffer.height());
        let seconds = self.runtime.elapsed(now).as_secs_f64();
        let mouse = self.runtime.mouse();
        let resolution = Resolution::new(w, h, self.pixel_aspect_ratio());
        let image = self.buffer.image();
        let output = self.runtime.output_mut(image.len());

        let result = catch_unwind(AssertUnwindSafe(|| {
            let source = ShaderSource::new(image, w, h, mouse);
            let utils = ShaderUtils::new(mouse);
            for y in 0..h {
                for x in 0..w {
                    output[(y * w + x) as usize] = shader(x, y, seconds, &resolution, &source, &utils).to_packed();
                }
            }
        }));
        self.on_shader = Some(shader);

        match result {
            Ok(()) => match self.buffer.commit_frame(self.runtime.output()) {
                Ok(()) => FrameOutcome::Continue,
                Err(e) => {
                    error!("Shader frame dropped: {}", e);
                    self.finish_shader(now);
                    FrameOutcome::Finished
                }
            },
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Shader panicked, stopping animation: {}", message);
                self.finish_shader(now);
                FrameOutcome::Finished
            }
        }
    }

    fn finish_shader(&mut self, now: Instant) {
        self.runtime.finish(now);
        self.buffer.set_policy(RedrawPolicy::Incremental);
    }

    /// Freeze the last frame as a filled image and end the animation
    fn freeze_shader(&mut self, now: Instant) {
        let mut bytes = Vec::new();
        self.buffer.composite_rgba_into(&mut bytes);
        match LoadedImage::new(self.buffer.width(), self.buffer.height(), bytes, 4) {
            Ok(snapshot) => {
                self.image = Some(snapshot);
                self.image_fit = ObjectFit::Fill;
                self.image_stale = true;
            }
            Err(e) => warn!("Could not snapshot shader output: {}", e),
        }
        self.finish_shader(now);
        self.buffer.clear();
        info!("Shader run time reached; froze final frame");
    }
}

/// Dithered RGBA bytes back to packed pixels
fn unpack_bytes(bytes: &[u8], out: &mut Vec<u32>) {
    out.clear();
    out.extend(bytes.chunks_exact(4).map(|px| {
        if px[3] == 0 {
            TRANSPARENT
        } else {
            pack_rgba(px[0], px[1], px[2], px[3])
        }
    }));
}
