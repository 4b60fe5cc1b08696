//! Shared canvas handle and the shader frame task
//!
//! The canvas lives behind `Arc<Mutex<_>>`. Renders lock it for one render,
//! the frame task locks it for one frame and holds only a `Weak` between
//! frames, so dropping every handle ends the animation.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::Style;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::canvas::Canvas;
use super::context::{Capability, RenderContext};
use super::image::{fetch_image, ImageDecoder};
use super::rasterizer::RasterOutput;
use super::shader::{FrameOutcome, FramePacer, ShaderState};
use crate::errors::{CanvasError, Result};

/// Cloneable, thread-safe handle to a [`Canvas`]
#[derive(Debug, Clone)]
pub struct CanvasHandle {
    inner: Arc<Mutex<Canvas>>,
}

impl CanvasHandle {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            inner: Arc::new(Mutex::new(canvas)),
        }
    }

    /// Lock the canvas for direct access
    pub fn lock(&self) -> Result<MutexGuard<'_, Canvas>> {
        self.inner
            .lock()
            .map_err(|e| CanvasError::LockPoisoned(Arc::new(e.to_string())))
    }

    /// Render the canvas, starting its shader on first use
    pub fn render(
        &self,
        bounds: Rect,
        inherited: Style,
        buf: &mut Buffer,
        ctx: &Arc<dyn RenderContext>,
    ) -> Result<RasterOutput> {
        let mut canvas = self.lock()?;
        if canvas.has_shader() && canvas.shader_state() == ShaderState::Idle {
            if let Err(e) = self.start_locked(&mut canvas, Arc::clone(ctx), false) {
                warn!("Shader not started: {}", e);
            }
        }
        Ok(canvas.render(bounds, inherited, buf, ctx.as_ref()))
    }

    /// Start the shader loop
    ///
    /// Errors without a shader callback or outside a tokio runtime. Without
    /// the shader capability this logs once and does nothing.
    pub fn start_shader(&self, ctx: Arc<dyn RenderContext>) -> Result<()> {
        let mut canvas = self.lock()?;
        self.start_locked(&mut canvas, ctx, false)
    }

    fn start_locked(&self, canvas: &mut Canvas, ctx: Arc<dyn RenderContext>, resume: bool) -> Result<()> {
        if !canvas.has_shader() {
            return Err(CanvasError::NoShader);
        }
        if canvas.shader_state() == ShaderState::Running {
            return Ok(());
        }
        if !ctx.has_permission(Capability::Shader) {
            if canvas.note_shader_denied() {
                warn!("Shader capability not granted; canvas stays static");
            }
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|_| CanvasError::NoRuntime)?;

        let interval = canvas.shader_runtime().interval();
        let generation = canvas.next_shader_generation();
        let task = runtime.spawn(shader_loop(
            Arc::downgrade(&self.inner),
            generation,
            Arc::clone(&ctx),
            interval,
        ));
        canvas.shader_started(Instant::now(), resume, task, ctx);
        Ok(())
    }

    /// Stop the shader loop; idempotent
    pub fn stop_shader(&self) -> Result<()> {
        self.lock()?.stop_shader(Instant::now());
        Ok(())
    }

    pub fn shader_state(&self) -> Result<ShaderState> {
        Ok(self.lock()?.shader_state())
    }

    /// Resize, restarting a running shader with its clock preserved
    pub fn set_size(&self, cols: u16, rows: u16) -> Result<()> {
        let mut canvas = self.lock()?;
        let restart = if canvas.shader_state() == ShaderState::Running {
            canvas.shader_context()
        } else {
            None
        };
        canvas.stop_shader(Instant::now());
        let resized = canvas.set_size(cols, rows);
        if let Some(ctx) = restart {
            self.start_locked(&mut canvas, ctx, true)?;
        }
        resized
    }

    /// Load and decode `src`, then request a render if it was applied
    ///
    /// Returns `Ok(false)` when a newer load superseded this one.
    pub async fn load_image(&self, src: &str, decoder: Arc<dyn ImageDecoder>, ctx: &dyn RenderContext) -> Result<bool> {
        let ticket = self.lock()?.begin_image_load();
        debug!("Loading image {}", abbreviate(src));
        let result = fetch_image(src, decoder).await;
        let applied = self.lock()?.finish_image_load(ticket, result)?;
        if applied {
            ctx.request_render();
        }
        Ok(applied)
    }

    /// Load the configured `src`, if any
    pub async fn load_configured_src(&self, decoder: Arc<dyn ImageDecoder>, ctx: &dyn RenderContext) -> Result<bool> {
        let src = self.lock()?.config().src.clone();
        match src {
            Some(src) => self.load_image(&src, decoder, ctx).await,
            None => Ok(false),
        }
    }
}

/// Data URLs can be megabytes long
fn abbreviate(src: &str) -> &str {
    match src.char_indices().nth(64) {
        Some((idx, _)) => &src[..idx],
        None => src,
    }
}

/// Run one frame for the task of `generation`
///
/// `None` ends the task: the canvas is gone, or the shader was stopped or
/// restarted while this task waited on the lock.
fn run_frame(canvas: &Weak<Mutex<Canvas>>, generation: u64) -> Option<FrameOutcome> {
    let Some(inner) = canvas.upgrade() else {
        debug!("Canvas dropped, shader loop exiting");
        return None;
    };
    let mut guard = match inner.lock() {
        Ok(guard) => guard,
        Err(e) => {
            error!("Canvas lock poisoned, ending shader: {}", e);
            return None;
        }
    };
    let runtime = guard.shader_runtime();
    if runtime.generation() != generation || !runtime.is_running() {
        debug!("Shader task {} superseded, exiting", generation);
        return None;
    }
    Some(guard.shader_frame(Instant::now()))
}

async fn shader_loop(canvas: Weak<Mutex<Canvas>>, generation: u64, ctx: Arc<dyn RenderContext>, interval: Duration) {
    let mut pacer = FramePacer::new(interval);
    loop {
        tokio::time::sleep(pacer.next_delay(Instant::now())).await;
        let Some(outcome) = run_frame(&canvas, generation) else {
            break;
        };
        ctx.request_render();
        if outcome == FrameOutcome::Finished {
            break;
        }
    }
}
