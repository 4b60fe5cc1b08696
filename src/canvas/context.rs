//! Services the hosting engine provides to a canvas
//!
//! A [`RenderContext`] is passed into every render and shader start instead
//! of reaching for process-wide state.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use ratatui::layout::Rect;

use super::caps::TerminalCaps;

/// Permissions a canvas may need from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Run a shader on a timer
    Shader,
}

/// Host services available during render and from the shader task
pub trait RenderContext: Send + Sync {
    /// Ask the host to schedule another render
    fn request_render(&self);

    fn has_permission(&self, capability: Capability) -> bool;

    fn terminal_caps(&self) -> &TerminalCaps;

    /// Visible region in absolute cells; `None` means the whole buffer
    fn clip(&self) -> Option<Rect> {
        None
    }
}

/// A fixed-capability context that counts render requests
///
/// Suits hosts with a single static terminal and tests.
#[derive(Debug)]
pub struct StaticContext {
    caps: TerminalCaps,
    shader_allowed: AtomicBool,
    clip: Option<Rect>,
    renders: AtomicUsize,
}

impl StaticContext {
    pub fn new(caps: TerminalCaps) -> Self {
        Self {
            caps,
            shader_allowed: AtomicBool::new(true),
            clip: None,
            renders: AtomicUsize::new(0),
        }
    }

    pub fn with_clip(mut self, clip: Rect) -> Self {
        self.clip = Some(clip);
        self
    }

    pub fn with_shader_permission(self, allowed: bool) -> Self {
        self.shader_allowed.store(allowed, Ordering::Relaxed);
        self
    }

    pub fn set_shader_permission(&self, allowed: bool) {
        self.shader_allowed.store(allowed, Ordering::Relaxed);
    }

    /// Number of `request_render` calls so far
    pub fn render_requests(&self) -> usize {
        self.renders.load(Ordering::Relaxed)
    }
}

impl Default for StaticContext {
    fn default() -> Self {
        Self::new(TerminalCaps::default())
    }
}

impl RenderContext for StaticContext {
    fn request_render(&self) {
        self.renders.fetch_add(1, Ordering::Relaxed);
    }

    fn has_permission(&self, capability: Capability) -> bool {
        match capability {
            Capability::Shader => self.shader_allowed.load(Ordering::Relaxed),
        }
    }

    fn terminal_caps(&self) -> &TerminalCaps {
        &self.caps
    }

    fn clip(&self) -> Option<Rect> {
        self.clip
    }
}
