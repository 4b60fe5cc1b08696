//! Per-pixel animation callbacks
//!
//! A shader is a closure invoked once per buffer pixel per frame. Frames are
//! driven by a tokio task (see [`crate::canvas::CanvasHandle`]); this module
//! holds the callback types, the frame pacer and the runtime bookkeeping the
//! canvas keeps between frames.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::color::{Color, TRANSPARENT};

/// Default target frame rate
pub const DEFAULT_SHADER_FPS: u32 = 30;

/// Buffer geometry handed to each shader call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    /// Width/height of one logical pixel as rendered
    pub pixel_aspect_ratio: f64,
}

impl Resolution {
    pub fn new(width: u32, height: u32, pixel_aspect_ratio: f64) -> Self {
        Self {
            width,
            height,
            pixel_aspect_ratio,
        }
    }

    /// Visual width/height of the whole buffer
    pub fn aspect(&self) -> f64 {
        if self.height == 0 {
            return 1.0;
        }
        f64::from(self.width) * self.pixel_aspect_ratio / f64::from(self.height)
    }

    /// Normalized coordinates of a pixel center in `[0, 1]`
    pub fn uv(&self, x: u32, y: u32) -> (f64, f64) {
        (
            (f64::from(x) + 0.5) / f64::from(self.width.max(1)),
            (f64::from(y) + 0.5) / f64::from(self.height.max(1)),
        )
    }
}

/// Read access to the image layer during a shader or filter call
#[derive(Debug, Clone, Copy)]
pub struct ShaderSource<'a> {
    pixels: &'a [u32],
    width: u32,
    height: u32,
    mouse: Option<(i32, i32)>,
}

impl<'a> ShaderSource<'a> {
    pub fn new(pixels: &'a [u32], width: u32, height: u32, mouse: Option<(i32, i32)>) -> Self {
        Self {
            pixels,
            width,
            height,
            mouse,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Visible pixel at `(x, y)`; `None` when transparent or out of range
    pub fn pixel(&self, x: i32, y: i32) -> Option<Color> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        let packed = *self.pixels.get(y as usize * self.width as usize + x as usize)?;
        (packed != TRANSPARENT).then(|| Color::unpack(packed))
    }

    /// Nearest pixel for normalized coordinates
    pub fn sample(&self, u: f64, v: f64) -> Option<Color> {
        let x = (u * f64::from(self.width)).floor() as i32;
        let y = (v * f64::from(self.height)).floor() as i32;
        self.pixel(x, y)
    }

    /// Image pixel under the mouse, if hovering
    pub fn under_mouse(&self) -> Option<Color> {
        let (x, y) = self.mouse?;
        self.pixel(x, y)
    }
}

/// Helpers available to shader closures
#[derive(Debug, Clone, Copy, Default)]
pub struct ShaderUtils {
    mouse: Option<(i32, i32)>,
}

impl ShaderUtils {
    pub fn new(mouse: Option<(i32, i32)>) -> Self {
        Self { mouse }
    }

    /// Mouse position in buffer pixels, `None` when not hovering
    pub fn mouse(&self) -> Option<(i32, i32)> {
        self.mouse
    }

    pub fn is_hovering(&self) -> bool {
        self.mouse.is_some()
    }

    /// Hermite interpolation between `edge0` and `edge1`
    pub fn smoothstep(&self, edge0: f64, edge1: f64, x: f64) -> f64 {
        if edge0 == edge1 {
            return if x < edge0 { 0.0 } else { 1.0 };
        }
        let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
        t * t * (3.0 - 2.0 * t)
    }

    pub fn mix(&self, a: f64, b: f64, t: f64) -> f64 {
        a + (b - a) * t
    }

    /// Smooth 2D value noise in `[0, 1]`
    pub fn noise(&self, x: f64, y: f64) -> f64 {
        let (xi, yi) = (x.floor(), y.floor());
        let (xf, yf) = (x - xi, y - yi);
        let (xi, yi) = (xi as i64, yi as i64);
        let u = xf * xf * (3.0 - 2.0 * xf);
        let v = yf * yf * (3.0 - 2.0 * yf);
        let a = lattice(xi, yi);
        let b = lattice(xi + 1, yi);
        let c = lattice(xi, yi + 1);
        let d = lattice(xi + 1, yi + 1);
        self.mix(self.mix(a, b, u), self.mix(c, d, u), v)
    }

    /// HSL (`h` in degrees, `s`/`l` in `[0, 1]`) to an opaque shader color
    pub fn hsl_to_rgb(&self, h: f64, s: f64, l: f64) -> ShaderColor {
        let h = h.rem_euclid(360.0) / 60.0;
        let s = s.clamp(0.0, 1.0);
        let l = l.clamp(0.0, 1.0);
        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = l - c / 2.0;
        ShaderColor::rgb(
            ((r + m) * 255.0) as f32,
            ((g + m) * 255.0) as f32,
            ((b + m) * 255.0) as f32,
        )
    }
}

fn lattice(x: i64, y: i64) -> f64 {
    let mut h = (x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (y as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    h ^= h >> 29;
    h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    h ^= h >> 32;
    (h >> 11) as f64 / (1u64 << 53) as f64
}

/// Color returned by a shader; channels are clamped to `[0, 255]` when stored
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaderColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: Option<f32>,
}

impl ShaderColor {
    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: None }
    }

    pub fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a: Some(a) }
    }

    pub fn to_color(self) -> Color {
        let clamp = |v: f32| v.clamp(0.0, 255.0).round() as u8;
        Color::rgba(clamp(self.r), clamp(self.g), clamp(self.b), self.a.map_or(255, clamp))
    }

    /// Packed storage form; a zero alpha packs to transparent
    pub fn to_packed(self) -> u32 {
        self.to_color().pack()
    }
}

impl From<Color> for ShaderColor {
    fn from(c: Color) -> Self {
        Self::rgba(f32::from(c.r), f32::from(c.g), f32::from(c.b), f32::from(c.a))
    }
}

/// Shader/filter callback: `(x, y, seconds, resolution, source, utils)`
pub type ShaderFn =
    Box<dyn FnMut(u32, u32, f64, &Resolution, &ShaderSource<'_>, &ShaderUtils) -> ShaderColor + Send>;

/// Lifecycle of the shader loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaderState {
    #[default]
    Idle,
    Running,
    Stopped,
    Finished,
}

/// Deadline-based frame scheduler
///
/// Each deadline is the previous one plus the interval, so sleep overshoot
/// does not accumulate. After an overrun the schedule restarts from now.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl FramePacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn from_fps(fps: u32) -> Self {
        Self::new(frame_interval(fps))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Delay until the next frame should start
    pub fn next_delay(&mut self, now: Instant) -> Duration {
        let mut next = match self.deadline {
            Some(previous) => previous + self.interval,
            None => now + self.interval,
        };
        if next < now {
            next = now;
        }
        self.deadline = Some(next);
        next - now
    }

    /// The most recently scheduled deadline
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Interval for a target frame rate (`0` is treated as 1 fps)
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(fps.max(1)))
}

/// What the canvas should do after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Finished,
}

/// Per-canvas shader bookkeeping
#[derive(Debug)]
pub struct ShaderRuntime {
    state: ShaderState,
    fps: u32,
    run_time: Option<Duration>,
    started_at: Option<Instant>,
    elapsed_offset: Duration,
    mouse: (i32, i32),
    output: Vec<u32>,
    task: Option<JoinHandle<()>>,
    /// Bumped for every frame task; older tasks see a mismatch and exit
    generation: u64,
    denial_logged: bool,
}

impl Default for ShaderRuntime {
    fn default() -> Self {
        Self::new(DEFAULT_SHADER_FPS, None)
    }
}

impl ShaderRuntime {
    pub fn new(fps: u32, run_time: Option<Duration>) -> Self {
        Self {
            state: ShaderState::Idle,
            fps: fps.max(1),
            run_time,
            started_at: None,
            elapsed_offset: Duration::ZERO,
            mouse: (-1, -1),
            output: Vec::new(),
            task: None,
            generation: 0,
            denial_logged: false,
        }
    }

    /// Generation of the current frame task
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Claim a generation for a frame task about to be spawned
    pub fn next_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    pub fn state(&self) -> ShaderState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ShaderState::Running
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn interval(&self) -> Duration {
        frame_interval(self.fps)
    }

    pub fn run_time(&self) -> Option<Duration> {
        self.run_time
    }

    /// Seconds of animation time at `now`, including time carried over a restart
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.started_at {
            Some(start) => self.elapsed_offset + now.saturating_duration_since(start),
            None => self.elapsed_offset,
        }
    }

    pub fn run_time_expired(&self, now: Instant) -> bool {
        self.run_time.is_some_and(|limit| self.elapsed(now) >= limit)
    }

    /// Enter `Running`; `resume` keeps the animation clock continuous
    pub fn begin(&mut self, now: Instant, resume: bool, task: JoinHandle<()>) {
        if !resume {
            self.elapsed_offset = Duration::ZERO;
        }
        self.started_at = Some(now);
        self.state = ShaderState::Running;
        self.task = Some(task);
        debug!("Shader started at {} fps (offset {:?})", self.fps, self.elapsed_offset);
    }

    /// Abort the frame task; a no-op unless running
    pub fn stop(&mut self, now: Instant) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.state == ShaderState::Running {
            self.elapsed_offset = self.elapsed(now);
            self.started_at = None;
            self.state = ShaderState::Stopped;
            debug!("Shader stopped after {:?}", self.elapsed_offset);
        }
    }

    /// Terminal state after run-time expiry or a panicking callback
    pub fn finish(&mut self, now: Instant) {
        self.elapsed_offset = self.elapsed(now);
        self.started_at = None;
        self.state = ShaderState::Finished;
        // the task is exiting on its own
        self.task = None;
    }

    /// Log a missing capability grant only the first time
    pub fn note_denied(&mut self) -> bool {
        let first = !self.denial_logged;
        self.denial_logged = true;
        first
    }

    /// Mouse position in buffer pixels, `None` when not hovering
    pub fn mouse(&self) -> Option<(i32, i32)> {
        let (x, y) = self.mouse;
        (x >= 0 && y >= 0).then_some(self.mouse)
    }

    pub fn set_mouse(&mut self, position: Option<(i32, i32)>) {
        self.mouse = position.unwrap_or((-1, -1));
    }

    /// Output scratch sized to `len`, reallocated after a resize
    pub fn output_mut(&mut self, len: usize) -> &mut Vec<u32> {
        if self.output.len() != len {
            self.output = vec![TRANSPARENT; len];
        }
        &mut self.output
    }

    pub fn output(&self) -> &[u32] {
        &self.output
    }

    /// Drop the output buffer (resize)
    pub fn invalidate_output(&mut self) {
        self.output = Vec::new();
    }

    pub fn has_output(&self) -> bool {
        !self.output.is_empty()
    }
}

impl Drop for ShaderRuntime {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_color_clamps() {
        let c = ShaderColor::rgb(-20.0, 300.0, 127.6).to_color();
        assert_eq!(c, Color::rgb(0, 255, 128));
        assert_eq!(ShaderColor::rgba(10.0, 10.0, 10.0, 0.0).to_packed(), TRANSPARENT);
    }

    #[test]
    fn test_pacer_no_drift_over_100_frames() {
        let interval = frame_interval(30);
        let mut pacer = FramePacer::from_fps(30);
        let start = Instant::now();
        let mut now = start;
        let mut last: Option<Instant> = None;

        for frame in 0..100u32 {
            let delay = pacer.next_delay(now);
            // simulated sleep overshoots by up to 3ms, callback costs nothing
            let overshoot = Duration::from_micros(u64::from(frame % 4) * 1000);
            now += delay + overshoot;
            if let Some(prev) = last {
                let gap = now.duration_since(prev);
                assert!(gap <= interval + Duration::from_millis(4), "frame {frame}: {gap:?}");
                assert!(gap + Duration::from_millis(4) >= interval, "frame {frame}: {gap:?}");
            }
            last = Some(now);
        }

        let ideal = interval * 100;
        let actual = now.duration_since(start);
        let drift = if actual > ideal { actual - ideal } else { ideal - actual };
        assert!(drift <= interval, "drift {drift:?}");
    }

    #[test]
    fn test_pacer_resyncs_after_overrun() {
        let mut pacer = FramePacer::new(Duration::from_millis(10));
        let t0 = Instant::now();
        assert_eq!(pacer.next_delay(t0), Duration::from_millis(10));
        // a frame that ran 50ms late gets no delay, then normal spacing resumes
        let late = t0 + Duration::from_millis(60);
        assert_eq!(pacer.next_delay(late), Duration::ZERO);
        assert_eq!(pacer.next_delay(late), Duration::from_millis(10));
    }

    #[test]
    fn test_source_pixel_bounds() {
        let pixels = [Color::RED.pack(), TRANSPARENT];
        let src = ShaderSource::new(&pixels, 2, 1, Some((0, 0)));
        assert_eq!(src.pixel(0, 0), Some(Color::RED));
        assert_eq!(src.pixel(1, 0), None);
        assert_eq!(src.pixel(-1, 0), None);
        assert_eq!(src.pixel(0, 5), None);
        assert_eq!(src.under_mouse(), Some(Color::RED));
        assert_eq!(src.sample(0.1, 0.5), Some(Color::RED));
    }

    #[test]
    fn test_utils() {
        let u = ShaderUtils::new(None);
        assert!(!u.is_hovering());
        assert_eq!(u.smoothstep(0.0, 1.0, -1.0), 0.0);
        assert_eq!(u.smoothstep(0.0, 1.0, 0.5), 0.5);
        assert_eq!(u.mix(2.0, 4.0, 0.25), 2.5);
        let n = u.noise(3.3, 7.9);
        assert!((0.0..=1.0).contains(&n));
        assert_eq!(u.noise(1.0, 2.0), u.noise(1.0, 2.0));
        assert_eq!(u.hsl_to_rgb(0.0, 1.0, 0.5).to_color(), Color::RED);
        assert_eq!(u.hsl_to_rgb(240.0, 1.0, 0.5).to_color(), Color::BLUE);
    }

    #[test]
    fn test_runtime_elapsed_and_mouse() {
        let mut rt = ShaderRuntime::new(30, Some(Duration::from_secs(1)));
        let t0 = Instant::now();
        assert_eq!(rt.elapsed(t0), Duration::ZERO);
        assert!(rt.mouse().is_none());
        rt.set_mouse(Some((3, 4)));
        assert_eq!(rt.mouse(), Some((3, 4)));
        rt.set_mouse(None);
        assert_eq!(rt.mouse(), None);
        assert!(rt.note_denied());
        assert!(!rt.note_denied());
        assert_eq!(rt.output_mut(6).len(), 6);
        rt.invalidate_output();
        assert!(!rt.has_output());
    }
}
