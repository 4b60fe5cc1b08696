//! Shader runtime tests on tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color as TermColor, Style};
use tokio::time::{sleep, Instant};

use termcanvas::canvas::context::StaticContext;
use termcanvas::canvas::shader::{ShaderColor, ShaderFn, ShaderState};
use termcanvas::canvas::{Canvas, CanvasHandle, Color, RenderContext, TerminalCaps};
use termcanvas::config::CanvasConfig;
use termcanvas::errors::Result;

fn contexts() -> (Arc<StaticContext>, Arc<dyn RenderContext>) {
    let ctx = Arc::new(StaticContext::default());
    let shared: Arc<dyn RenderContext> = ctx.clone();
    (ctx, shared)
}

fn handle_with(config: CanvasConfig, shader: ShaderFn) -> Result<CanvasHandle> {
    let canvas = Canvas::new(config, &TerminalCaps::default())?.with_shader(shader);
    Ok(CanvasHandle::new(canvas))
}

fn pulse() -> ShaderFn {
    Box::new(|_, _, t, _, _, _| ShaderColor::rgb(((t * 200.0) as f32).min(255.0), 0.0, 0.0))
}

#[tokio::test(start_paused = true)]
async fn test_frames_follow_fps() -> Result<()> {
    let (ctx, shared) = contexts();
    let handle = handle_with(CanvasConfig::default().with_size(2, 1).with_shader_timing(30, None), pulse())?;
    handle.start_shader(shared)?;
    assert_eq!(handle.shader_state()?, ShaderState::Running);

    // first frame lands one interval after start
    sleep(Duration::from_millis(20)).await;
    assert_eq!(ctx.render_requests(), 0);

    sleep(Duration::from_millis(320)).await;
    let frames = ctx.render_requests();
    assert!((9..=11).contains(&frames), "{frames} frames in 340ms");

    let red = handle.lock()?.get_pixel(0, 0).map(|c| c.r).unwrap_or_default();
    assert!(red > 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent_and_halts_frames() -> Result<()> {
    let (ctx, shared) = contexts();
    let handle = handle_with(CanvasConfig::default().with_size(1, 1), pulse())?;
    handle.start_shader(shared)?;
    sleep(Duration::from_millis(100)).await;

    handle.stop_shader()?;
    handle.stop_shader()?;
    assert_eq!(handle.shader_state()?, ShaderState::Stopped);
    let frames = ctx.render_requests();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(ctx.render_requests(), frames);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_run_time_freezes_last_frame() -> Result<()> {
    let (ctx, shared) = contexts();
    let config = CanvasConfig::default()
        .with_size(1, 1)
        .with_shader_timing(10, Some(Duration::from_millis(250)));
    let shader: ShaderFn = Box::new(|_, _, _, _, _, _| ShaderColor::rgb(0.0, 0.0, 255.0));
    let handle = handle_with(config, shader)?;
    handle.start_shader(Arc::clone(&shared))?;

    sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.shader_state()?, ShaderState::Finished);
    let frames = ctx.render_requests();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(ctx.render_requests(), frames);

    let mut canvas = handle.lock()?;
    assert!(canvas.image().is_some());
    assert!(canvas.buffer().drawing().iter().all(|&p| p == 0));

    let area = Rect::new(0, 0, 1, 1);
    let mut buf = Buffer::empty(area);
    canvas.render(area, Style::default(), &mut buf, shared.as_ref());
    assert_eq!(buf[(0, 0)].symbol(), "█");
    assert_eq!(buf[(0, 0)].fg, TermColor::Rgb(0, 0, 255));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_resize_restarts_with_preserved_clock() -> Result<()> {
    let (_ctx, shared) = contexts();
    let handle = handle_with(CanvasConfig::default().with_size(2, 2), pulse())?;
    handle.start_shader(shared)?;
    sleep(Duration::from_millis(200)).await;

    handle.set_size(4, 3)?;
    {
        let canvas = handle.lock()?;
        assert_eq!(canvas.shader_state(), ShaderState::Running);
        assert_eq!(canvas.buffer().len(), 4 * 3 * 6);
        assert!(canvas.shader_runtime().elapsed(Instant::now()) >= Duration::from_millis(200));
    }

    sleep(Duration::from_millis(100)).await;
    let canvas = handle.lock()?;
    // a frame at the new size was committed
    assert!(canvas.get_pixel(7, 8).is_some_and(|c| c != Color::TRANSPARENT));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_render_auto_starts_shader() -> Result<()> {
    let (ctx, shared) = contexts();
    let handle = handle_with(CanvasConfig::default().with_size(1, 1), pulse())?;
    let area = Rect::new(0, 0, 1, 1);
    let mut buf = Buffer::empty(area);
    handle.render(area, Style::default(), &mut buf, &shared)?;
    assert_eq!(handle.shader_state()?, ShaderState::Running);

    sleep(Duration::from_millis(100)).await;
    assert!(ctx.render_requests() > 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_denied_capability_blocks_auto_start() -> Result<()> {
    let ctx = Arc::new(StaticContext::default().with_shader_permission(false));
    let shared: Arc<dyn RenderContext> = ctx.clone();
    let handle = handle_with(CanvasConfig::default().with_size(1, 1), pulse())?;
    let area = Rect::new(0, 0, 1, 1);
    let mut buf = Buffer::empty(area);
    handle.render(area, Style::default(), &mut buf, &shared)?;
    handle.render(area, Style::default(), &mut buf, &shared)?;
    assert_eq!(handle.shader_state()?, ShaderState::Idle);

    ctx.set_shader_permission(true);
    handle.render(area, Style::default(), &mut buf, &shared)?;
    assert_eq!(handle.shader_state()?, ShaderState::Running);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_panicking_shader_ends_loop() -> Result<()> {
    let (ctx, shared) = contexts();
    let shader: ShaderFn = Box::new(|x, _, _, _, _, _| {
        assert!(x < 1, "shader blew up");
        ShaderColor::rgb(1.0, 1.0, 1.0)
    });
    let handle = handle_with(CanvasConfig::default().with_size(1, 1), shader)?;
    handle.start_shader(shared)?;
    sleep(Duration::from_millis(200)).await;

    assert_eq!(handle.shader_state()?, ShaderState::Finished);
    assert_eq!(ctx.render_requests(), 1);
    // the lock survives a panicking callback
    assert!(handle.lock().is_ok());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_mouse_reaches_shader() -> Result<()> {
    let (_ctx, shared) = contexts();
    let shader: ShaderFn = Box::new(|x, y, _, _, _, utils| match utils.mouse() {
        Some((mx, my)) if mx == x as i32 && my == y as i32 => ShaderColor::rgb(255.0, 255.0, 255.0),
        _ => ShaderColor::rgb(0.0, 0.0, 0.0),
    });
    let handle = handle_with(CanvasConfig::default().with_size(1, 1), shader)?;
    handle.lock()?.set_mouse_position(Some((1, 2)));
    handle.start_shader(shared)?;
    sleep(Duration::from_millis(50)).await;

    let canvas = handle.lock()?;
    assert_eq!(canvas.get_pixel(1, 2), Some(Color::WHITE));
    assert_eq!(canvas.get_pixel(0, 0), Some(Color::BLACK));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_ends_task() -> Result<()> {
    let (ctx, shared) = contexts();
    let handle = handle_with(CanvasConfig::default().with_size(1, 1), pulse())?;
    handle.start_shader(shared)?;
    sleep(Duration::from_millis(100)).await;
    drop(handle);

    let frames = ctx.render_requests();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(ctx.render_requests(), frames);
    Ok(())
}
