//! End-to-end render tests: canvas in, cells or payloads out.

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color as TermColor, Style};
use rstest::rstest;

use termcanvas::canvas::caps::{ColorDepth, ProtocolCaps, RasterProtocol};
use termcanvas::canvas::context::StaticContext;
use termcanvas::canvas::image::{LoadedImage, ObjectFit};
use termcanvas::canvas::rasterizer::{RasterOutput, SkipReason};
use termcanvas::canvas::{Canvas, Color, RenderContext, TerminalCaps};
use termcanvas::config::{CanvasConfig, CanvasOptions, CharacterStyle, GfxMode};
use termcanvas::errors::Result;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn render(canvas: &mut Canvas, ctx: &dyn RenderContext) -> (RasterOutput, Buffer) {
    let (cols, rows) = canvas.size();
    let area = Rect::new(0, 0, cols, rows);
    let mut buf = Buffer::empty(area);
    let out = canvas.render(area, Style::default(), &mut buf, ctx);
    (out, buf)
}

fn raster_caps() -> TerminalCaps {
    TerminalCaps::default()
        .with_protocol(RasterProtocol::Sixel, ProtocolCaps::supported(8, 16))
        .with_protocol(RasterProtocol::Kitty, ProtocolCaps::supported(8, 16))
        .with_protocol(RasterProtocol::ITerm2, ProtocolCaps::supported(8, 16))
}

// ==================== Character Modes ====================

#[test]
fn test_solid_white_sextant_canvas() -> Result<()> {
    let options = CanvasOptions::from_toml_str("width = 10\nheight = 5\ngfx_mode = \"sextant\"")?;
    let ctx = StaticContext::default();
    let mut canvas = Canvas::from_options(&options, ctx.terminal_caps())?;
    let (w, h) = (canvas.buffer().width(), canvas.buffer().height());
    canvas.painter().fill_rect(0.0, 0.0, f64::from(w), f64::from(h), Color::parse("#FFFFFF")?);

    let (out, buf) = render(&mut canvas, &ctx);
    assert_eq!(out, RasterOutput::Cells(50));
    for y in 0..5 {
        for x in 0..10 {
            let cell = &buf[(x, y)];
            assert_eq!(cell.symbol(), "█", "cell ({x}, {y})");
            assert_eq!(cell.fg, TermColor::Rgb(255, 255, 255));
        }
    }
    Ok(())
}

#[test]
fn test_two_by_two_image_quantizes_to_right_half() -> Result<()> {
    let ctx = StaticContext::default();
    let config = CanvasConfig::default().with_size(1, 1).with_fit(ObjectFit::Fill);
    let mut canvas = Canvas::new(config, ctx.terminal_caps())?;
    #[rustfmt::skip]
    let pixels = vec![
        255, 0, 0, 255,     0, 255, 0, 255,
        0, 0, 255, 255,     255, 255, 255, 255,
    ];
    canvas.set_image(LoadedImage::new(2, 2, pixels, 4)?);

    let (out, buf) = render(&mut canvas, &ctx);
    assert_eq!(out, RasterOutput::Cells(1));
    let cell = &buf[(0, 0)];
    // green, green and white are brighter than the red/blue midpoint
    assert_eq!(cell.symbol(), "▐");
    assert_eq!(cell.fg, TermColor::Rgb(85, 255, 85));
    assert_eq!(cell.bg, TermColor::Rgb(170, 0, 85));
    Ok(())
}

#[test]
fn test_drawing_over_image_uses_layer_colors() -> Result<()> {
    let ctx = StaticContext::default();
    let config = CanvasConfig::default().with_size(1, 1).with_fit(ObjectFit::Fill);
    let mut canvas = Canvas::new(config, ctx.terminal_caps())?;
    canvas.set_image(LoadedImage::new(1, 1, vec![0, 0, 255], 3)?);
    canvas.painter().fill_rect(0.0, 0.0, 1.0, 3.0, Color::YELLOW);

    let (_, buf) = render(&mut canvas, &ctx);
    let cell = &buf[(0, 0)];
    assert_eq!(cell.symbol(), "▌");
    assert_eq!(cell.fg, TermColor::Rgb(255, 255, 0));
    assert_eq!(cell.bg, TermColor::Rgb(0, 0, 255));
    Ok(())
}

#[rstest]
#[case(CharacterStyle::Block, " ")]
#[case(CharacterStyle::Pattern, "#")]
#[case(CharacterStyle::Luma, "@")]
fn test_character_styles_on_solid_fill(#[case] style: CharacterStyle, #[case] glyph: &str) -> Result<()> {
    let ctx = StaticContext::default();
    let mode = GfxMode::Character {
        style,
        char_aspect_ratio: 0.5,
    };
    let mut canvas = Canvas::new(CanvasConfig::default().with_size(3, 2).with_mode(mode), ctx.terminal_caps())?;
    canvas.painter().fill_rect(0.0, 0.0, 6.0, 6.0, Color::WHITE);

    let (out, buf) = render(&mut canvas, &ctx);
    assert_eq!(out, RasterOutput::Cells(6));
    assert_eq!(buf[(2, 1)].symbol(), glyph);
    Ok(())
}

#[test]
fn test_render_respects_clip() -> Result<()> {
    let ctx = StaticContext::default().with_clip(Rect::new(0, 0, 2, 1));
    let mut canvas = Canvas::new(CanvasConfig::default().with_size(4, 2), ctx.terminal_caps())?;
    canvas.painter().fill_rect(0.0, 0.0, 8.0, 6.0, Color::RED);

    let (out, buf) = render(&mut canvas, &ctx);
    assert_eq!(out, RasterOutput::Cells(2));
    assert_eq!(buf[(1, 0)].symbol(), "█");
    assert_eq!(buf[(2, 0)].symbol(), " ");
    assert_eq!(buf[(0, 1)].symbol(), " ");
    Ok(())
}

#[test]
fn test_out_of_bounds_pixels_are_ignored() -> Result<()> {
    let mut canvas = Canvas::new(CanvasConfig::default().with_size(2, 2), &TerminalCaps::default())?;
    let before = canvas.buffer().drawing().to_vec();
    for (x, y) in [(-1, 0), (0, -1), (4, 0), (0, 6), (i32::MIN, i32::MAX), (i32::MAX, 3)] {
        canvas.set_pixel(x, y, Color::WHITE);
        assert_eq!(canvas.get_pixel(x, y), None);
    }
    assert_eq!(canvas.buffer().drawing(), &before[..]);
    Ok(())
}

// ==================== Resize ====================

#[rstest]
#[case(1, 6)]
#[case(2, 24)]
#[case(3, 54)]
fn test_resize_invariant(#[case] scale: u32, #[case] pixels_per_cell: usize) -> Result<()> {
    let ctx = StaticContext::new(TerminalCaps::default().with_colors(ColorDepth::Color16));
    let mut config = CanvasConfig::default().with_size(4, 3).with_fit(ObjectFit::Fill);
    config.scale = scale;
    let mut canvas = Canvas::new(config, ctx.terminal_caps())?;
    canvas.set_image(LoadedImage::new(1, 1, vec![10, 200, 90], 3)?);
    render(&mut canvas, &ctx);
    assert!(canvas.has_valid_caches());

    canvas.set_size(7, 5)?;
    assert_eq!(canvas.buffer().len(), 7 * 5 * pixels_per_cell);
    assert!(!canvas.has_valid_caches());

    // the image comes back at the new size
    let (out, _) = render(&mut canvas, &ctx);
    assert_eq!(out, RasterOutput::Cells(35));
    Ok(())
}

#[test]
fn test_raster_resize_uses_cell_pixels() -> Result<()> {
    let ctx = StaticContext::new(raster_caps());
    let config = CanvasConfig::default().with_size(4, 2).with_mode(GfxMode::Raster {
        protocol: RasterProtocol::Sixel,
    });
    let mut canvas = Canvas::new(config, ctx.terminal_caps())?;
    canvas.set_size(3, 3)?;
    assert_eq!(canvas.buffer().len(), 3 * 8 * 3 * 16);
    assert!(!canvas.has_valid_caches());
    Ok(())
}

// ==================== Raster Modes ====================

#[rstest]
#[case(RasterProtocol::Sixel, "\x1bP0;1;0q")]
#[case(RasterProtocol::Kitty, "\x1b_Ga=T,f=32,o=z,")]
#[case(RasterProtocol::ITerm2, "\x1b]1337;File=inline=1;")]
fn test_raster_payloads(#[case] protocol: RasterProtocol, #[case] prefix: &str) -> Result<()> {
    let ctx = StaticContext::new(raster_caps());
    let config = CanvasConfig::default()
        .with_size(4, 2)
        .with_mode(GfxMode::Raster { protocol })
        .with_fit(ObjectFit::Fill);
    let mut canvas = Canvas::new(config, ctx.terminal_caps())?;
    canvas.set_image(LoadedImage::new(2, 1, vec![255, 0, 0, 0, 0, 255], 3)?);

    let (out, buf) = render(&mut canvas, &ctx);
    let payload = out.payload().expect("raster payload");
    assert_eq!(payload.protocol, protocol);
    assert_eq!(payload.bounds, Rect::new(0, 0, 4, 2));
    assert!(payload.data.starts_with(prefix), "{:?}", &payload.data[..20]);
    // raster modes leave the cell grid alone
    assert_eq!(buf[(0, 0)].symbol(), " ");
    assert!(canvas.has_valid_caches());

    let mut sink = Vec::new();
    payload.write_to(&mut sink)?;
    assert!(sink.ends_with(payload.data.as_bytes()));
    Ok(())
}

#[test]
fn test_unsupported_protocol_falls_back_to_sextant() -> Result<()> {
    init_tracing();
    let ctx = StaticContext::default();
    let options = CanvasOptions::from_json_str(r#"{"width": 2, "height": 1, "gfxMode": "kitty"}"#)?;
    let mut canvas = Canvas::from_options(&options, ctx.terminal_caps())?;
    assert_eq!(canvas.rasterizer_name(), "Sextant");
    canvas.painter().fill_rect(0.0, 0.0, 4.0, 3.0, Color::CYAN);

    let (out, buf) = render(&mut canvas, &ctx);
    assert_eq!(out, RasterOutput::Cells(2));
    assert_eq!(buf[(0, 0)].symbol(), "█");
    Ok(())
}

#[test]
fn test_protocol_lost_mid_session_is_skipped() -> Result<()> {
    init_tracing();
    let config = CanvasConfig::default().with_size(2, 1).with_mode(GfxMode::Raster {
        protocol: RasterProtocol::Kitty,
    });
    let mut canvas = Canvas::new(config, &raster_caps())?;
    canvas.painter().fill_rect(0.0, 0.0, 16.0, 16.0, Color::RED);

    let gone = StaticContext::default();
    let (out, _) = render(&mut canvas, &gone);
    assert_eq!(out, RasterOutput::Skipped(SkipReason::Unsupported));

    let back = StaticContext::new(raster_caps());
    let (out, _) = render(&mut canvas, &back);
    assert!(out.payload().is_some());
    Ok(())
}

#[test]
fn test_raster_payload_outside_clip_is_skipped() -> Result<()> {
    let ctx = StaticContext::new(raster_caps()).with_clip(Rect::new(0, 0, 3, 2));
    let config = CanvasConfig::default().with_size(4, 2).with_mode(GfxMode::Raster {
        protocol: RasterProtocol::ITerm2,
    });
    let mut canvas = Canvas::new(config, ctx.terminal_caps())?;
    canvas.painter().fill_rect(0.0, 0.0, 32.0, 32.0, Color::GREEN);

    let (out, _) = render(&mut canvas, &ctx);
    assert_eq!(out, RasterOutput::Skipped(SkipReason::OutsideClip));
    Ok(())
}
