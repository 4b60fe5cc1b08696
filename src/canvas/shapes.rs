//! Geometric primitives for canvas drawing
//!
//! Coordinates are `f64` but every algorithm floors its inputs before
//! stepping, so fractional positions never desynchronize the integer
//! Bresenham/midpoint state machines. Geometry is clipped to the buffer in
//! floating point first; integer stepping only ever sees a bounded range.

use super::buffer::PixelBuffer;
use super::color::Color;

/// 2D point in pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    fn floored(self) -> (i64, i64) {
        (self.x.floor() as i64, self.y.floor() as i64)
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    #[inline]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }
}

/// Shape trait for drawable primitives
pub trait Shape {
    /// Draw the shape into the drawing layer
    fn rasterize(&self, buf: &mut PixelBuffer);

    /// Bounding box of the shape
    fn bounds(&self) -> Bounds;
}

#[inline]
fn plot(buf: &mut PixelBuffer, x: i64, y: i64, color: u32) {
    if let (Ok(x), Ok(y)) = (i32::try_from(x), i32::try_from(y)) {
        buf.set_pixel(x, y, color);
    }
}

/// Plot a floating point position if it lands inside the buffer
#[inline]
fn plot_f(buf: &mut PixelBuffer, x: f64, y: f64, color: u32) {
    if x >= 0.0 && y >= 0.0 && x < f64::from(buf.width()) && y < f64::from(buf.height()) {
        plot(buf, x as i64, y as i64, color);
    }
}

/// Clamp a floored coordinate to one pixel outside `[0, size)`
#[inline]
fn clamp_px(v: f64, size: u32) -> i64 {
    if v.is_nan() {
        return -1;
    }
    v.clamp(-1.0, f64::from(size)) as i64
}

/// Horizontal span with floating point ends
fn hspan_f(buf: &mut PixelBuffer, x0: f64, x1: f64, y: f64, color: u32) {
    if y.is_nan() || y < 0.0 || y >= f64::from(buf.height()) {
        return;
    }
    let w = buf.width();
    hspan(buf, clamp_px(x0, w), clamp_px(x1, w), y as i64, color);
}

/// Radius above which conics are scanned per visible row and column
/// instead of stepped point by point
const MIDPOINT_LIMIT: f64 = 32_768.0;

/// True when the box `center ± radius` overlaps the buffer
fn touches(buf: &PixelBuffer, cx: f64, cy: f64, rx: f64, ry: f64) -> bool {
    !(cx + rx < 0.0 || cy + ry < 0.0 || cx - rx >= f64::from(buf.width()) || cy - ry >= f64::from(buf.height()))
}

/// Fill every visible row of a conic given its half width at row offset `dy`
fn fill_rows(buf: &mut PixelBuffer, cx: f64, cy: f64, ry: f64, color: u32, half_width: impl Fn(f64) -> f64) {
    let top = clamp_px((cy - ry).max(0.0), buf.height());
    let bottom = clamp_px((cy + ry).min(f64::from(buf.height()) - 1.0), buf.height());
    for y in top..=bottom {
        let dy = y as f64 - cy;
        if dy.abs() > ry {
            continue;
        }
        let dx = half_width(dy).floor();
        hspan_f(buf, cx - dx, cx + dx, y as f64, color);
    }
}

/// Outline of a very large axis-aligned ellipse, scanned over the buffer
fn outline_scan(buf: &mut PixelBuffer, cx: f64, cy: f64, rx: f64, ry: f64, color: u32) {
    let along = |offset: f64, r: f64, other: f64| {
        let t = 1.0 - (offset / r) * (offset / r);
        (other * t.max(0.0).sqrt()).floor()
    };
    for y in 0..buf.height() {
        let dy = f64::from(y) - cy;
        if dy.abs() <= ry {
            let dx = along(dy, ry, rx);
            plot_f(buf, cx - dx, f64::from(y), color);
            plot_f(buf, cx + dx, f64::from(y), color);
        }
    }
    for x in 0..buf.width() {
        let dx = f64::from(x) - cx;
        if dx.abs() <= rx {
            let dy = along(dx, rx, ry);
            plot_f(buf, f64::from(x), cy - dy, color);
            plot_f(buf, f64::from(x), cy + dy, color);
        }
    }
}

/// Outcode for Cohen–Sutherland clipping against `[xmin, xmax] × [ymin, ymax]`
fn outcode(x: f64, y: f64, xmax: f64, ymax: f64) -> u8 {
    let mut code = 0;
    if x < -1.0 {
        code |= 1;
    } else if x > xmax {
        code |= 2;
    }
    if y < -1.0 {
        code |= 4;
    } else if y > ymax {
        code |= 8;
    }
    code
}

/// Clip a segment to the buffer plus a one pixel margin
///
/// The interpolation works on halved coordinates so segments spanning the
/// whole `f64` range do not overflow.
fn clip_segment(buf: &PixelBuffer, a: (f64, f64), b: (f64, f64)) -> Option<((f64, f64), (f64, f64))> {
    if ![a.0, a.1, b.0, b.1].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (xmax, ymax) = (f64::from(buf.width()), f64::from(buf.height()));
    let (mut a, mut b) = (a, b);
    for _ in 0..8 {
        let (ca, cb) = (outcode(a.0, a.1, xmax, ymax), outcode(b.0, b.1, xmax, ymax));
        if ca | cb == 0 {
            return Some((a, b));
        }
        if ca & cb != 0 {
            return None;
        }
        let (code, from, to) = if ca != 0 { (ca, a, b) } else { (cb, b, a) };
        let lerp = |p: f64, q: f64, t: f64| p * (1.0 - t) + q * t;
        let clipped = if code & 1 != 0 || code & 2 != 0 {
            let bound = if code & 1 != 0 { -1.0 } else { xmax };
            let t = (bound * 0.5 - from.0 * 0.5) / (to.0 * 0.5 - from.0 * 0.5);
            (bound, lerp(from.1, to.1, t))
        } else {
            let bound = if code & 4 != 0 { -1.0 } else { ymax };
            let t = (bound * 0.5 - from.1 * 0.5) / (to.1 * 0.5 - from.1 * 0.5);
            (lerp(from.0, to.0, t), bound)
        };
        if !clipped.0.is_finite() || !clipped.1.is_finite() {
            return None;
        }
        if ca != 0 {
            a = clipped;
        } else {
            b = clipped;
        }
    }
    None
}

fn hspan(buf: &mut PixelBuffer, x0: i64, x1: i64, y: i64, color: u32) {
    if y < 0 || y >= i64::from(buf.height()) {
        return;
    }
    let lo = x0.min(x1).max(0);
    let hi = x0.max(x1).min(i64::from(buf.width()) - 1);
    for x in lo..=hi {
        plot(buf, x, y, color);
    }
}

/// Line segment
#[derive(Debug, Clone, Copy)]
pub struct Line {
    pub start: Point,
    pub end: Point,
    pub color: Color,
}

impl Line {
    pub fn new(start: Point, end: Point, color: Color) -> Self {
        Self { start, end, color }
    }
}

impl Shape for Line {
    fn rasterize(&self, buf: &mut PixelBuffer) {
        let color = self.color.pack();
        let start = (self.start.x.floor(), self.start.y.floor());
        let end = (self.end.x.floor(), self.end.y.floor());
        let Some((start, end)) = clip_segment(buf, start, end) else {
            return;
        };
        let (mut x0, mut y0) = Point::new(start.0, start.1).floored();
        let (x1, y1) = Point::new(end.0, end.1).floored();

        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            plot(buf, x0, y0, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn bounds(&self) -> Bounds {
        let min_x = self.start.x.min(self.end.x);
        let min_y = self.start.y.min(self.end.y);
        let max_x = self.start.x.max(self.end.x);
        let max_y = self.start.y.max(self.end.y);
        Bounds::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

/// Circle
#[derive(Debug, Clone, Copy)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
    pub color: Color,
    pub filled: bool,
}

impl Circle {
    pub fn new(center: Point, radius: f64, color: Color) -> Self {
        Self {
            center,
            radius,
            color,
            filled: false,
        }
    }

    pub fn filled(mut self) -> Self {
        self.filled = true;
        self
    }
}

impl Shape for Circle {
    fn rasterize(&self, buf: &mut PixelBuffer) {
        let color = self.color.pack();
        let (cx, cy) = (self.center.x.floor(), self.center.y.floor());
        let r = self.radius.floor();
        if !cx.is_finite() || !cy.is_finite() || r.is_nan() || r < 0.0 || !touches(buf, cx, cy, r, r) {
            return;
        }

        if self.filled {
            fill_rows(buf, cx, cy, r, color, |dy| (r * r - dy * dy).max(0.0).sqrt());
            return;
        }
        if r > MIDPOINT_LIMIT {
            outline_scan(buf, cx, cy, r, r, color);
            return;
        }
        let (cx, cy, r) = (cx as i64, cy as i64, r as i64);

        // Midpoint circle, eight-way symmetric
        let mut x = r;
        let mut y = 0;
        let mut err = 1 - r;
        while x >= y {
            for (px, py) in [
                (x, y),
                (y, x),
                (-y, x),
                (-x, y),
                (-x, -y),
                (-y, -x),
                (y, -x),
                (x, -y),
            ] {
                plot(buf, cx + px, cy + py, color);
            }
            y += 1;
            if err < 0 {
                err += 2 * y + 1;
            } else {
                x -= 1;
                err += 2 * (y - x) + 1;
            }
        }
    }

    fn bounds(&self) -> Bounds {
        Bounds::new(
            self.center.x - self.radius,
            self.center.y - self.radius,
            self.radius * 2.0,
            self.radius * 2.0,
        )
    }
}

/// Axis-aligned ellipse
#[derive(Debug, Clone, Copy)]
pub struct Ellipse {
    pub center: Point,
    pub rx: f64,
    pub ry: f64,
    pub color: Color,
    pub filled: bool,
}

impl Ellipse {
    pub fn new(center: Point, rx: f64, ry: f64, color: Color) -> Self {
        Self {
            center,
            rx,
            ry,
            color,
            filled: false,
        }
    }

    pub fn filled(mut self) -> Self {
        self.filled = true;
        self
    }
}

impl Shape for Ellipse {
    fn rasterize(&self, buf: &mut PixelBuffer) {
        let color = self.color.pack();
        let (cx, cy) = (self.center.x.floor(), self.center.y.floor());
        let (rx, ry) = (self.rx.floor(), self.ry.floor());
        if !cx.is_finite() || !cy.is_finite() || rx.is_nan() || ry.is_nan() || rx < 0.0 || ry < 0.0 {
            return;
        }
        if !touches(buf, cx, cy, rx, ry) {
            return;
        }

        if self.filled {
            fill_rows(buf, cx, cy, ry, color, |dy| {
                if ry == 0.0 {
                    rx
                } else {
                    let q = if ry <= MIDPOINT_LIMIT {
                        (dy * dy) / (ry * ry)
                    } else {
                        (dy / ry) * (dy / ry)
                    };
                    let t = 1.0 - q;
                    if t <= 0.0 {
                        0.0
                    } else {
                        rx * t.sqrt()
                    }
                }
            });
            return;
        }
        if rx > MIDPOINT_LIMIT || ry > MIDPOINT_LIMIT {
            outline_scan(buf, cx, cy, rx, ry, color);
            return;
        }
        let (cx, cy, rx, ry) = (cx as i64, cy as i64, rx as i64, ry as i64);

        if rx == 0 || ry == 0 {
            hspan(buf, cx - rx, cx + rx, cy, color);
            for y in -ry..=ry {
                plot(buf, cx, cy + y, color);
            }
            return;
        }

        let plot4 = |buf: &mut PixelBuffer, x: i64, y: i64| {
            plot(buf, cx + x, cy + y, color);
            plot(buf, cx - x, cy + y, color);
            plot(buf, cx + x, cy - y, color);
            plot(buf, cx - x, cy - y, color);
        };

        let rx2 = (rx * rx) as f64;
        let ry2 = (ry * ry) as f64;
        let mut x: i64 = 0;
        let mut y: i64 = ry;
        let mut px = 0.0;
        let mut py = 2.0 * rx2 * y as f64;

        // Region 1: slope magnitude < 1
        let mut p = ry2 - rx2 * ry as f64 + 0.25 * rx2;
        while px < py {
            plot4(buf, x, y);
            x += 1;
            px += 2.0 * ry2;
            if p < 0.0 {
                p += ry2 + px;
            } else {
                y -= 1;
                py -= 2.0 * rx2;
                p += ry2 + px - py;
            }
        }

        // Region 2
        let xf = x as f64 + 0.5;
        let yf = (y - 1) as f64;
        p = ry2 * xf * xf + rx2 * yf * yf - rx2 * ry2;
        while y >= 0 {
            plot4(buf, x, y);
            y -= 1;
            py -= 2.0 * rx2;
            if p > 0.0 {
                p += rx2 - py;
            } else {
                x += 1;
                px += 2.0 * ry2;
                p += rx2 - py + px;
            }
        }
    }

    fn bounds(&self) -> Bounds {
        Bounds::new(
            self.center.x - self.rx,
            self.center.y - self.ry,
            self.rx * 2.0,
            self.ry * 2.0,
        )
    }
}

/// Rectangle, stroked or filled
#[derive(Debug, Clone, Copy)]
pub struct Rectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: Color,
    pub filled: bool,
}

impl Rectangle {
    pub fn new(x: f64, y: f64, width: f64, height: f64, color: Color) -> Self {
        Self {
            x,
            y,
            width,
            height,
            color,
            filled: false,
        }
    }

    pub fn filled(mut self) -> Self {
        self.filled = true;
        self
    }
}

impl Shape for Rectangle {
    fn rasterize(&self, buf: &mut PixelBuffer) {
        let color = self.color.pack();
        let (w, h) = (self.width.floor(), self.height.floor());
        if w.is_nan() || h.is_nan() || w <= 0.0 || h <= 0.0 {
            return;
        }
        let (bw, bh) = (buf.width(), buf.height());
        let (fx0, fy0) = (self.x.floor(), self.y.floor());
        let (fx1, fy1) = (fx0 + w - 1.0, fy0 + h - 1.0);
        if fx1 < 0.0 || fy1 < 0.0 || fx0 >= f64::from(bw) || fy0 >= f64::from(bh) {
            return;
        }
        let (x0, y0) = (clamp_px(fx0, bw), clamp_px(fy0, bh));
        let (x1, y1) = (clamp_px(fx1, bw), clamp_px(fy1, bh));

        if self.filled {
            let top = y0.max(0);
            let bottom = y1.min(i64::from(buf.height()) - 1);
            for y in top..=bottom {
                hspan(buf, x0, x1, y, color);
            }
            return;
        }

        hspan(buf, x0, x1, y0, color);
        hspan(buf, x0, x1, y1, color);
        for y in y0..=y1 {
            if y >= 0 && y < i64::from(buf.height()) {
                plot(buf, x0, y, color);
                plot(buf, x1, y, color);
            }
        }
    }

    fn bounds(&self) -> Bounds {
        Bounds::new(self.x, self.y, self.width, self.height)
    }
}

/// Drawing facade handed to paint callbacks
///
/// Carries the pixel aspect ratio so the `*_corrected` variants can draw in
/// visual space, where one unit on x looks as long as one unit on y.
pub struct Painter<'a> {
    buf: &'a mut PixelBuffer,
    aspect: f64,
}

impl<'a> Painter<'a> {
    pub fn new(buf: &'a mut PixelBuffer, pixel_aspect_ratio: f64) -> Self {
        let aspect = if pixel_aspect_ratio.is_finite() && pixel_aspect_ratio > 0.0 {
            pixel_aspect_ratio
        } else {
            1.0
        };
        Self { buf, aspect }
    }

    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    pub fn pixel_aspect_ratio(&self) -> f64 {
        self.aspect
    }

    pub fn buffer(&mut self) -> &mut PixelBuffer {
        self.buf
    }

    pub fn draw<S: Shape>(&mut self, shape: &S) {
        shape.rasterize(self.buf);
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: Color) {
        self.buf.set_pixel(x, y, color.pack());
    }

    pub fn get_pixel(&self, x: i32, y: i32) -> Option<Color> {
        self.buf.get_pixel(x, y).map(Color::unpack)
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn clear_rect(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.buf.clear_rect(x, y, width, height);
    }

    pub fn draw_line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, color: Color) {
        self.draw(&Line::new(Point::new(x0, y0), Point::new(x1, y1), color));
    }

    pub fn draw_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Color) {
        self.draw(&Rectangle::new(x, y, w, h, color));
    }

    pub fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Color) {
        self.draw(&Rectangle::new(x, y, w, h, color).filled());
    }

    pub fn draw_circle(&mut self, cx: f64, cy: f64, r: f64, color: Color) {
        self.draw(&Circle::new(Point::new(cx, cy), r, color));
    }

    pub fn fill_circle(&mut self, cx: f64, cy: f64, r: f64, color: Color) {
        self.draw(&Circle::new(Point::new(cx, cy), r, color).filled());
    }

    pub fn draw_ellipse(&mut self, cx: f64, cy: f64, rx: f64, ry: f64, color: Color) {
        self.draw(&Ellipse::new(Point::new(cx, cy), rx, ry, color));
    }

    pub fn fill_ellipse(&mut self, cx: f64, cy: f64, rx: f64, ry: f64, color: Color) {
        self.draw(&Ellipse::new(Point::new(cx, cy), rx, ry, color).filled());
    }

    /// Line whose endpoints are in visual space
    pub fn draw_line_corrected(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, color: Color) {
        let a = self.aspect;
        self.draw_line(x0 / a, y0, x1 / a, y1, color);
    }

    /// Circle that looks round; center in pixel space, radius in rows
    pub fn draw_circle_corrected(&mut self, cx: f64, cy: f64, r: f64, color: Color) {
        let rx = r / self.aspect;
        self.draw_ellipse(cx, cy, rx, r, color);
    }

    pub fn fill_circle_corrected(&mut self, cx: f64, cy: f64, r: f64, color: Color) {
        let rx = r / self.aspect;
        self.fill_ellipse(cx, cy, rx, r, color);
    }

    pub fn draw_ellipse_corrected(&mut self, cx: f64, cy: f64, rx: f64, ry: f64, color: Color) {
        let rx = rx / self.aspect;
        self.draw_ellipse(cx, cy, rx, ry, color);
    }

    /// Square that looks square; `size` is its height in pixels
    pub fn draw_square_corrected(&mut self, x: f64, y: f64, size: f64, color: Color) {
        let w = (size / self.aspect).round();
        self.draw_rect(x, y, w, size, color);
    }

    pub fn fill_square_corrected(&mut self, x: f64, y: f64, size: f64, color: Color) {
        let w = (size / self.aspect).round();
        self.fill_rect(x, y, w, size, color);
    }
}
