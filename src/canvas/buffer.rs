//! Layered pixel storage
//!
//! A [`PixelBuffer`] owns three equally sized packed-RGBA planes:
//! - the drawing layer, written by primitives, paint callbacks and shaders
//! - the image layer, written by the image compositor
//! - the previous frame, used for change detection
//!
//! The drawing layer wins over the image layer wherever it is not transparent.

use tracing::debug;

use super::color::{pack_rgba, unpack_rgba, TRANSPARENT};
use crate::errors::{CanvasError, Result};

/// How the drawing layer is carried over after a frame is marked clean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedrawPolicy {
    /// Draw calls accumulate on top of the previous frame
    #[default]
    Incremental,
    /// Every pixel is rewritten each frame (shaders, video); nothing is carried over
    FullFrame,
}

/// Which plane a composited pixel came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Drawing,
    Image,
    Empty,
}

/// Drawing + image + previous-frame planes of identical size
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    drawing: Vec<u32>,
    image: Vec<u32>,
    previous: Vec<u32>,
    dirty: bool,
    policy: RedrawPolicy,
    /// Set when a full-frame clean skipped the copy back; the last finished
    /// frame then lives in `previous`
    stale_drawing: bool,
}

impl PixelBuffer {
    /// Allocate a transparent buffer; zero dimensions are rejected
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let len = checked_len(width, height)?;
        Ok(Self {
            width,
            height,
            drawing: vec![TRANSPARENT; len],
            image: vec![TRANSPARENT; len],
            previous: vec![TRANSPARENT; len],
            dirty: true,
            policy: RedrawPolicy::Incremental,
            stale_drawing: false,
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

    /// Number of pixels in each plane
    #[inline]
    pub fn len(&self) -> usize {
        self.drawing.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.drawing.is_empty()
    }

    /// The plane holding the current drawing content
    #[inline]
    fn visible(&self) -> &[u32] {
        if self.stale_drawing {
            &self.previous
        } else {
            &self.drawing
        }
    }

    /// Bring the last finished frame back before a partial write
    #[inline]
    fn restore_drawing(&mut self) {
        if self.stale_drawing {
            self.drawing.copy_from_slice(&self.previous);
            self.stale_drawing = false;
        }
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as u32, y as u32);
        if x < self.width && y < self.height {
            Some((y * self.width + x) as usize)
        } else {
            None
        }
    }

    /// Write a packed pixel into the drawing layer; out-of-bounds is a no-op
    #[inline]
    pub fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if let Some(idx) = self.index(x, y) {
            self.restore_drawing();
            self.drawing[idx] = color;
            self.dirty = true;
        }
    }

    /// Read a packed pixel from the drawing layer
    #[inline]
    pub fn get_pixel(&self, x: i32, y: i32) -> Option<u32> {
        self.index(x, y).map(|idx| self.visible()[idx])
    }

    /// Read a packed pixel from the image layer
    #[inline]
    pub fn get_image_pixel(&self, x: i32, y: i32) -> Option<u32> {
        self.index(x, y).map(|idx| self.image[idx])
    }

    /// Clear the drawing layer to transparent
    pub fn clear(&mut self) {
        self.drawing.fill(TRANSPARENT);
        self.stale_drawing = false;
        self.dirty = true;
    }

    /// Clear a rectangle of the drawing layer, clipped to the buffer
    pub fn clear_rect(&mut self, x: i32, y: i32, width: u32, height: u32) {
        let x0 = x.max(0) as i64;
        let y0 = y.max(0) as i64;
        let x1 = (i64::from(x) + i64::from(width)).min(i64::from(self.width));
        let y1 = (i64::from(y) + i64::from(height)).min(i64::from(self.height));
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        self.restore_drawing();
        for row in y0..y1 {
            let start = (row * i64::from(self.width) + x0) as usize;
            let end = (row * i64::from(self.width) + x1) as usize;
            self.drawing[start..end].fill(TRANSPARENT);
        }
        self.dirty = true;
    }

    /// Replace the whole image layer; the length must match the buffer
    pub fn set_image_layer(&mut self, pixels: Vec<u32>) -> Result<()> {
        if pixels.len() != self.image.len() {
            return Err(CanvasError::invalid(
                "image_layer",
                format!("expected {} pixels, got {}", self.image.len(), pixels.len()),
            ));
        }
        self.image = pixels;
        self.dirty = true;
        Ok(())
    }

    /// Clear the image layer to transparent
    pub fn clear_image(&mut self) {
        self.image.fill(TRANSPARENT);
        self.dirty = true;
    }

    pub fn drawing(&self) -> &[u32] {
        self.visible()
    }

    /// Mutable drawing layer; marks the buffer dirty
    pub fn drawing_mut(&mut self) -> &mut [u32] {
        self.restore_drawing();
        self.dirty = true;
        &mut self.drawing
    }

    /// Overwrite the whole drawing layer with a finished frame
    pub fn commit_frame(&mut self, frame: &[u32]) -> Result<()> {
        if frame.len() != self.drawing.len() {
            return Err(CanvasError::invalid(
                "drawing_layer",
                format!("expected {} pixels, got {}", self.drawing.len(), frame.len()),
            ));
        }
        self.drawing.copy_from_slice(frame);
        self.stale_drawing = false;
        self.dirty = true;
        Ok(())
    }

    pub fn image(&self) -> &[u32] {
        &self.image
    }

    pub fn previous(&self) -> &[u32] {
        &self.previous
    }

    /// Composited pixel at a flat index plus the layer it came from
    #[inline]
    pub fn composite_at(&self, idx: usize) -> (u32, Layer) {
        let d = self.visible()[idx];
        if d != TRANSPARENT {
            return (d, Layer::Drawing);
        }
        let i = self.image[idx];
        if i != TRANSPARENT {
            (i, Layer::Image)
        } else {
            (TRANSPARENT, Layer::Empty)
        }
    }

    /// Composited pixel at a coordinate (drawing wins over image)
    #[inline]
    pub fn composite_pixel(&self, x: i32, y: i32) -> Option<u32> {
        self.index(x, y).map(|idx| self.composite_at(idx).0)
    }

    /// Write the composite of both layers into `out`
    pub fn composite_into(&self, out: &mut Vec<u32>) {
        out.clear();
        out.extend(
            self.visible()
                .iter()
                .zip(&self.image)
                .map(|(&d, &i)| if d != TRANSPARENT { d } else { i }),
        );
    }

    /// Write the composite as RGBA bytes (transparent pixels become `[0; 4]`)
    pub fn composite_rgba_into(&self, out: &mut Vec<u8>) {
        out.clear();
        out.reserve(self.len() * 4);
        for idx in 0..self.len() {
            let (r, g, b, a) = unpack_rgba(self.composite_at(idx).0);
            out.extend_from_slice(&[r, g, b, a]);
        }
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flag the buffer as changed without touching pixels
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn policy(&self) -> RedrawPolicy {
        self.policy
    }

    /// Switch redraw policy
    ///
    /// Leaving `FullFrame` restores the last finished frame into the
    /// drawing plane if a clean skipped the copy.
    pub fn set_policy(&mut self, policy: RedrawPolicy) {
        if policy == RedrawPolicy::Incremental {
            self.restore_drawing();
        }
        self.policy = policy;
    }

    /// True when the drawing layer differs from the last clean frame
    pub fn changed_since_clean(&self) -> bool {
        !self.stale_drawing && self.drawing != self.previous
    }

    /// End a frame: the drawing layer becomes the previous frame
    ///
    /// The planes are swapped in O(1). Under [`RedrawPolicy::Incremental`]
    /// the finished frame is copied back so later draws build on it; under
    /// [`RedrawPolicy::FullFrame`] reads keep seeing the finished frame until
    /// the next write.
    pub fn mark_clean(&mut self) {
        if !self.stale_drawing {
            std::mem::swap(&mut self.drawing, &mut self.previous);
            self.copy_previous_to_current();
        }
        self.dirty = false;
    }

    fn copy_previous_to_current(&mut self) {
        match self.policy {
            RedrawPolicy::Incremental => self.drawing.copy_from_slice(&self.previous),
            RedrawPolicy::FullFrame => self.stale_drawing = true,
        }
    }

    /// Reallocate every plane; contents are discarded
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let len = checked_len(width, height)?;
        debug!("Resizing pixel buffer {}x{} -> {}x{}", self.width, self.height, width, height);
        self.width = width;
        self.height = height;
        self.drawing = vec![TRANSPARENT; len];
        self.image = vec![TRANSPARENT; len];
        self.previous = vec![TRANSPARENT; len];
        self.stale_drawing = false;
        self.dirty = true;
        Ok(())
    }

    /// Fill the drawing layer from RGBA bytes (length must be `len() * 4`)
    pub fn load_drawing_rgba(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.len() * 4 {
            return Err(CanvasError::invalid(
                "drawing_layer",
                format!("expected {} bytes, got {}", self.len() * 4, bytes.len()),
            ));
        }
        self.stale_drawing = false;
        for (dst, px) in self.drawing.iter_mut().zip(bytes.chunks_exact(4)) {
            *dst = if px[3] == 0 {
                TRANSPARENT
            } else {
                pack_rgba(px[0], px[1], px[2], px[3])
            };
        }
        self.dirty = true;
        Ok(())
    }
}

fn checked_len(width: u32, height: u32) -> Result<usize> {
    if width == 0 {
        return Err(CanvasError::invalid("width", "buffer width must be greater than zero"));
    }
    if height == 0 {
        return Err(CanvasError::invalid("height", "buffer height must be greater than zero"));
    }
    (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| CanvasError::invalid("size", format!("{width}x{height} overflows")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::color::Color;

    #[test]
    fn test_new_buffer() {
        let buf = PixelBuffer::new(100, 50).unwrap();
        assert_eq!(buf.width(), 100);
        assert_eq!(buf.height(), 50);
        assert_eq!(buf.len(), 5000);
        assert_eq!(buf.image().len(), 5000);
        assert_eq!(buf.previous().len(), 5000);
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(PixelBuffer::new(0, 10).is_err());
        let mut buf = PixelBuffer::new(4, 4).unwrap();
        assert!(buf.resize(4, 0).is_err());
        assert_eq!((buf.width(), buf.height()), (4, 4));
    }

    #[test]
    fn test_set_get_pixel() {
        let mut buf = PixelBuffer::new(10, 10).unwrap();
        buf.set_pixel(5, 5, Color::RED.pack());
        assert_eq!(buf.get_pixel(5, 5), Some(Color::RED.pack()));
    }

    #[test]
    fn test_out_of_bounds_is_noop() {
        let mut buf = PixelBuffer::new(8, 6).unwrap();
        buf.mark_clean();
        let before = buf.drawing().to_vec();
        for (x, y) in [(-1, 0), (0, -1), (8, 0), (0, 6), (i32::MAX, i32::MAX), (i32::MIN, 3)] {
            buf.set_pixel(x, y, Color::WHITE.pack());
            assert_eq!(buf.get_pixel(x, y), None);
        }
        assert_eq!(buf.drawing(), &before[..]);
        assert!(!buf.is_dirty());
    }

    #[test]
    fn test_clear_rect_clips() {
        let mut buf = PixelBuffer::new(4, 4).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                buf.set_pixel(x, y, Color::WHITE.pack());
            }
        }
        buf.clear_rect(-2, -2, 4, 4);
        assert_eq!(buf.get_pixel(0, 0), Some(TRANSPARENT));
        assert_eq!(buf.get_pixel(1, 1), Some(TRANSPARENT));
        assert_eq!(buf.get_pixel(2, 2), Some(Color::WHITE.pack()));
        buf.clear_rect(10, 10, 5, 5);
    }

    #[test]
    fn test_drawing_wins_over_image() {
        let mut buf = PixelBuffer::new(2, 1).unwrap();
        buf.set_image_layer(vec![Color::BLUE.pack(), Color::BLUE.pack()]).unwrap();
        buf.set_pixel(0, 0, Color::RED.pack());
        assert_eq!(buf.composite_at(0), (Color::RED.pack(), Layer::Drawing));
        assert_eq!(buf.composite_at(1), (Color::BLUE.pack(), Layer::Image));
    }

    #[test]
    fn test_mark_clean_incremental_keeps_content() {
        let mut buf = PixelBuffer::new(3, 3).unwrap();
        buf.set_pixel(1, 1, Color::GREEN.pack());
        assert!(buf.changed_since_clean());
        buf.mark_clean();
        assert_eq!(buf.get_pixel(1, 1), Some(Color::GREEN.pack()));
        assert_eq!(buf.previous()[4], Color::GREEN.pack());
        assert!(!buf.changed_since_clean());
    }

    #[test]
    fn test_mark_clean_full_frame_skips_copy() {
        let mut buf = PixelBuffer::new(3, 3).unwrap();
        buf.set_policy(RedrawPolicy::FullFrame);
        buf.set_pixel(1, 1, Color::GREEN.pack());
        buf.mark_clean();
        assert_eq!(buf.previous()[4], Color::GREEN.pack());
        assert_eq!(buf.get_pixel(1, 1), Some(Color::GREEN.pack()));
        assert!(!buf.changed_since_clean());

        buf.set_policy(RedrawPolicy::Incremental);
        assert_eq!(buf.get_pixel(1, 1), Some(Color::GREEN.pack()));
    }

    #[test]
    fn test_full_frame_reads_last_committed_frame() {
        let red = vec![Color::RED.pack(); 4];
        let blue = vec![Color::BLUE.pack(); 4];
        let mut buf = PixelBuffer::new(2, 2).unwrap();
        buf.set_policy(RedrawPolicy::FullFrame);

        buf.commit_frame(&red).unwrap();
        buf.mark_clean();
        buf.commit_frame(&blue).unwrap();
        buf.mark_clean();

        // cleaning again without a new frame keeps the latest one visible
        for _ in 0..3 {
            let mut out = Vec::new();
            buf.composite_into(&mut out);
            assert_eq!(out, blue);
            buf.mark_clean();
        }
        assert_eq!(buf.drawing(), &blue[..]);
    }

    #[test]
    fn test_full_frame_partial_write_builds_on_last_frame() {
        let mut buf = PixelBuffer::new(2, 1).unwrap();
        buf.set_policy(RedrawPolicy::FullFrame);
        buf.commit_frame(&[Color::RED.pack(), Color::RED.pack()]).unwrap();
        buf.mark_clean();
        buf.commit_frame(&[Color::BLUE.pack(), Color::BLUE.pack()]).unwrap();
        buf.mark_clean();

        buf.set_pixel(0, 0, Color::GREEN.pack());
        assert!(buf.changed_since_clean());
        assert_eq!(buf.drawing(), &[Color::GREEN.pack(), Color::BLUE.pack()][..]);
        assert!(buf.commit_frame(&[0; 3]).is_err());
    }

    #[test]
    fn test_resize_reallocates_all_planes() {
        let mut buf = PixelBuffer::new(2, 2).unwrap();
        buf.set_pixel(0, 0, Color::WHITE.pack());
        buf.resize(6, 9).unwrap();
        assert_eq!(buf.len(), 54);
        assert_eq!(buf.image().len(), 54);
        assert_eq!(buf.previous().len(), 54);
        assert_eq!(buf.get_pixel(0, 0), Some(TRANSPARENT));
    }

    #[test]
    fn test_image_layer_length_checked() {
        let mut buf = PixelBuffer::new(2, 2).unwrap();
        assert!(buf.set_image_layer(vec![0; 3]).is_err());
    }
}
