//! Shared geometry, pixel-buffer, and collaborator types.
//!
//! The engine never talks to a GUI toolkit, an audio decoder, or a file
//! format directly. Everything it needs from the outside world arrives
//! through the three traits at the bottom of this file.

use serde::{Deserialize, Serialize};

// ── Geometry ─────────────────────────────────────────────────────────────────

/// An axis-aligned pixel rectangle. `width`/`height` of zero means empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect { x, y, width, height }
    }

    pub fn empty() -> Self {
        Rect::default()
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// One past the rightmost column.
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// One past the bottom row.
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn intersected(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            Rect::empty()
        } else {
            Rect::new(x0, y0, x1 - x0, y1 - y0)
        }
    }
}

// ── Pixel buffer ─────────────────────────────────────────────────────────────

/// An RGBA pixel buffer, row-major, 4 bytes per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Image {
    /// A black, fully opaque image.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0])
    }

    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut pixels = vec![0u8; (width * height * 4) as usize];
        for px in pixels.chunks_exact_mut(4) {
            px[0] = rgb[0];
            px[1] = rgb[1];
            px[2] = rgb[2];
            px[3] = 255;
        }
        Image { width, height, pixels }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    pub fn set_rgb(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        debug_assert!(x < self.width && y < self.height);
        let idx = ((y * self.width + x) * 4) as usize;
        self.pixels[idx] = rgb[0];
        self.pixels[idx + 1] = rgb[1];
        self.pixels[idx + 2] = rgb[2];
        self.pixels[idx + 3] = 255;
    }

    #[inline]
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        debug_assert!(x < self.width && y < self.height);
        let idx = ((y * self.width + x) * 4) as usize;
        [self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]]
    }

    /// Shift the whole image horizontally by `dx` pixels (positive = right).
    /// Exposed pixels keep their previous contents; the caller is expected
    /// to repaint them.
    pub fn shift_horizontal(&mut self, dx: i32) {
        let w = self.width as usize;
        if dx == 0 || dx.unsigned_abs() as usize >= w {
            return;
        }
        let shift = dx.unsigned_abs() as usize * 4;
        let row_bytes = w * 4;
        for y in 0..self.height as usize {
            let row = &mut self.pixels[y * row_bytes..(y + 1) * row_bytes];
            if dx > 0 {
                row.copy_within(0..row_bytes - shift, shift);
            } else {
                row.copy_within(shift..row_bytes, 0);
            }
        }
    }

    /// Copy `count` columns from `src` starting at `src_x` into this image
    /// at `dst_x`. Heights must match.
    pub fn copy_columns_from(&mut self, src: &Image, src_x: u32, dst_x: u32, count: u32) {
        debug_assert_eq!(self.height, src.height);
        debug_assert!(src_x + count <= src.width && dst_x + count <= self.width);
        let bytes = (count * 4) as usize;
        for y in 0..self.height {
            let s = ((y * src.width + src_x) * 4) as usize;
            let d = ((y * self.width + dst_x) * 4) as usize;
            self.pixels[d..d + bytes].copy_from_slice(&src.pixels[s..s + bytes]);
        }
    }

    /// Extract a sub-rectangle as a new image. The rect must lie inside
    /// the image bounds.
    pub fn cropped(&self, rect: Rect) -> Image {
        debug_assert!(rect.x >= 0 && rect.y >= 0);
        debug_assert!(rect.right() as u32 <= self.width && rect.bottom() as u32 <= self.height);
        let mut out = Image::new(rect.width as u32, rect.height as u32);
        let bytes = (rect.width * 4) as usize;
        for y in 0..rect.height as u32 {
            let s = (((rect.y as u32 + y) * self.width + rect.x as u32) * 4) as usize;
            let d = ((y * out.width) * 4) as usize;
            out.pixels[d..d + bytes].copy_from_slice(&self.pixels[s..s + bytes]);
        }
        out
    }
}

// ── Magnitude range ──────────────────────────────────────────────────────────

/// The range of raw magnitudes observed while rendering a region. Starts
/// out unset; `sample` extends it.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct MagnitudeRange {
    min: f32,
    max: f32,
    set: bool,
}

impl MagnitudeRange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.set
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn sample(&mut self, value: f32) {
        if !self.set {
            self.min = value;
            self.max = value;
            self.set = true;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
    }

    pub fn extend(&mut self, other: &MagnitudeRange) {
        if other.set {
            self.sample(other.min);
            self.sample(other.max);
        }
    }
}

/// What a render call actually accomplished.
#[derive(Clone, Copy, Debug)]
pub struct RenderResult {
    /// The rect that was actually rendered; equal to the requested rect for
    /// an unconstrained render, possibly narrower for a time-constrained one.
    pub rendered: Rect,
    /// Magnitude range of the cache data within the rendered area.
    pub range: MagnitudeRange,
}

// ── Collaborator traits ──────────────────────────────────────────────────────

/// Source of raw time-domain samples. Frame indices are absolute; the
/// engine handles zero-padding outside `[start_frame, end_frame)` itself.
pub trait SampleSource: Send + Sync {
    fn sample_rate(&self) -> u32;
    fn start_frame(&self) -> i64;
    fn end_frame(&self) -> i64;
    /// False while the source is still loading; the fill worker waits.
    fn is_ready(&self) -> bool;
    /// Copy samples for `[start, end)` of `channel` into `out`, returning
    /// the number of frames written (may be short at the signal edges).
    fn samples(&self, channel: u32, start: i64, end: i64, out: &mut [f32]) -> usize;
}

/// Current viewport geometry, queried at render time.
pub trait GeometryProvider {
    fn paint_width(&self) -> i32;
    fn paint_height(&self) -> i32;
    /// Frame at the left edge of the viewport.
    fn start_frame(&self) -> i64;
    /// Zoom level in sample frames per pixel column (>= 1).
    fn zoom(&self) -> i64;
    /// Lowest visible frequency in Hz (0 = let the engine decide).
    fn min_frequency(&self) -> f64 {
        0.0
    }
    /// Highest visible frequency in Hz (0 = Nyquist).
    fn max_frequency(&self) -> f64;
}

/// Destination for rendered pixel blocks.
pub trait PaintTarget {
    fn draw_image(&mut self, x: i32, y: i32, image: &Image);
}
