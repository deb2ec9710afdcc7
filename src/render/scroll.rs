//! Viewport-sized pixel cache with scroll reuse.
//!
//! The image cache keeps the last rendered pixels together with the start
//! frame and zoom they were rendered at, and a single contiguous valid
//! x-range. Scrolling by a whole number of pixel columns blits the overlap
//! sideways so only the newly exposed strip needs re-rendering. The
//! magnitude-range cache shadows it column for column so normalization
//! state stays in lockstep with the pixels.

use crate::types::{Image, MagnitudeRange, Rect};

pub struct ScrollableImageCache {
    image: Image,
    zoom: i64,
    start_frame: i64,
    valid_left: i32,
    valid_width: i32,
}

impl Default for ScrollableImageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrollableImageCache {
    pub fn new() -> Self {
        ScrollableImageCache {
            image: Image::new(0, 0),
            zoom: 0,
            start_frame: 0,
            valid_left: 0,
            valid_width: 0,
        }
    }

    pub fn width(&self) -> i32 {
        self.image.width() as i32
    }

    pub fn height(&self) -> i32 {
        self.image.height() as i32
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn zoom(&self) -> i64 {
        self.zoom
    }

    pub fn start_frame(&self) -> i64 {
        self.start_frame
    }

    pub fn is_valid(&self) -> bool {
        self.valid_width > 0
    }

    pub fn valid_left(&self) -> i32 {
        self.valid_left
    }

    /// One past the rightmost valid column.
    pub fn valid_right(&self) -> i32 {
        self.valid_left + self.valid_width
    }

    pub fn valid_width(&self) -> i32 {
        self.valid_width
    }

    pub fn invalidate(&mut self) {
        self.valid_width = 0;
        self.valid_left = 0;
    }

    /// Resize to the viewport. Any size change throws the pixels away.
    pub fn resize(&mut self, width: i32, height: i32) {
        if self.width() != width || self.height() != height {
            self.image = Image::new(width.max(0) as u32, height.max(0) as u32);
            self.invalidate();
        }
    }

    pub fn set_zoom(&mut self, zoom: i64) {
        if self.zoom != zoom {
            self.zoom = zoom;
            self.invalidate();
        }
    }

    /// Move the cache to a new start frame, reusing overlapping pixels
    /// where the shift is a whole number of columns at the current zoom.
    pub fn scroll_to(&mut self, new_start_frame: i64) {
        let old_start = self.start_frame;
        self.start_frame = new_start_frame;

        if !self.is_valid() || self.zoom <= 0 {
            return;
        }
        let frame_delta = old_start - new_start_frame;
        if frame_delta == 0 {
            return;
        }
        if frame_delta % self.zoom != 0 {
            // Not a whole pixel shift; nothing can be reused.
            self.invalidate();
            return;
        }
        let dx = frame_delta / self.zoom;
        if dx.unsigned_abs() >= self.width() as u64 {
            self.invalidate();
            return;
        }
        let dx = dx as i32;
        self.image.shift_horizontal(dx);
        self.valid_left += dx;
        self.clamp_validity();
    }

    fn clamp_validity(&mut self) {
        let left = self.valid_left.max(0);
        let right = (self.valid_left + self.valid_width).min(self.width());
        if right <= left {
            self.invalidate();
        } else {
            self.valid_left = left;
            self.valid_width = right - left;
        }
    }

    /// Paste a freshly rendered strip at `x` and extend the validity range.
    /// A strip not touching the existing valid range replaces it.
    pub fn merge_strip(&mut self, x: i32, strip: &Image) {
        debug_assert_eq!(strip.height(), self.image.height());
        let w = strip.width() as i32;
        if w == 0 {
            return;
        }
        debug_assert!(x >= 0 && x + w <= self.width());
        self.image.copy_columns_from(strip, 0, x as u32, w as u32);

        if !self.is_valid() {
            self.valid_left = x;
            self.valid_width = w;
        } else if x <= self.valid_right() && x + w >= self.valid_left {
            let left = self.valid_left.min(x);
            let right = self.valid_right().max(x + w);
            self.valid_left = left;
            self.valid_width = right - left;
        } else {
            self.valid_left = x;
            self.valid_width = w;
        }
    }

    /// The biggest contiguous rect still needing a render: the wider of
    /// the two invalid side strips, at full height.
    pub fn largest_uncached_rect(&self) -> Rect {
        if !self.is_valid() {
            return Rect::new(0, 0, self.width(), self.height());
        }
        let left_gap = self.valid_left;
        let right_gap = self.width() - self.valid_right();
        if left_gap <= 0 && right_gap <= 0 {
            Rect::empty()
        } else if left_gap >= right_gap {
            Rect::new(0, 0, left_gap, self.height())
        } else {
            Rect::new(self.valid_right(), 0, right_gap, self.height())
        }
    }
}

/// Per-column magnitude ranges, scrolled in lockstep with the image cache.
pub struct ScrollableMagRangeCache {
    ranges: Vec<MagnitudeRange>,
    zoom: i64,
    start_frame: i64,
}

impl Default for ScrollableMagRangeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrollableMagRangeCache {
    pub fn new() -> Self {
        ScrollableMagRangeCache {
            ranges: Vec::new(),
            zoom: 0,
            start_frame: 0,
        }
    }

    pub fn width(&self) -> i32 {
        self.ranges.len() as i32
    }

    pub fn resize(&mut self, width: i32) {
        if self.width() != width {
            self.ranges = vec![MagnitudeRange::new(); width.max(0) as usize];
        }
    }

    pub fn invalidate(&mut self) {
        self.ranges.fill(MagnitudeRange::new());
    }

    pub fn set_zoom(&mut self, zoom: i64) {
        if self.zoom != zoom {
            self.zoom = zoom;
            self.invalidate();
        }
    }

    pub fn scroll_to(&mut self, new_start_frame: i64) {
        let old_start = self.start_frame;
        self.start_frame = new_start_frame;
        let frame_delta = old_start - new_start_frame;
        if frame_delta == 0 || self.ranges.is_empty() || self.zoom <= 0 {
            return;
        }
        if frame_delta % self.zoom != 0 {
            self.invalidate();
            return;
        }
        let dx = frame_delta / self.zoom;
        let w = self.ranges.len() as i64;
        if dx.unsigned_abs() as i64 >= w {
            self.invalidate();
            return;
        }
        if dx > 0 {
            self.ranges.rotate_right(dx as usize);
            self.ranges[..dx as usize].fill(MagnitudeRange::new());
        } else {
            let dx = (-dx) as usize;
            self.ranges.rotate_left(dx);
            let w = self.ranges.len();
            self.ranges[w - dx..].fill(MagnitudeRange::new());
        }
    }

    pub fn set_column(&mut self, x: i32, range: MagnitudeRange) {
        if x >= 0 && (x as usize) < self.ranges.len() {
            self.ranges[x as usize] = range;
        }
    }

    pub fn column(&self, x: i32) -> MagnitudeRange {
        if x >= 0 && (x as usize) < self.ranges.len() {
            self.ranges[x as usize]
        } else {
            MagnitudeRange::new()
        }
    }

    /// Combined range over a span of columns.
    pub fn range_over(&self, x0: i32, width: i32) -> MagnitudeRange {
        let mut out = MagnitudeRange::new();
        for x in x0..x0 + width {
            out.extend(&self.column(x));
        }
        out
    }
}
