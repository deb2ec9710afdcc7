//! Top-level render orchestration.
//!
//! Reconciles the scroll caches against the current viewport, renders
//! whatever strips are missing through [`FrameRenderer`], and paints the
//! result. The time-constrained entry point renders full-height,
//! partial-width: it works outwards from the already valid region so each
//! call extends a single contiguous cached range, and reports the sub-rect
//! it actually covered.

use crate::cache::analysis::AnalysisCache;
use crate::render::frame::{BinDisplay, FrameRenderer, Normalization};
use crate::render::map::{ColourMap, ColourMapKind};
use crate::render::projector::BinProjector;
use crate::render::scale::{ColourScale, ColourScaleParams};
use crate::render::scroll::{ScrollableImageCache, ScrollableMagRangeCache};
use crate::types::{MagnitudeRange, PaintTarget, Rect, RenderResult};
use anyhow::{Context, Result};
use log::trace;
use std::time::{Duration, Instant};

/// Wall-clock budget for a time-constrained render call.
const RENDER_BUDGET: Duration = Duration::from_millis(50);

pub struct Renderer {
    scale: ColourScale,
    map: ColourMap,
    bin_display: BinDisplay,
    normalization: Normalization,
    image_cache: ScrollableImageCache,
    mag_cache: ScrollableMagRangeCache,
}

impl Renderer {
    pub fn new(scale_params: ColourScaleParams, map_kind: ColourMapKind) -> Result<Self> {
        Ok(Renderer {
            scale: ColourScale::new(scale_params)?,
            map: ColourMap::new(map_kind),
            bin_display: BinDisplay::AllBins,
            normalization: Normalization::None,
            image_cache: ScrollableImageCache::new(),
            mag_cache: ScrollableMagRangeCache::new(),
        })
    }

    // ── Parameter plumbing. All of these invalidate the pixel caches only;
    // the analysis cache is untouched. ──

    pub fn set_scale(&mut self, params: ColourScaleParams) -> Result<()> {
        self.scale = ColourScale::new(params)?;
        self.invalidate();
        Ok(())
    }

    pub fn scale(&self) -> &ColourScale {
        &self.scale
    }

    pub fn set_map_kind(&mut self, kind: ColourMapKind) {
        if self.map.kind() != kind {
            let rotation = self.map.rotation();
            self.map = ColourMap::new(kind);
            self.map.set_rotation(rotation);
            self.invalidate();
        }
    }

    pub fn map(&self) -> &ColourMap {
        &self.map
    }

    pub fn set_rotation(&mut self, rotation: i32) {
        if self.map.rotation() != rotation {
            self.map.set_rotation(rotation);
            self.invalidate();
        }
    }

    pub fn rotate(&mut self, delta: i32) {
        if delta != 0 {
            self.map.rotate(delta);
            self.invalidate();
        }
    }

    pub fn set_bin_display(&mut self, display: BinDisplay) {
        if self.bin_display != display {
            self.bin_display = display;
            self.invalidate();
        }
    }

    pub fn bin_display(&self) -> BinDisplay {
        self.bin_display
    }

    pub fn set_normalization(&mut self, normalization: Normalization) {
        if self.normalization != normalization {
            self.normalization = normalization;
            self.invalidate();
        }
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    pub fn invalidate(&mut self) {
        self.image_cache.invalidate();
        self.mag_cache.invalidate();
    }

    /// The engine always paints a background colour behind the data.
    pub fn will_render_opaque(&self) -> bool {
        true
    }

    /// Biggest strip still needing a render at the current viewport.
    pub fn largest_uncached_rect(&mut self, projector: &BinProjector) -> Rect {
        self.reconcile(projector);
        self.image_cache.largest_uncached_rect()
    }

    /// Render `rect` completely and paint it.
    pub fn render(
        &mut self,
        cache: Option<&AnalysisCache>,
        projector: &BinProjector,
        target: &mut dyn PaintTarget,
        rect: Rect,
    ) -> Result<RenderResult> {
        self.render_inner(cache, projector, target, rect, None)
    }

    /// Render as much of `rect` as fits in the time budget, full height,
    /// adjacent to the valid region first.
    pub fn render_time_constrained(
        &mut self,
        cache: Option<&AnalysisCache>,
        projector: &BinProjector,
        target: &mut dyn PaintTarget,
        rect: Rect,
    ) -> Result<RenderResult> {
        let deadline = Instant::now() + RENDER_BUDGET;
        self.render_inner(cache, projector, target, rect, Some(deadline))
    }

    fn reconcile(&mut self, projector: &BinProjector) {
        self.image_cache.resize(projector.width, projector.height);
        self.mag_cache.resize(projector.width);
        self.image_cache.set_zoom(projector.zoom);
        self.mag_cache.set_zoom(projector.zoom);
        self.image_cache.scroll_to(projector.start_frame);
        self.mag_cache.scroll_to(projector.start_frame);
    }

    fn render_inner(
        &mut self,
        cache: Option<&AnalysisCache>,
        projector: &BinProjector,
        target: &mut dyn PaintTarget,
        rect: Rect,
        deadline: Option<Instant>,
    ) -> Result<RenderResult> {
        let cache = cache.context("analysis cache not yet available")?;
        self.reconcile(projector);

        let view = Rect::new(0, 0, projector.width, projector.height);
        let rect = rect.intersected(&view);
        if rect.is_empty() {
            return Ok(RenderResult {
                rendered: Rect::empty(),
                range: MagnitudeRange::new(),
            });
        }

        let (left_strip, right_strip) = self.missing_strips(&rect);

        // The right gap renders left-to-right and the left gap
        // right-to-left, so both grow outwards from the valid region and
        // the cache stays contiguous even when the budget expires.
        if right_strip.width > 0 {
            self.render_and_merge(cache, projector, right_strip, false, deadline);
        }
        if left_strip.width > 0 {
            self.render_and_merge(cache, projector, left_strip, true, deadline);
        }

        let valid = Rect::new(
            self.image_cache.valid_left(),
            0,
            self.image_cache.valid_width(),
            projector.height,
        );
        let painted = rect.intersected(&valid);
        if !painted.is_empty() {
            target.draw_image(painted.x, 0, &self.image_cache.image().cropped(painted));
        }
        trace!(
            "render: requested {:?} painted {:?}",
            (rect.x, rect.width),
            (painted.x, painted.width)
        );

        Ok(RenderResult {
            rendered: painted,
            range: self.mag_cache.range_over(painted.x, painted.width),
        })
    }

    /// The parts of `rect` not covered by the valid cache range, as
    /// (left-of-valid, right-of-valid) full-height strips.
    fn missing_strips(&self, rect: &Rect) -> (Rect, Rect) {
        let h = self.image_cache.height();
        if !self.image_cache.is_valid() {
            return (Rect::empty(), Rect::new(rect.x, 0, rect.width, h));
        }
        let valid_left = self.image_cache.valid_left();
        let valid_right = self.image_cache.valid_right();

        let left = if rect.x < valid_left {
            let right_edge = valid_left.min(rect.right());
            Rect::new(rect.x, 0, right_edge - rect.x, h)
        } else {
            Rect::empty()
        };
        let right = if rect.right() > valid_right {
            let left_edge = valid_right.max(rect.x);
            Rect::new(left_edge, 0, rect.right() - left_edge, h)
        } else {
            Rect::empty()
        };
        (left, right)
    }

    fn render_and_merge(
        &mut self,
        cache: &AnalysisCache,
        projector: &BinProjector,
        strip: Rect,
        right_to_left: bool,
        deadline: Option<Instant>,
    ) {
        let frame = FrameRenderer {
            cache,
            scale: &self.scale,
            map: &self.map,
            projector,
            bin_display: self.bin_display,
            normalization: self.normalization,
        };
        let result = frame.render_strip(strip.x, strip.width, right_to_left, deadline);

        // Merge only the contiguous run of rendered columns that were
        // backed by cache data, measured from the starting edge. Columns
        // over still-unfilled cache stay invalid so the next render
        // repaints them once the fill catches up.
        let mut done = 0i32;
        while (done as usize) < result.columns_rendered {
            let idx = if right_to_left {
                (strip.width - 1 - done) as usize
            } else {
                done as usize
            };
            if !result.columns_backed[idx] {
                break;
            }
            done += 1;
        }
        if done == 0 {
            return;
        }

        let (merge_x, strip_offset) = if right_to_left {
            (strip.x + strip.width - done, strip.width - done)
        } else {
            (strip.x, 0)
        };
        let sub = result
            .image
            .cropped(Rect::new(strip_offset, 0, done, strip.height));
        self.image_cache.merge_strip(merge_x, &sub);
        for i in 0..done {
            self.mag_cache.set_column(
                merge_x + i,
                result.column_ranges[(strip_offset + i) as usize],
            );
        }
    }
}
