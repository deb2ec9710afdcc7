//! The engine facade: owns the fill worker and the renderer, and maps the
//! outside world's setters onto the right kind of invalidation.
//!
//! Two classes of parameter:
//!  - analysis parameters (window, overlap, channel, gain, scale kind)
//!    throw away the analysis cache and restart the background fill;
//!  - display parameters (frequency range, frequency scale, palette,
//!    rotation, bin display, normalization) only invalidate the pixel
//!    caches and are cheap to change while a fill is running.

use crate::cache::fill::{CacheFillWorker, FillParams};
use crate::dsp::window::WindowType;
use crate::export::{ExportParams, Exporter};
use crate::render::frame::{BinDisplay, Normalization};
use crate::render::map::ColourMapKind;
use crate::render::projector::{cell_weight, BinProjector, BinScale};
use crate::render::renderer::Renderer;
use crate::render::scale::{ColourScaleParams, LevelScale};
use crate::types::{GeometryProvider, PaintTarget, Rect, RenderResult, SampleSource};
use anyhow::Result;
use std::sync::Arc;

/// Amplitude corresponding to the -80 dB display floor.
const DB_FLOOR: f64 = -80.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnSnap {
    Left,
    Right,
    Nearest,
}

pub struct SpectrogramEngine {
    source: Arc<dyn SampleSource>,
    worker: CacheFillWorker,
    renderer: Renderer,
    bin_scale: BinScale,
    min_frequency: f64,
    max_frequency: f64,
    dormant: bool,
    /// Frequency range the pixel caches were last rendered at; a change
    /// coming in from the view invalidates them.
    last_freq_range: (f64, f64),
}

impl SpectrogramEngine {
    pub fn new(source: Arc<dyn SampleSource>) -> Result<Self> {
        Self::with_params(
            source,
            FillParams::default(),
            ColourScaleParams::default(),
            ColourMapKind::Default,
        )
    }

    pub fn with_params(
        source: Arc<dyn SampleSource>,
        fill: FillParams,
        scale: ColourScaleParams,
        map_kind: ColourMapKind,
    ) -> Result<Self> {
        let renderer = Renderer::new(scale, map_kind)?;
        let worker = CacheFillWorker::new(Arc::clone(&source), fill);
        Ok(SpectrogramEngine {
            source,
            worker,
            renderer,
            bin_scale: BinScale::Linear,
            min_frequency: 0.0,
            max_frequency: 0.0,
            dormant: false,
            last_freq_range: (0.0, 0.0),
        })
    }

    /// Settings tuned for melodic material: long Parzen window, dense
    /// overlap, linear scale up to 1 kHz.
    pub fn melodic_range(source: Arc<dyn SampleSource>) -> Result<Self> {
        let fill = FillParams {
            window_size: 8192,
            window_overlap: 90,
            window_type: WindowType::Parzen,
            ..FillParams::default()
        };
        let mut engine = Self::with_params(
            source,
            fill,
            ColourScaleParams::default(),
            ColourMapKind::Default,
        )?;
        engine.max_frequency = 1000.0;
        Ok(engine)
    }

    // ── Analysis parameters: cache-invalidating ──────────────────────────────

    pub fn set_window_size(&mut self, size: usize) {
        let params = FillParams {
            window_size: size,
            ..self.worker.params()
        };
        self.set_fill_params(params);
    }

    pub fn set_window_overlap(&mut self, percent: u32) {
        let params = FillParams {
            window_overlap: percent.min(99),
            ..self.worker.params()
        };
        self.set_fill_params(params);
    }

    pub fn set_window_type(&mut self, window_type: WindowType) {
        let params = FillParams {
            window_type,
            ..self.worker.params()
        };
        self.set_fill_params(params);
    }

    pub fn set_channel(&mut self, channel: u32) {
        let params = FillParams {
            channel,
            ..self.worker.params()
        };
        self.set_fill_params(params);
    }

    fn set_fill_params(&mut self, params: FillParams) {
        if params != self.worker.params() {
            self.worker.set_params(params);
            self.renderer.invalidate();
        }
    }

    pub fn fill_params(&self) -> FillParams {
        self.worker.params()
    }

    /// Gain feeds only the colour mapping; the raw cache stays valid.
    pub fn set_gain(&mut self, gain: f64) -> Result<()> {
        let mut params = *self.renderer.scale().params();
        if params.gain == gain {
            return Ok(());
        }
        params.gain = gain;
        self.renderer.set_scale(params)
    }

    pub fn set_threshold(&mut self, threshold: f64) -> Result<()> {
        let mut params = *self.renderer.scale().params();
        if params.threshold == threshold {
            return Ok(());
        }
        params.threshold = threshold;
        self.renderer.set_scale(params)
    }

    pub fn set_colour_scale_kind(&mut self, kind: LevelScale) -> Result<()> {
        let mut params = *self.renderer.scale().params();
        if params.scale == kind {
            return Ok(());
        }
        params.scale = kind;
        self.renderer.set_scale(params)?;
        self.worker.refill();
        Ok(())
    }

    pub fn scale_params(&self) -> ColourScaleParams {
        *self.renderer.scale().params()
    }

    // ── Display parameters: pixel caches only ────────────────────────────────

    pub fn set_frequency_scale(&mut self, scale: BinScale) {
        if self.bin_scale != scale {
            self.bin_scale = scale;
            self.renderer.invalidate();
        }
    }

    pub fn set_min_frequency(&mut self, hz: f64) {
        if self.min_frequency != hz {
            self.min_frequency = hz;
            self.renderer.invalidate();
        }
    }

    pub fn set_max_frequency(&mut self, hz: f64) {
        if self.max_frequency != hz {
            self.max_frequency = hz;
            self.renderer.invalidate();
        }
    }

    pub fn set_palette(&mut self, kind: ColourMapKind) {
        self.renderer.set_map_kind(kind);
    }

    pub fn set_colour_rotation(&mut self, rotation: i32) {
        self.renderer.set_rotation(rotation);
    }

    pub fn rotate_colours(&mut self, delta: i32) {
        self.renderer.rotate(delta);
    }

    pub fn set_bin_display(&mut self, display: BinDisplay) {
        self.renderer.set_bin_display(display);
    }

    pub fn set_normalization(&mut self, normalization: Normalization) {
        self.renderer.set_normalization(normalization);
    }

    // ── Fill progress and lifecycle ──────────────────────────────────────────

    /// Snapshot of the analysis cache being filled, if any.
    pub fn analysis_cache(&self) -> Option<Arc<crate::cache::analysis::AnalysisCache>> {
        self.worker.cache()
    }

    /// Percent complete for the background fill; 100 means done.
    pub fn completion(&self) -> usize {
        self.worker.completion()
    }

    /// Frame the fill has reached. A regression against an earlier poll
    /// means the run restarted and previously reported progress is void.
    pub fn fill_extent(&self) -> i64 {
        self.worker.fill_extent()
    }

    pub fn set_visible_range(&self, start_frame: i64, end_frame: i64) {
        self.worker.set_visible_range(start_frame, end_frame);
    }

    pub fn set_dormant(&mut self, dormant: bool) {
        if self.dormant != dormant {
            self.dormant = dormant;
            self.worker.set_dormant(dormant);
            self.renderer.invalidate();
        }
    }

    pub fn is_dormant(&self) -> bool {
        self.dormant
    }

    // ── Rendering ────────────────────────────────────────────────────────────

    pub fn render(
        &mut self,
        view: &dyn GeometryProvider,
        target: &mut dyn PaintTarget,
        rect: Rect,
    ) -> Result<RenderResult> {
        let projector = self.projector(view);
        let cache = self.worker.cache();
        self.renderer.render(cache.as_deref(), &projector, target, rect)
    }

    pub fn render_time_constrained(
        &mut self,
        view: &dyn GeometryProvider,
        target: &mut dyn PaintTarget,
        rect: Rect,
    ) -> Result<RenderResult> {
        let projector = self.projector(view);
        let cache = self.worker.cache();
        self.renderer
            .render_time_constrained(cache.as_deref(), &projector, target, rect)
    }

    pub fn largest_uncached_rect(&mut self, view: &dyn GeometryProvider) -> Rect {
        let projector = self.projector(view);
        self.renderer.largest_uncached_rect(&projector)
    }

    pub fn will_render_opaque(&self) -> bool {
        self.renderer.will_render_opaque()
    }

    fn projector(&mut self, view: &dyn GeometryProvider) -> BinProjector {
        let params = self.worker.params();
        let min_frequency = if self.min_frequency > 0.0 {
            self.min_frequency
        } else {
            view.min_frequency()
        };
        let max_frequency = if self.max_frequency > 0.0 {
            self.max_frequency
        } else {
            view.max_frequency()
        };
        if self.last_freq_range != (min_frequency, max_frequency) {
            self.last_freq_range = (min_frequency, max_frequency);
            self.renderer.invalidate();
        }
        BinProjector {
            sample_rate: self.source.sample_rate(),
            window_size: params.window_size,
            increment: params.increment(),
            bin_scale: self.bin_scale,
            min_frequency,
            max_frequency,
            width: view.paint_width(),
            height: view.paint_height(),
            start_frame: view.start_frame(),
            zoom: view.zoom().max(1),
            model_start: self.source.start_frame(),
            model_end: self.source.end_frame(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Snap a frame to an analysis column boundary.
    pub fn snap_frame_to_column(&self, frame: i64, snap: ColumnSnap) -> i64 {
        let increment = self.worker.params().increment() as i64;
        let origin = self.source.start_frame();
        let rel = frame - origin;
        let left = rel.div_euclid(increment) * increment;
        if left == rel {
            return frame;
        }
        let snapped = match snap {
            ColumnSnap::Left => left,
            ColumnSnap::Right => left + increment,
            ColumnSnap::Nearest => {
                if rel - left < left + increment - rel {
                    left
                } else {
                    left + increment
                }
            }
        };
        origin + snapped
    }

    /// Time span in seconds covered by pixel column `x`.
    pub fn time_range_at(&mut self, view: &dyn GeometryProvider, x: i32) -> (f64, f64) {
        let p = self.projector(view);
        let sr = p.sample_rate as f64;
        (
            p.frame_for_x(x) as f64 / sr,
            p.frame_for_x(x + 1) as f64 / sr,
        )
    }

    /// Frequency span in Hz covered by pixel row `y`.
    pub fn frequency_range_at(&mut self, view: &dyn GeometryProvider, y: i32) -> Option<(f64, f64)> {
        let p = self.projector(view);
        let (q0, q1) = p.bin_range(y)?;
        Some((p.frequency_for_bin(q0), p.frequency_for_bin(q1)))
    }

    /// dB range of the cache cells under pixel (x, y), floored at -80 dB.
    /// None while the underlying columns are unfilled.
    pub fn db_range_at(
        &mut self,
        view: &dyn GeometryProvider,
        x: i32,
        y: i32,
    ) -> Option<(f64, f64)> {
        let p = self.projector(view);
        let cache = self.worker.cache()?;
        let (s0, s1) = p.column_range(x)?;
        let (q0, q1) = p.bin_range(y)?;

        let mut min = f64::MAX;
        let mut max = f64::MIN;
        let mut any = false;
        for s in s0.floor() as i64..=s1.floor() as i64 {
            if s < 0 || s as usize >= cache.width() || cell_weight(s0, s1, s) <= 0.0 {
                continue;
            }
            if !cache.have_column(s as usize) {
                continue;
            }
            for q in q0.floor() as i64..=q1.floor() as i64 {
                if q < 0 || q as usize >= cache.height() || cell_weight(q0, q1, q) <= 0.0 {
                    continue;
                }
                let mag = f64::from(cache.magnitude_at(s as usize, q as usize));
                min = min.min(mag);
                max = max.max(mag);
                any = true;
            }
        }
        if !any {
            return None;
        }
        Some((to_db(min), to_db(max)))
    }

    /// Export columns intersecting a frame range as delimited text, using
    /// the engine's current display settings. Empty while no cache exists.
    pub fn export_delimited(
        &mut self,
        view: &dyn GeometryProvider,
        params: ExportParams,
        start_frame: i64,
        end_frame: i64,
    ) -> String {
        let projector = self.projector(view);
        let Some(cache) = self.worker.cache() else {
            return String::new();
        };
        let scale = self.renderer.scale().params();
        let exporter = Exporter {
            cache: &cache,
            projector: &projector,
            bin_display: self.renderer.bin_display(),
            normalization: self.renderer.normalization(),
            threshold: scale.threshold,
            gain: scale.gain,
            params,
        };
        exporter.export(start_frame, end_frame)
    }
}

fn to_db(magnitude: f64) -> f64 {
    if magnitude <= 0.0 {
        return DB_FLOOR;
    }
    (20.0 * magnitude.log10()).max(DB_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Image;
    use std::thread;
    use std::time::{Duration, Instant};

    struct SineSource {
        sample_rate: u32,
        frames: i64,
        freq: f64,
    }

    impl SampleSource for SineSource {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }
        fn start_frame(&self) -> i64 {
            0
        }
        fn end_frame(&self) -> i64 {
            self.frames
        }
        fn is_ready(&self) -> bool {
            true
        }
        fn samples(&self, _channel: u32, start: i64, end: i64, out: &mut [f32]) -> usize {
            let end = end.min(self.frames);
            if end <= start {
                return 0;
            }
            for (i, s) in out.iter_mut().take((end - start) as usize).enumerate() {
                let t = (start + i as i64) as f64 / self.sample_rate as f64;
                *s = (2.0 * std::f64::consts::PI * self.freq * t).sin() as f32;
            }
            (end - start) as usize
        }
    }

    struct View {
        width: i32,
        height: i32,
        start_frame: i64,
        zoom: i64,
    }

    impl GeometryProvider for View {
        fn paint_width(&self) -> i32 {
            self.width
        }
        fn paint_height(&self) -> i32 {
            self.height
        }
        fn start_frame(&self) -> i64 {
            self.start_frame
        }
        fn zoom(&self) -> i64 {
            self.zoom
        }
        fn max_frequency(&self) -> f64 {
            0.0
        }
    }

    struct Target {
        last: Option<(i32, i32, Image)>,
    }

    impl PaintTarget for Target {
        fn draw_image(&mut self, x: i32, y: i32, image: &Image) {
            self.last = Some((x, y, image.clone()));
        }
    }

    fn engine() -> SpectrogramEngine {
        let source = Arc::new(SineSource {
            sample_rate: 8000,
            frames: 40960,
            freq: 1000.0,
        });
        SpectrogramEngine::new(source).unwrap()
    }

    fn wait_complete(engine: &SpectrogramEngine) {
        let deadline = Instant::now() + Duration::from_secs(20);
        while engine.completion() < 100 || engine.analysis_cache().is_none() {
            assert!(Instant::now() < deadline, "fill did not complete");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn end_to_end_sine_renders_bright_band() {
        let mut engine = engine();
        wait_complete(&engine);

        let view = View {
            width: 32,
            height: 64,
            start_frame: 0,
            zoom: 512,
        };
        let mut target = Target { last: None };
        let result = engine
            .render(&view, &mut target, Rect::new(0, 0, 32, 64))
            .unwrap();
        assert_eq!(result.rendered, Rect::new(0, 0, 32, 64));
        assert!(result.range.is_set());

        // 1 kHz is bin 128 of 512; with 64 rows that is row 47.
        let (_, _, image) = target.last.unwrap();
        let band = image.rgb_at(16, 47);
        let quiet = image.rgb_at(16, 10);
        let brightness = |c: [u8; 3]| c[0] as u32 + c[1] as u32 + c[2] as u32;
        assert!(
            brightness(band) > brightness(quiet),
            "band {band:?} quiet {quiet:?}"
        );
    }

    #[test]
    fn db_scale_scenario_peaks_at_bin_128() {
        let mut engine = engine();
        engine.set_colour_scale_kind(LevelScale::Log).unwrap();
        engine.set_palette(ColourMapKind::WhiteOnBlack);
        wait_complete(&engine);

        let cache = engine.analysis_cache().unwrap();
        assert!(cache.is_local_peak(40, 128));
        assert!(!cache.is_local_peak(40, 127));
        assert!(!cache.is_local_peak(40, 129));

        // One bin per pixel row so the level peak is directly visible.
        let view = View {
            width: 16,
            height: 512,
            start_frame: 0,
            zoom: 512,
        };
        let mut target = Target { last: None };
        engine
            .render(&view, &mut target, Rect::new(0, 0, 16, 512))
            .unwrap();
        let (_, _, image) = target.last.unwrap();

        // Bin 128 sits at row 512 - 128 - 1 = 383.
        let level = |y: u32| image.rgb_at(8, y)[0];
        assert!(level(383) > level(384), "bin 128 must out-level bin 127");
        assert!(level(383) > level(382), "bin 128 must out-level bin 129");
        let max_row = (0..512u32).max_by_key(|&y| level(y)).unwrap();
        assert_eq!(max_row, 383);
    }

    #[test]
    fn scroll_reuses_cache_and_exposes_strip() {
        let mut engine = engine();
        wait_complete(&engine);

        let mut target = Target { last: None };
        let mut view = View {
            width: 32,
            height: 64,
            start_frame: 0,
            zoom: 512,
        };
        engine
            .render(&view, &mut target, Rect::new(0, 0, 32, 64))
            .unwrap();
        assert!(engine.largest_uncached_rect(&view).is_empty());

        // Scroll forward by 4 columns.
        view.start_frame = 4 * 512;
        let gap = engine.largest_uncached_rect(&view);
        assert_eq!(gap, Rect::new(28, 0, 4, 64));

        let result = engine.render(&view, &mut target, gap).unwrap();
        assert_eq!(result.rendered, gap);
        assert!(engine.largest_uncached_rect(&view).is_empty());
    }

    #[test]
    fn render_before_any_fill_fails() {
        let source = Arc::new(SineSource {
            sample_rate: 8000,
            frames: 40960,
            freq: 1000.0,
        });
        let mut engine = SpectrogramEngine::new(source).unwrap();
        engine.set_dormant(true);

        let view = View {
            width: 8,
            height: 8,
            start_frame: 0,
            zoom: 512,
        };
        let mut target = Target { last: None };
        assert!(engine
            .render(&view, &mut target, Rect::new(0, 0, 8, 8))
            .is_err());
    }

    #[test]
    fn analysis_setters_restart_fill() {
        let mut engine = engine();
        wait_complete(&engine);
        engine.set_window_size(512);
        wait_complete(&engine);
        assert_eq!(engine.fill_params().window_size, 512);
    }

    #[test]
    fn display_setters_keep_completion() {
        let mut engine = engine();
        wait_complete(&engine);
        engine.set_palette(ColourMapKind::Sunset);
        engine.set_frequency_scale(BinScale::Log);
        engine.set_colour_rotation(30);
        engine.set_bin_display(BinDisplay::PeakBins);
        assert_eq!(engine.completion(), 100);
    }

    #[test]
    fn snap_to_column_boundaries() {
        let engine = engine(); // increment 512
        assert_eq!(engine.snap_frame_to_column(1024, ColumnSnap::Left), 1024);
        assert_eq!(engine.snap_frame_to_column(1100, ColumnSnap::Left), 1024);
        assert_eq!(engine.snap_frame_to_column(1100, ColumnSnap::Right), 1536);
        assert_eq!(engine.snap_frame_to_column(1100, ColumnSnap::Nearest), 1024);
        assert_eq!(engine.snap_frame_to_column(1500, ColumnSnap::Nearest), 1536);
    }

    #[test]
    fn time_and_frequency_ranges() {
        let mut engine = engine();
        let view = View {
            width: 32,
            height: 64,
            start_frame: 0,
            zoom: 512,
        };
        let (t0, t1) = engine.time_range_at(&view, 2);
        assert!((t0 - 0.128).abs() < 1e-9); // 2 * 512 / 8000
        assert!((t1 - 0.192).abs() < 1e-9);

        // Bottom row covers the lowest bins.
        let (f0, f1) = engine.frequency_range_at(&view, 63).unwrap();
        assert_eq!(f0, 0.0);
        assert!((f1 - 8.0 * 8000.0 / 1024.0).abs() < 1e-9);
        assert!(engine.frequency_range_at(&view, 64).is_none());
    }

    #[test]
    fn db_range_reports_floored_decibels() {
        let mut engine = engine();
        wait_complete(&engine);
        let view = View {
            width: 32,
            height: 64,
            start_frame: 0,
            zoom: 512,
        };
        // The 1 kHz band row should be well above the floor.
        let (_lo, hi) = engine.db_range_at(&view, 16, 47).unwrap();
        assert!(hi > DB_FLOOR);
        assert!(hi <= 6.0);
        // A silent corner sits at or near the floor.
        let (lo, _hi) = engine.db_range_at(&view, 16, 5).unwrap();
        assert!(lo >= DB_FLOOR);
    }

    #[test]
    fn export_uses_current_settings() {
        let mut engine = engine();
        wait_complete(&engine);
        let view = View {
            width: 32,
            height: 64,
            start_frame: 0,
            zoom: 512,
        };
        let text = engine.export_delimited(
            &view,
            ExportParams {
                timestamp_format: crate::export::TimestampFormat::Frames,
                ..ExportParams::default()
            },
            0,
            1024,
        );
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines.len(), 2); // columns at frames 0 and 512
        assert!(lines[0].starts_with("0,"));
        assert!(lines[1].starts_with("512,"));
        // Timestamp plus one value per bin.
        assert_eq!(lines[0].split(',').count(), 513);
    }

    #[test]
    fn melodic_range_preset_parameters() {
        let source = Arc::new(SineSource {
            sample_rate: 8000,
            frames: 16384,
            freq: 440.0,
        });
        let mut engine = SpectrogramEngine::melodic_range(source).unwrap();
        let params = engine.fill_params();
        assert_eq!(params.window_size, 8192);
        assert_eq!(params.window_overlap, 90);
        assert_eq!(params.window_type, WindowType::Parzen);
        assert_eq!(params.increment(), 819);

        let view = View {
            width: 8,
            height: 8,
            start_frame: 0,
            zoom: 1024,
        };
        // Preset caps the display at 1 kHz.
        let (_, f1) = engine.frequency_range_at(&view, 0).unwrap();
        assert!((f1 - 1000.0).abs() < 1e-9 || f1 <= 1000.0 + 1e-9);
    }
}
