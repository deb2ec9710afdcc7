//! Column-by-column pixel rendering from the analysis cache.
//!
//! A strip render walks pixel columns, projects each to its fractional
//! cache range, accumulates weighted cell values and pushes them through
//! the colour scale and palette. The three bin-display modes share the
//! projection; they differ only in which cells contribute.

use crate::cache::analysis::AnalysisCache;
use crate::render::map::ColourMap;
use crate::render::projector::{cell_weight, BinProjector};
use crate::render::scale::{ColourScale, LevelScale};
use crate::types::{Image, MagnitudeRange};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinDisplay {
    AllBins,
    /// Only bins that are local maxima along the frequency axis.
    PeakBins,
    /// Plot each qualifying peak at its phase-refined frequency.
    PeakFrequencies,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Normalization {
    None,
    /// Divide every cell by its column's peak magnitude.
    Columns,
}

/// A phase-derived instantaneous frequency estimate for one cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrequencyEstimate {
    pub frequency: f64,
    /// True when the phase error against the bin's nominal advance is
    /// under half a bin, i.e. the bin tracks a steady sinusoid.
    pub steady: bool,
}

pub struct FrameRenderer<'a> {
    pub cache: &'a AnalysisCache,
    pub scale: &'a ColourScale,
    pub map: &'a ColourMap,
    pub projector: &'a BinProjector,
    pub bin_display: BinDisplay,
    pub normalization: Normalization,
}

/// Output of a strip render. The image always covers the full requested
/// strip; with a deadline some trailing columns may be left as background,
/// reported through `columns_rendered`.
pub struct StripResult {
    pub image: Image,
    /// Raw magnitude range per pixel column, indexed from the strip's left.
    pub column_ranges: Vec<MagnitudeRange>,
    /// Whether every cache column under the pixel column had data. A
    /// column that is not backed was painted background and must not be
    /// treated as up to date; it gets another chance on the next render.
    pub columns_backed: Vec<bool>,
    /// Columns actually rendered, counted from the starting edge.
    pub columns_rendered: usize,
}

impl<'a> FrameRenderer<'a> {
    /// Render pixel columns `x0 .. x0 + width` at full viewport height.
    /// `right_to_left` renders from the far edge inwards, for filling a
    /// gap adjacent to valid cache on the right. A deadline stops the walk
    /// between columns.
    pub fn render_strip(
        &self,
        x0: i32,
        width: i32,
        right_to_left: bool,
        deadline: Option<Instant>,
    ) -> StripResult {
        let height = self.projector.height;
        let mut image = Image::filled(width as u32, height as u32, self.map.background());
        let mut column_ranges = vec![MagnitudeRange::new(); width as usize];
        let mut columns_backed = vec![false; width as usize];
        let mut columns_rendered = 0usize;

        for step in 0..width {
            if let Some(deadline) = deadline {
                if step > 0 && Instant::now() >= deadline {
                    break;
                }
            }
            let dx = if right_to_left { width - 1 - step } else { step };
            let mut range = MagnitudeRange::new();
            match self.bin_display {
                BinDisplay::AllBins | BinDisplay::PeakBins => {
                    self.render_column(x0 + dx, dx, &mut image, &mut range);
                }
                BinDisplay::PeakFrequencies => {
                    self.render_peak_column(x0 + dx, dx, &mut image, &mut range);
                }
            }
            column_ranges[dx as usize] = range;
            columns_backed[dx as usize] = self.column_backed(x0 + dx);
            columns_rendered += 1;
        }

        StripResult {
            image,
            column_ranges,
            columns_backed,
            columns_rendered,
        }
    }

    /// True when every cache column intersecting pixel column `x` has
    /// data. Columns outside the model range have nothing pending and
    /// count as backed.
    fn column_backed(&self, x: i32) -> bool {
        let Some((s0, s1)) = self.projector.column_range(x) else {
            return true;
        };
        for s in s0.floor() as i64..=s1.floor() as i64 {
            if s < 0 || s as usize >= self.cache.width() || cell_weight(s0, s1, s) <= 0.0 {
                continue;
            }
            if !self.cache.have_column(s as usize) {
                return false;
            }
        }
        true
    }

    fn render_column(&self, x: i32, dx: i32, image: &mut Image, range: &mut MagnitudeRange) {
        let Some((s0, s1)) = self.projector.column_range(x) else {
            return;
        };
        for y in 0..self.projector.height {
            let Some((q0, q1)) = self.projector.bin_range(y) else {
                continue;
            };
            let mut weighted = 0.0f64;
            let mut total = 0.0f64;
            let mut any = false;

            for s in s0.floor() as i64..=s1.floor() as i64 {
                if s < 0 || s as usize >= self.cache.width() {
                    continue;
                }
                let col = s as usize;
                if !self.cache.have_column(col) {
                    continue;
                }
                let ws = cell_weight(s0, s1, s);
                if ws <= 0.0 {
                    continue;
                }
                for q in q0.floor() as i64..=q1.floor() as i64 {
                    if q < 0 || q as usize >= self.cache.height() {
                        continue;
                    }
                    let bin = q as usize;
                    let wq = cell_weight(q0, q1, q);
                    if wq <= 0.0 {
                        continue;
                    }
                    any = true;
                    range.sample(self.cache.magnitude_at(col, bin));
                    if self.bin_display == BinDisplay::PeakBins
                        && !self.cache.is_local_peak(col, bin)
                    {
                        continue;
                    }
                    weighted += ws * wq * self.cell_value(col, bin);
                    total += ws * wq;
                }
            }

            if any && total > 0.0 {
                let value = weighted / total;
                let level = self.scale.get_level(value);
                image.set_rgb(dx as u32, y as u32, self.map.colour_for_level(level));
            }
        }
    }

    fn render_peak_column(&self, x: i32, dx: i32, image: &mut Image, range: &mut MagnitudeRange) {
        let Some((s0, s1)) = self.projector.column_range(x) else {
            return;
        };
        let threshold = self.scale.params().threshold;
        let min_bin = 1; // DC has no meaningful refined frequency
        let max_bin = self.cache.height();

        for s in s0.floor() as i64..=s1.floor() as i64 {
            if s < 0 || s as usize >= self.cache.width() || cell_weight(s0, s1, s) <= 0.0 {
                continue;
            }
            let col = s as usize;
            if !self.cache.have_column(col) {
                continue;
            }
            for bin in min_bin..max_bin {
                let mag = self.cache.magnitude_at(col, bin);
                range.sample(mag);
                if !self.cache.is_local_peak(col, bin) {
                    continue;
                }
                // Threshold in raw units; gain only affects the colour.
                if f64::from(mag) < threshold {
                    continue;
                }
                let estimate = self.estimate_frequency(col, bin);
                let y = self.projector.y_for_frequency(estimate.frequency);
                if y < 0.0 || y >= self.projector.height as f64 {
                    continue;
                }
                let level = self.scale.get_level(self.cell_value(col, bin));
                image.set_rgb(dx as u32, y as u32, self.map.colour_for_level(level));
            }
        }
    }

    #[inline]
    fn cell_value(&self, col: usize, bin: usize) -> f64 {
        if self.scale.params().scale == LevelScale::Phase {
            return f64::from(self.cache.phase_at(col, bin));
        }
        match self.normalization {
            Normalization::None => f64::from(self.cache.magnitude_at(col, bin)),
            Normalization::Columns => f64::from(self.cache.normalized_magnitude_at(col, bin)),
        }
    }

    /// Refine a bin's frequency from the phase advance between this column
    /// and the previous one.
    pub fn estimate_frequency(&self, col: usize, bin: usize) -> FrequencyEstimate {
        estimate_frequency(self.cache, self.projector, col, bin)
    }
}

/// Phase-derived instantaneous frequency for a cache cell. Compares the
/// phase advance from the previous column against the bin's nominal
/// per-hop advance and converts the wrapped error back to Hz. Without a
/// previous column the nominal bin frequency is returned, not steady.
pub fn estimate_frequency(
    cache: &AnalysisCache,
    projector: &BinProjector,
    col: usize,
    bin: usize,
) -> FrequencyEstimate {
    let sr = projector.sample_rate as f64;
    let window = projector.window_size as f64;
    let increment = projector.increment as f64;
    let nominal = bin as f64 * sr / window;

    if col == 0 || !cache.have_column(col - 1) || !cache.have_column(col) {
        return FrequencyEstimate {
            frequency: nominal,
            steady: false,
        };
    }

    let expected = 2.0 * PI * bin as f64 * increment / window;
    let advance = f64::from(cache.phase_at(col, bin)) - f64::from(cache.phase_at(col - 1, bin));
    let error = princarg(advance - expected);
    let frequency = (expected + error) * sr / (2.0 * PI * increment);
    let steady = error.abs() < PI * increment / window;
    FrequencyEstimate { frequency, steady }
}

/// Principal argument: wrap into (−π, π].
pub fn princarg(phase: f64) -> f64 {
    let mut p = phase.rem_euclid(2.0 * PI);
    if p > PI {
        p -= 2.0 * PI;
    }
    p
}
