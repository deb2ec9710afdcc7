//! Pixel-to-cache geometry.
//!
//! Maps a pixel column to the fractional range of analysis columns it
//! covers, and a pixel row to the fractional range of frequency bins,
//! under either a linear or a log frequency axis. Rows count from the top
//! of the viewport; frequency increases upwards.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinScale {
    Linear,
    Log,
}

#[derive(Clone, Copy, Debug)]
pub struct BinProjector {
    pub sample_rate: u32,
    pub window_size: usize,
    pub increment: usize,
    pub bin_scale: BinScale,
    /// 0 means one bin's worth above DC.
    pub min_frequency: f64,
    /// 0 means Nyquist.
    pub max_frequency: f64,
    pub width: i32,
    pub height: i32,
    pub start_frame: i64,
    /// Frames per pixel column.
    pub zoom: i64,
    pub model_start: i64,
    pub model_end: i64,
}

impl BinProjector {
    pub fn bins(&self) -> usize {
        self.window_size / 2
    }

    pub fn effective_min_frequency(&self) -> f64 {
        if self.min_frequency > 0.0 {
            self.min_frequency
        } else {
            self.sample_rate as f64 / self.window_size as f64
        }
    }

    pub fn effective_max_frequency(&self) -> f64 {
        if self.max_frequency > 0.0 {
            self.max_frequency.min(self.sample_rate as f64 / 2.0)
        } else {
            self.sample_rate as f64 / 2.0
        }
    }

    pub fn frame_for_x(&self, x: i32) -> i64 {
        self.start_frame + x as i64 * self.zoom
    }

    pub fn frequency_for_bin(&self, bin: f64) -> f64 {
        bin * self.sample_rate as f64 / self.window_size as f64
    }

    pub fn bin_for_frequency(&self, freq: f64) -> f64 {
        freq * self.window_size as f64 / self.sample_rate as f64
    }

    /// Fractional analysis-column range covered by pixel column `x`, or
    /// None when the pixel lies entirely outside the model's extent.
    pub fn column_range(&self, x: i32) -> Option<(f64, f64)> {
        let f0 = self.frame_for_x(x);
        let f1 = self.frame_for_x(x + 1);
        if f1 <= self.model_start || f0 >= self.model_end {
            return None;
        }
        let inc = self.increment as f64;
        let s0 = (f0 - self.model_start) as f64 / inc;
        let s1 = (f1 - self.model_start) as f64 / inc;
        Some((s0, s1))
    }

    /// Fractional bin range covered by pixel row `y` (0 = top).
    pub fn bin_range(&self, y: i32) -> Option<(f64, f64)> {
        if y < 0 || y >= self.height {
            return None;
        }
        let h = self.height as f64;
        // The row spans [h-y-1, h-y] in bottom-up pixel units.
        let q0 = self.bin_for_bottom_up(h - y as f64 - 1.0);
        let q1 = self.bin_for_bottom_up(h - y as f64);
        Some((q0, q1))
    }

    fn bin_for_bottom_up(&self, u: f64) -> f64 {
        let h = self.height as f64;
        match self.bin_scale {
            BinScale::Linear => {
                // With the full range this reduces to u * bins / h.
                let minf = self.min_frequency.max(0.0);
                let maxf = self.effective_max_frequency();
                self.bin_for_frequency(minf + (u / h) * (maxf - minf))
            }
            BinScale::Log => {
                let lmin = self.effective_min_frequency().log10();
                let lmax = self.effective_max_frequency().log10();
                let freq = 10f64.powf(lmin + (u / h) * (lmax - lmin));
                self.bin_for_frequency(freq)
            }
        }
    }

    /// Fractional row (0 = top) at which `freq` sits, for plotting refined
    /// peak frequencies. Out-of-range frequencies land off screen.
    pub fn y_for_frequency(&self, freq: f64) -> f64 {
        let h = self.height as f64;
        let u = match self.bin_scale {
            BinScale::Linear => {
                let minf = self.min_frequency.max(0.0);
                let maxf = self.effective_max_frequency();
                h * (freq - minf) / (maxf - minf)
            }
            BinScale::Log => {
                let lmin = self.effective_min_frequency().log10();
                let lmax = self.effective_max_frequency().log10();
                if freq <= 0.0 {
                    return h;
                }
                h * (freq.log10() - lmin) / (lmax - lmin)
            }
        };
        h - u
    }

    pub fn frequency_for_y(&self, y: f64) -> f64 {
        let h = self.height as f64;
        let u = h - y;
        match self.bin_scale {
            BinScale::Linear => {
                let minf = self.min_frequency.max(0.0);
                let maxf = self.effective_max_frequency();
                minf + (u / h) * (maxf - minf)
            }
            BinScale::Log => {
                let lmin = self.effective_min_frequency().log10();
                let lmax = self.effective_max_frequency().log10();
                10f64.powf(lmin + (u / h) * (lmax - lmin))
            }
        }
    }
}

/// Weight of integer cell `s` within the fractional range `[s0, s1]`. The
/// first cell gets `(s+1) - s0`, the last `s1 - s`, interior cells 1.
#[inline]
pub fn cell_weight(s0: f64, s1: f64, s: i64) -> f64 {
    let lo = (s as f64).max(s0);
    let hi = (s as f64 + 1.0).min(s1);
    (hi - lo).max(0.0)
}
