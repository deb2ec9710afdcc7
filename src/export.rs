//! Delimited text export of the analysis cache.
//!
//! One line per analysis column, fields joined by a caller-supplied
//! delimiter. The bin-display mode chooses between dumping bin values and
//! listing (frequency, value) pairs for qualifying peaks, so an export
//! matches what the same settings would draw.

use crate::cache::analysis::AnalysisCache;
use crate::render::frame::{estimate_frequency, BinDisplay, Normalization};
use crate::render::projector::BinProjector;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampFormat {
    None,
    Frames,
    Seconds,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportParams {
    pub delimiter: char,
    pub timestamp_format: TimestampFormat,
    /// Constant multiplier applied to every exported value.
    pub scale_factor: f64,
}

impl Default for ExportParams {
    fn default() -> Self {
        ExportParams {
            delimiter: ',',
            timestamp_format: TimestampFormat::None,
            scale_factor: 1.0,
        }
    }
}

pub struct Exporter<'a> {
    pub cache: &'a AnalysisCache,
    pub projector: &'a BinProjector,
    pub bin_display: BinDisplay,
    pub normalization: Normalization,
    /// Threshold for peak qualification, compared against the (locally
    /// normalized) magnitude after gain, mirroring the display path.
    pub threshold: f64,
    pub gain: f64,
    pub params: ExportParams,
}

impl Exporter<'_> {
    /// Export every column intersecting `[start_frame, end_frame)`.
    pub fn export(&self, start_frame: i64, end_frame: i64) -> String {
        let increment = self.projector.increment as i64;
        let origin = self.projector.model_start;

        let first = ((start_frame - origin) / increment).max(0);
        let last = ((end_frame - 1 - origin) / increment).min(self.cache.width() as i64 - 1);

        let mut lines = Vec::new();
        for col in first..=last {
            lines.push(self.export_column(col as usize, origin + col * increment));
        }
        lines.join("\n")
    }

    fn export_column(&self, col: usize, column_frame: i64) -> String {
        let mut fields: Vec<String> = Vec::new();
        match self.params.timestamp_format {
            TimestampFormat::None => {}
            TimestampFormat::Frames => fields.push(column_frame.to_string()),
            TimestampFormat::Seconds => {
                let secs = column_frame as f64 / self.projector.sample_rate as f64;
                fields.push(format!("{secs}"));
            }
        }

        match self.bin_display {
            BinDisplay::AllBins => {
                for bin in 0..self.cache.height() {
                    fields.push(self.value_field(col, bin));
                }
            }
            BinDisplay::PeakBins => {
                for bin in 0..self.cache.height() {
                    if self.cache.is_local_peak(col, bin) {
                        fields.push(self.value_field(col, bin));
                    } else {
                        fields.push("0".to_string());
                    }
                }
            }
            BinDisplay::PeakFrequencies => {
                for bin in 1..self.cache.height() {
                    if !self.cache.is_local_peak(col, bin) {
                        continue;
                    }
                    if !self.passes_threshold(col, bin) {
                        continue;
                    }
                    let freq = estimate_frequency(self.cache, self.projector, col, bin).frequency;
                    fields.push(format!("{freq}"));
                    fields.push(self.value_field(col, bin));
                }
            }
        }

        let delim = self.params.delimiter.to_string();
        fields.join(&delim)
    }

    /// Normalization applies only to this test, not to the exported value.
    fn passes_threshold(&self, col: usize, bin: usize) -> bool {
        let value = match self.normalization {
            Normalization::None => f64::from(self.cache.magnitude_at(col, bin)),
            Normalization::Columns => f64::from(self.cache.normalized_magnitude_at(col, bin)),
        };
        value * self.gain > self.threshold
    }

    fn value_field(&self, col: usize, bin: usize) -> String {
        // Stay in f32 so values print as the shortest round-trip form of
        // what the cache actually holds.
        let value = self.cache.magnitude_at(col, bin) * self.params.scale_factor as f32;
        format!("{value}")
    }
}
