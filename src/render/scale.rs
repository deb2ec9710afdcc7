//! Mapping from raw cell values to discrete colour levels.
//!
//! A level is a u8 in 0..=255. Level 0 is reserved for "nothing here" and
//! is drawn as the palette's background colour; data levels run 1..=255.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const MAX_LEVEL: u8 = 255;

/// Floor used when taking log10 of magnitudes near zero.
const LOG_CLAMP: f64 = 1e-10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelScale {
    Linear,
    /// Perceptual audio-meter curve (IEC 60268-18 preview segments).
    Meter,
    /// Decibel scale.
    Log,
    /// Phase values in (−π, π], mapped directly without gain or threshold.
    Phase,
    PlusMinusOne,
    Absolute,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColourScaleParams {
    pub scale: LevelScale,
    pub min_value: f64,
    pub max_value: f64,
    /// Values below this (after gain) map to level 0.
    pub threshold: f64,
    pub gain: f64,
}

impl Default for ColourScaleParams {
    fn default() -> Self {
        ColourScaleParams {
            scale: LevelScale::Linear,
            min_value: 0.0,
            max_value: 1.0,
            threshold: 0.0,
            gain: 1.0,
        }
    }
}

pub struct ColourScale {
    params: ColourScaleParams,
    mapped_min: f64,
    mapped_max: f64,
}

impl ColourScale {
    pub fn new(params: ColourScaleParams) -> Result<Self> {
        if params.min_value >= params.max_value {
            bail!(
                "colour scale needs max > min, got [{}, {}]",
                params.min_value,
                params.max_value
            );
        }

        let (mut mapped_min, mut mapped_max) = (params.min_value, params.max_value);
        match params.scale {
            LevelScale::Log => {
                mapped_min = log_map(mapped_min);
                mapped_max = log_map(mapped_max);
            }
            LevelScale::PlusMinusOne => {
                mapped_min = -1.0;
                mapped_max = 1.0;
            }
            LevelScale::Absolute => {
                mapped_min = mapped_min.abs();
                mapped_max = mapped_max.abs();
                if mapped_min >= mapped_max {
                    std::mem::swap(&mut mapped_min, &mut mapped_max);
                }
            }
            _ => {}
        }

        if mapped_min >= mapped_max {
            bail!("colour scale range collapses after mapping");
        }

        Ok(ColourScale {
            params,
            mapped_min,
            mapped_max,
        })
    }

    pub fn params(&self) -> &ColourScaleParams {
        &self.params
    }

    /// Map a raw cell value to a level.
    pub fn get_level(&self, value: f64) -> u8 {
        let max = MAX_LEVEL as f64;

        if self.params.scale == LevelScale::Phase {
            let half = (max - 1.0) / 2.0;
            let pixel = 1 + ((value * half) / PI + half) as i64;
            return pixel.clamp(0, MAX_LEVEL as i64) as u8;
        }

        let value = value * self.params.gain;
        if value < self.params.threshold {
            return 0;
        }

        let mut mapped = value;
        match self.params.scale {
            LevelScale::Log => mapped = log_map(value),
            LevelScale::PlusMinusOne => mapped = mapped.clamp(-1.0, 1.0),
            LevelScale::Absolute => mapped = mapped.abs(),
            _ => {}
        }
        mapped = mapped.clamp(self.mapped_min, self.mapped_max);

        let proportion = (mapped - self.mapped_min) / (self.mapped_max - self.mapped_min);

        let pixel = if self.params.scale == LevelScale::Meter {
            preview_level(proportion, MAX_LEVEL as i64 - 1) + 1
        } else {
            (proportion * max) as i64 + 1
        };

        pixel.clamp(0, MAX_LEVEL as i64) as u8
    }
}

fn log_map(value: f64) -> f64 {
    value.abs().max(LOG_CLAMP).log10()
}

/// IEC 60268-18 style preview curve: amplitude multiplier to a meter
/// deflection in 0..=max_level. Piecewise linear between the standard knees.
fn preview_level(multiplier: f64, max_level: i64) -> i64 {
    if multiplier <= 0.0 {
        return 0;
    }
    let db = 20.0 * multiplier.log10();
    let fraction = if db < -70.0 {
        0.0
    } else if db < -60.0 {
        (db + 70.0) * 0.0025
    } else if db < -50.0 {
        (db + 60.0) * 0.005 + 0.025
    } else if db < -40.0 {
        (db + 50.0) * 0.0075 + 0.075
    } else if db < -30.0 {
        (db + 40.0) * 0.015 + 0.15
    } else if db < -20.0 {
        (db + 30.0) * 0.02 + 0.30
    } else {
        (db + 20.0) * 0.025 + 0.50
    };
    ((fraction.min(1.0) * max_level as f64) + 0.5) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale(params: ColourScaleParams) -> ColourScale {
        ColourScale::new(params).unwrap()
    }

    #[test]
    fn rejects_collapsed_range() {
        let params = ColourScaleParams {
            min_value: 1.0,
            max_value: 1.0,
            ..ColourScaleParams::default()
        };
        assert!(ColourScale::new(params).is_err());
    }

    #[test]
    fn linear_golden_values() {
        let s = scale(ColourScaleParams::default());
        assert_eq!(s.get_level(0.0), 1);
        assert_eq!(s.get_level(0.5), 128);
        assert_eq!(s.get_level(1.0), 255);
        assert_eq!(s.get_level(2.0), 255);
    }

    #[test]
    fn threshold_cuts_to_level_zero() {
        let s = scale(ColourScaleParams {
            threshold: 0.1,
            ..ColourScaleParams::default()
        });
        assert_eq!(s.get_level(0.05), 0);
        assert!(s.get_level(0.15) > 0);
    }

    #[test]
    fn gain_applies_before_threshold() {
        let s = scale(ColourScaleParams {
            threshold: 0.1,
            gain: 10.0,
            ..ColourScaleParams::default()
        });
        assert!(s.get_level(0.05) > 0); // 0.05 * 10 = 0.5 >= 0.1
    }

    #[test]
    fn log_scale_is_db_linear() {
        // Amplitude floor 1e-4 is -80 dB, so each decade is a quarter of
        // the level range.
        let s = scale(ColourScaleParams {
            scale: LevelScale::Log,
            min_value: 1e-4,
            max_value: 1.0,
            ..ColourScaleParams::default()
        });
        assert_eq!(s.get_level(1e-2), 128); // -40 dB, halfway
        assert_eq!(s.get_level(1.0), 255);
        assert_eq!(s.get_level(1e-5), 1); // below floor, clamps to min
    }

    #[test]
    fn meter_golden_knees() {
        let s = scale(ColourScaleParams {
            scale: LevelScale::Meter,
            ..ColourScaleParams::default()
        });
        // -20 dB sits at 50 % deflection on the IEC preview curve.
        assert_eq!(s.get_level(0.1), 128);
        assert_eq!(s.get_level(1.0), 255);
        // -70 dB and below deflect to nothing (level 1, not 0: it passed
        // the threshold).
        assert_eq!(s.get_level(0.0001), 1);
    }

    #[test]
    fn phase_maps_pi_range_ignoring_gain() {
        let s = scale(ColourScaleParams {
            scale: LevelScale::Phase,
            gain: 100.0,
            threshold: 10.0,
            ..ColourScaleParams::default()
        });
        assert_eq!(s.get_level(0.0), 128);
        assert_eq!(s.get_level(PI), 255);
        assert_eq!(s.get_level(-PI), 1);
    }

    #[test]
    fn plus_minus_one_pins_endpoints() {
        let s = scale(ColourScaleParams {
            scale: LevelScale::PlusMinusOne,
            min_value: -5.0,
            max_value: 5.0,
            threshold: -10.0,
            ..ColourScaleParams::default()
        });
        assert_eq!(s.get_level(-1.0), 1);
        assert_eq!(s.get_level(-2.0), 1);
        assert_eq!(s.get_level(1.0), 255);
        assert_eq!(s.get_level(0.0), 128);
    }

    #[test]
    fn absolute_folds_sign() {
        // An asymmetric range keeps the folded bounds distinct; a
        // symmetric one collapses them and fails construction.
        let s = scale(ColourScaleParams {
            scale: LevelScale::Absolute,
            min_value: -0.25,
            max_value: 1.0,
            threshold: -10.0,
            ..ColourScaleParams::default()
        });
        assert_eq!(s.get_level(-0.5), s.get_level(0.5));
        assert!(s.get_level(0.5) > 0);
    }

    #[test]
    fn absolute_rejects_symmetric_range() {
        let result = ColourScale::new(ColourScaleParams {
            scale: LevelScale::Absolute,
            min_value: -1.0,
            max_value: 1.0,
            threshold: -10.0,
            ..ColourScaleParams::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn levels_are_monotonic_in_value() {
        for kind in [
            LevelScale::Linear,
            LevelScale::Meter,
            LevelScale::Log,
            LevelScale::Absolute,
        ] {
            let s = scale(ColourScaleParams {
                scale: kind,
                min_value: if kind == LevelScale::Log { 1e-4 } else { 0.0 },
                max_value: 1.0,
                ..ColourScaleParams::default()
            });
            let mut last = 0u8;
            for i in 0..=100 {
                let level = s.get_level(i as f64 / 100.0);
                assert!(level >= last, "{kind:?} not monotonic at {i}");
                last = level;
            }
        }
    }
}
