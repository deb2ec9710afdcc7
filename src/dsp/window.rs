//! Analysis window shapes.
//!
//! Coefficients are precomputed once per `Window` and applied in place to
//! each sample frame before the transform.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Window selection controlling spectral leakage characteristics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowType {
    Rectangular,
    Bartlett,
    Hamming,
    Hanning,
    Blackman,
    Gaussian,
    Parzen,
}

/// A precomputed window of a fixed size.
#[derive(Clone, Debug)]
pub struct Window {
    window_type: WindowType,
    coefficients: Vec<f32>,
}

impl Window {
    pub fn new(window_type: WindowType, size: usize) -> Self {
        Window {
            window_type,
            coefficients: coefficients(window_type, size),
        }
    }

    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    pub fn size(&self) -> usize {
        self.coefficients.len()
    }

    /// Multiply the frame by the window coefficients in place.
    pub fn cut(&self, frame: &mut [f32]) {
        debug_assert_eq!(frame.len(), self.coefficients.len());
        for (s, &w) in frame.iter_mut().zip(self.coefficients.iter()) {
            *s *= w;
        }
    }
}

fn coefficients(window_type: WindowType, size: usize) -> Vec<f32> {
    let n = size as f32;
    match window_type {
        WindowType::Rectangular => vec![0.5; size],
        WindowType::Bartlett => (0..size)
            .map(|i| {
                let i = i as f32;
                if i < n / 2.0 {
                    2.0 * i / n
                } else {
                    2.0 * (n - i) / n
                }
            })
            .collect(),
        WindowType::Hamming => (0..size)
            .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f32 / n).cos())
            .collect(),
        WindowType::Hanning => (0..size)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n).cos())
            .collect(),
        WindowType::Blackman => (0..size)
            .map(|i| {
                let phase = 2.0 * PI * i as f32 / n;
                // Rounds a hair below zero at the endpoints in f32.
                (0.42 - 0.50 * phase.cos() + 0.08 * (2.0 * phase).cos()).max(0.0)
            })
            .collect(),
        WindowType::Gaussian => (0..size)
            .map(|i| {
                let k = (i as f32 - n / 2.0) / (0.25 * n / 2.0);
                (-0.5 * k * k).exp()
            })
            .collect(),
        WindowType::Parzen => (0..size)
            .map(|i| {
                // Piecewise cubic approximation over |k| in [0, 1].
                let k = 2.0 * (i as f32 - n / 2.0).abs() / n;
                if k <= 0.5 {
                    1.0 - 6.0 * k * k * (1.0 - k)
                } else {
                    2.0 * (1.0 - k).powi(3)
                }
            })
            .collect(),
    }
}
