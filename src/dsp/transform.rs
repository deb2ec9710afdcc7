//! The per-column windowed transform: one frame of samples in, one column
//! of (magnitude, phase) pairs out.
//!
//! Pure and deterministic; owns its FFT plan and scratch buffers, so each
//! worker thread builds its own instance.

use crate::dsp::window::{Window, WindowType};
use anyhow::{bail, Result};
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

pub struct WindowedTransform {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Window,
    input: Vec<f32>,
    spectrum: Vec<realfft::num_complex::Complex<f32>>,
    window_size: usize,
}

impl WindowedTransform {
    /// Plan a transform for the given window. Fails for a zero or odd
    /// window size, which cannot produce the even bin layout the caches
    /// are built around.
    pub fn new(window_type: WindowType, window_size: usize) -> Result<Self> {
        if window_size == 0 || window_size % 2 != 0 {
            bail!("cannot plan transform for window size {window_size}");
        }
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(window_size);
        let input = fft.make_input_vec();
        let spectrum = fft.make_output_vec();
        Ok(WindowedTransform {
            fft,
            window: Window::new(window_type, window_size),
            input,
            spectrum,
            window_size,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of output bins (`window_size / 2`).
    pub fn bins(&self) -> usize {
        self.window_size / 2
    }

    /// Analyse one frame. `frame` must be exactly `window_size` samples
    /// (zero-padded by the caller at signal boundaries); `magnitudes` and
    /// `phases` must each hold `bins()` values.
    ///
    /// Magnitudes are scaled by `2 / window_size` so a full-scale sinusoid
    /// lands near 1.0; phases are the principal argument in (−π, π].
    pub fn analyse(&mut self, frame: &[f32], magnitudes: &mut [f32], phases: &mut [f32]) {
        debug_assert_eq!(frame.len(), self.window_size);
        debug_assert_eq!(magnitudes.len(), self.bins());
        debug_assert_eq!(phases.len(), self.bins());

        self.input.copy_from_slice(frame);
        self.window.cut(&mut self.input);

        // realfft only fails on mismatched buffer lengths, which the
        // make_*_vec allocations rule out.
        self.fft
            .process(&mut self.input, &mut self.spectrum)
            .expect("FFT buffers sized by planner");

        let scale = 2.0 / self.window_size as f32;
        for (bin, out) in magnitudes.iter_mut().enumerate() {
            *out = self.spectrum[bin].norm() * scale;
        }
        for (bin, out) in phases.iter_mut().enumerate() {
            let c = self.spectrum[bin];
            *out = c.im.atan2(c.re);
        }
    }
}
