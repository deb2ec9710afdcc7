//! Fixed-size 2-D store of per-(column, bin) magnitude and phase, filled
//! column-at-a-time by the background worker while render threads read it.
//!
//! Concurrency contract: exactly one writer (the fill worker), any number
//! of readers. A column's cells are written first, then its peak factor,
//! then the have-data flag with release ordering; readers check the flag
//! with acquire ordering before touching the cells, so a column is never
//! observed part-written. Metadata (dimensions) is immutable after
//! construction; parameter changes replace the whole cache.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

pub struct AnalysisCache {
    width: usize,
    height: usize,
    /// Column-major, `col * height + bin`, so one column write is one
    /// contiguous copy.
    magnitudes: UnsafeCell<Box<[f32]>>,
    phases: UnsafeCell<Box<[f32]>>,
    /// Per-column max magnitude, stored as f32 bits.
    peaks: Vec<AtomicU32>,
    have: Vec<AtomicBool>,
}

// Safety: the cell storage is only written through `write_column`, whose
// single-writer contract is documented above; each cell is written at most
// once before the column flag is released, and never after.
unsafe impl Sync for AnalysisCache {}
unsafe impl Send for AnalysisCache {}

impl AnalysisCache {
    pub fn new(width: usize, height: usize) -> Self {
        AnalysisCache {
            width,
            height,
            magnitudes: UnsafeCell::new(vec![0.0; width * height].into_boxed_slice()),
            phases: UnsafeCell::new(vec![0.0; width * height].into_boxed_slice()),
            peaks: (0..width).map(|_| AtomicU32::new(0)).collect(),
            have: (0..width).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Reallocate to new dimensions, discarding all data. Requires
    /// exclusive access, so it can only happen before the cache is shared.
    pub fn resize(&mut self, width: usize, height: usize) {
        *self = AnalysisCache::new(width, height);
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Write one complete column and publish it. Called only by the fill
    /// worker; out-of-range columns are ignored.
    pub fn write_column(&self, col: usize, magnitudes: &[f32], phases: &[f32], peak: f32) {
        if col >= self.width {
            return;
        }
        debug_assert_eq!(magnitudes.len(), self.height);
        debug_assert_eq!(phases.len(), self.height);

        let offset = col * self.height;
        // Safety: single writer per the struct contract; no reader touches
        // these cells until the release store below is observed.
        unsafe {
            let mags = &mut *self.magnitudes.get();
            let phs = &mut *self.phases.get();
            mags[offset..offset + self.height].copy_from_slice(magnitudes);
            phs[offset..offset + self.height].copy_from_slice(phases);
        }
        self.peaks[col].store(peak.to_bits(), Ordering::Relaxed);
        self.have[col].store(true, Ordering::Release);
    }

    /// True once `write_column(col, ..)` has fully completed.
    #[inline]
    pub fn have_column(&self, col: usize) -> bool {
        col < self.width && self.have[col].load(Ordering::Acquire)
    }

    /// Raw magnitude, or 0 when out of range or not yet filled.
    #[inline]
    pub fn magnitude_at(&self, col: usize, bin: usize) -> f32 {
        if bin >= self.height || !self.have_column(col) {
            return 0.0;
        }
        // Safety: the acquire load in have_column orders this read after
        // the writer's release store.
        unsafe { (*self.magnitudes.get())[col * self.height + bin] }
    }

    /// Phase in (−π, π], or 0 when out of range or not yet filled.
    #[inline]
    pub fn phase_at(&self, col: usize, bin: usize) -> f32 {
        if bin >= self.height || !self.have_column(col) {
            return 0.0;
        }
        unsafe { (*self.phases.get())[col * self.height + bin] }
    }

    /// Column peak magnitude (the per-column normalization factor).
    #[inline]
    pub fn column_peak(&self, col: usize) -> f32 {
        if !self.have_column(col) {
            return 0.0;
        }
        f32::from_bits(self.peaks[col].load(Ordering::Relaxed))
    }

    /// Magnitude divided by the column peak, in [0, 1].
    pub fn normalized_magnitude_at(&self, col: usize, bin: usize) -> f32 {
        let peak = self.column_peak(col);
        if peak > 0.0 {
            self.magnitude_at(col, bin) / peak
        } else {
            0.0
        }
    }

    /// True when the bin's magnitude exceeds both vertical neighbours.
    /// Missing neighbours count as 0.
    pub fn is_local_peak(&self, col: usize, bin: usize) -> bool {
        let mag = self.magnitude_at(col, bin);
        if mag <= 0.0 {
            return false;
        }
        let below = if bin > 0 { self.magnitude_at(col, bin - 1) } else { 0.0 };
        let above = self.magnitude_at(col, bin + 1); // out of range reads 0
        mag > below && mag > above
    }

    /// Threshold test in raw cache units.
    pub fn is_over_threshold(&self, col: usize, bin: usize, threshold: f32) -> bool {
        self.magnitude_at(col, bin) > threshold
    }

    /// Number of columns published so far.
    pub fn filled_columns(&self) -> usize {
        self.have
            .iter()
            .filter(|h| h.load(Ordering::Acquire))
            .count()
    }
}
