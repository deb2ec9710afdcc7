//! Background analysis-cache fill.
//!
//! One worker thread per engine. The engine posts a work order (parameters
//! plus the currently visible frame range) under a mutex and wakes the
//! worker through a condvar; the worker does all sample fetching and FFT
//! work outside the lock, publishing finished columns straight into the
//! shared [`AnalysisCache`]. A parameter change bumps a generation counter;
//! the worker notices at the next column boundary, abandons the run and
//! starts over against a fresh cache.

use crate::cache::analysis::AnalysisCache;
use crate::dsp::transform::WindowedTransform;
use crate::dsp::window::WindowType;
use crate::types::SampleSource;
use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long the worker parks when there is nothing to do.
const IDLE_WAIT: Duration = Duration::from_secs(2);
/// Poll interval while the sample source is still loading.
const NOT_READY_WAIT: Duration = Duration::from_millis(100);

/// Analysis parameters. Any change means a full refill.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillParams {
    pub channel: u32,
    pub window_type: WindowType,
    pub window_size: usize,
    /// Window overlap in percent of the window size.
    pub window_overlap: u32,
}

impl FillParams {
    /// Hop between successive columns, in frames.
    pub fn increment(&self) -> usize {
        (self.window_size * (100 - self.window_overlap as usize) / 100).max(1)
    }
}

impl Default for FillParams {
    fn default() -> Self {
        FillParams {
            channel: 0,
            window_type: WindowType::Hanning,
            window_size: 1024,
            window_overlap: 50,
        }
    }
}

struct WorkOrder {
    fill_requested: bool,
    dormant: bool,
    params: FillParams,
    /// Visible frame range, filled first.
    visible: Option<(i64, i64)>,
}

struct Shared {
    order: Mutex<WorkOrder>,
    wake: Condvar,
    exiting: AtomicBool,
    /// Bumped on every invalidation; a run whose captured generation goes
    /// stale is abandoned at the next column boundary.
    generation: AtomicU64,
    cache: Mutex<Option<Arc<AnalysisCache>>>,
    /// Frame up to which analysis has progressed in the current run. May
    /// regress when a run restarts or wraps to fill the leading section;
    /// pollers treat a regression as "discard what you had".
    fill_extent: AtomicI64,
    /// Percent complete, 0..=100. 100 exactly once a run has finished.
    completion: AtomicUsize,
}

/// Owning handle for the fill thread. Dropping it shuts the thread down.
pub struct CacheFillWorker {
    shared: Arc<Shared>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CacheFillWorker {
    pub fn new(source: Arc<dyn SampleSource>, params: FillParams) -> Self {
        let shared = Arc::new(Shared {
            order: Mutex::new(WorkOrder {
                fill_requested: true,
                dormant: false,
                params,
                visible: None,
            }),
            wake: Condvar::new(),
            exiting: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            cache: Mutex::new(None),
            fill_extent: AtomicI64::new(0),
            completion: AtomicUsize::new(0),
        });
        let handle = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("analysis-fill".into())
                .spawn(move || run(shared, source))
                .expect("spawn fill thread")
        };
        CacheFillWorker {
            shared,
            handle: Some(handle),
        }
    }

    /// Replace the analysis parameters. Drops the cache, cancels any run in
    /// progress and schedules a refill.
    pub fn set_params(&self, params: FillParams) {
        let mut order = self.shared.order.lock();
        if order.params == params {
            return;
        }
        order.params = params;
        order.fill_requested = true;
        self.invalidate();
        self.shared.wake.notify_one();
    }

    pub fn params(&self) -> FillParams {
        self.shared.order.lock().params
    }

    /// Drop the cache and refill with unchanged parameters.
    pub fn refill(&self) {
        self.invalidate();
        let mut order = self.shared.order.lock();
        order.fill_requested = true;
        self.shared.wake.notify_one();
    }

    /// Tell the worker which frame range is on screen so it fills those
    /// columns first. Does not invalidate anything.
    pub fn set_visible_range(&self, start: i64, end: i64) {
        let mut order = self.shared.order.lock();
        order.visible = Some((start, end));
        self.shared.wake.notify_one();
    }

    /// Dormant mode frees the cache and parks the worker; leaving it
    /// triggers a refill.
    pub fn set_dormant(&self, dormant: bool) {
        let mut order = self.shared.order.lock();
        if order.dormant == dormant {
            return;
        }
        order.dormant = dormant;
        if dormant {
            self.invalidate();
        } else {
            order.fill_requested = true;
            self.shared.wake.notify_one();
        }
    }

    fn invalidate(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        *self.shared.cache.lock() = None;
        self.shared.completion.store(0, Ordering::Relaxed);
        self.shared.fill_extent.store(0, Ordering::Relaxed);
    }

    /// Snapshot of the cache being filled, if any. Columns appear in it as
    /// the worker publishes them.
    pub fn cache(&self) -> Option<Arc<AnalysisCache>> {
        self.shared.cache.lock().clone()
    }

    pub fn completion(&self) -> usize {
        self.shared.completion.load(Ordering::Relaxed)
    }

    pub fn fill_extent(&self) -> i64 {
        self.shared.fill_extent.load(Ordering::Relaxed)
    }
}

impl Drop for CacheFillWorker {
    fn drop(&mut self) {
        self.shared.exiting.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ── Worker side ──────────────────────────────────────────────────────────────

fn run(shared: Arc<Shared>, source: Arc<dyn SampleSource>) {
    debug!("fill worker up");
    loop {
        if shared.exiting.load(Ordering::SeqCst) {
            break;
        }

        let (params, visible) = {
            let mut order = shared.order.lock();
            if order.fill_requested && !order.dormant {
                order.fill_requested = false;
                (order.params, order.visible)
            } else {
                shared.wake.wait_for(&mut order, IDLE_WAIT);
                continue;
            }
        };

        if !source.is_ready() {
            thread::sleep(NOT_READY_WAIT);
            shared.order.lock().fill_requested = true;
            continue;
        }

        let generation = shared.generation.load(Ordering::SeqCst);
        match fill_run(&shared, &source, params, visible, generation) {
            RunOutcome::Completed => {
                // Report 100 only for a run nobody has invalidated since.
                if shared.generation.load(Ordering::SeqCst) == generation {
                    shared.completion.store(100, Ordering::Relaxed);
                    debug!("fill complete");
                } else {
                    shared.order.lock().fill_requested = true;
                }
            }
            RunOutcome::Cancelled => {
                // A newer work order exists; loop around and pick it up.
                shared.order.lock().fill_requested = true;
                trace!("fill cancelled, restarting");
            }
            RunOutcome::Failed => {}
        }
    }
    debug!("fill worker exiting");
}

enum RunOutcome {
    Completed,
    Cancelled,
    Failed,
}

fn fill_run(
    shared: &Shared,
    source: &Arc<dyn SampleSource>,
    params: FillParams,
    visible: Option<(i64, i64)>,
    generation: u64,
) -> RunOutcome {
    let mut transform = match WindowedTransform::new(params.window_type, params.window_size) {
        Ok(t) => t,
        Err(e) => {
            warn!("skipping fill, cannot plan transform: {e}");
            return RunOutcome::Failed;
        }
    };

    let increment = params.increment() as i64;
    let origin = source.start_frame();
    let end = source.end_frame();
    let span = (end - origin).max(0);
    let total_columns = ((span + increment - 1) / increment).max(0) as usize;

    let cache = Arc::new(AnalysisCache::new(total_columns, transform.bins()));
    {
        let mut slot = shared.cache.lock();
        if shared.generation.load(Ordering::SeqCst) != generation {
            return RunOutcome::Cancelled;
        }
        *slot = Some(Arc::clone(&cache));
    }
    shared.fill_extent.store(origin, Ordering::Relaxed);
    shared.completion.store(0, Ordering::Relaxed);

    if total_columns == 0 {
        return RunOutcome::Completed;
    }

    // Visible columns first, then the tail, then the head. The extent
    // regresses when we wrap back to the head; pollers handle that.
    let (vis_first, vis_last) = match visible {
        Some((vs, ve)) if ve > vs => {
            let first = ((vs - origin) / increment).clamp(0, total_columns as i64 - 1) as usize;
            let last = ((ve - origin) / increment).clamp(0, total_columns as i64 - 1) as usize;
            (first, last)
        }
        _ => (0, 0),
    };

    let progress_interval = (total_columns / 20).max(100);
    let mut frame = vec![0.0f32; params.window_size];
    let mut magnitudes = vec![0.0f32; transform.bins()];
    let mut phases = vec![0.0f32; transform.bins()];
    let mut done = 0usize;

    let order: Vec<usize> = (vis_first..=vis_last)
        .chain(vis_last + 1..total_columns)
        .chain(0..vis_first)
        .collect();

    for col in order {
        if shared.exiting.load(Ordering::SeqCst)
            || shared.generation.load(Ordering::SeqCst) != generation
        {
            return RunOutcome::Cancelled;
        }

        fill_column(
            source,
            &params,
            &mut transform,
            col,
            origin,
            increment,
            &mut frame,
            &mut magnitudes,
            &mut phases,
            &cache,
        );

        done += 1;
        if done % progress_interval == 0 || done == total_columns {
            let col_end = origin + (col as i64 + 1) * increment;
            shared.fill_extent.store(col_end.min(end), Ordering::Relaxed);
            // 100 is reserved for the finished run.
            let percent = (done * 100 / total_columns).min(99);
            shared.completion.store(percent, Ordering::Relaxed);
        }
    }

    RunOutcome::Completed
}

#[allow(clippy::too_many_arguments)]
fn fill_column(
    source: &Arc<dyn SampleSource>,
    params: &FillParams,
    transform: &mut WindowedTransform,
    col: usize,
    origin: i64,
    increment: i64,
    frame: &mut [f32],
    magnitudes: &mut [f32],
    phases: &mut [f32],
    cache: &AnalysisCache,
) {
    let window = params.window_size as i64;
    // Centre the window on the column's hop so that phase advances line up
    // with the nominal per-bin rate.
    let fetch_start = origin + col as i64 * increment - (window - increment) / 2;
    let fetch_end = fetch_start + window;

    frame.fill(0.0);
    let avail_start = fetch_start.max(source.start_frame());
    let avail_end = fetch_end.min(source.end_frame());
    if avail_end > avail_start {
        let offset = (avail_start - fetch_start) as usize;
        let want = (avail_end - avail_start) as usize;
        let got = source.samples(
            params.channel,
            avail_start,
            avail_end,
            &mut frame[offset..offset + want],
        );
        if got < want {
            frame[offset + got..offset + want].fill(0.0);
        }
    }

    transform.analyse(frame, magnitudes, phases);
    let peak = magnitudes.iter().cloned().fold(0.0f32, f32::max);
    cache.write_column(col, magnitudes, phases, peak);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

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

    fn wait_for_completion(worker: &CacheFillWorker) {
        let deadline = Instant::now() + Duration::from_secs(20);
        while worker.completion() < 100 || worker.cache().is_none() {
            assert!(Instant::now() < deadline, "fill did not complete in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn source() -> Arc<dyn SampleSource> {
        Arc::new(SineSource {
            sample_rate: 8000,
            frames: 40960,
            freq: 1000.0,
        })
    }

    #[test]
    fn fills_to_completion_with_expected_peak() {
        let params = FillParams {
            window_size: 1024,
            window_overlap: 50,
            ..FillParams::default()
        };
        let worker = CacheFillWorker::new(source(), params);
        wait_for_completion(&worker);

        let cache = worker.cache().expect("cache present after fill");
        assert_eq!(cache.width(), 80); // 40960 / 512
        assert_eq!(cache.height(), 512);
        assert_eq!(cache.filled_columns(), cache.width());

        // An interior column should peak at bin 128 (1000 Hz at 8 kHz).
        let col = cache.width() / 2;
        let peak_bin = (0..cache.height())
            .max_by(|&a, &b| {
                cache
                    .magnitude_at(col, a)
                    .partial_cmp(&cache.magnitude_at(col, b))
                    .unwrap()
            })
            .unwrap();
        assert_eq!(peak_bin, 128);
        assert!(worker.fill_extent() >= 40960 - 1024);
    }

    #[test]
    fn edge_columns_are_zero_padded_not_skipped() {
        let worker = CacheFillWorker::new(source(), FillParams::default());
        wait_for_completion(&worker);
        let cache = worker.cache().unwrap();
        assert!(cache.have_column(0));
        assert!(cache.have_column(cache.width() - 1));
    }

    #[test]
    fn parameter_change_restarts_and_recompletes() {
        let worker = CacheFillWorker::new(source(), FillParams::default());
        wait_for_completion(&worker);

        let new_params = FillParams {
            window_size: 512,
            ..FillParams::default()
        };
        worker.set_params(new_params);
        wait_for_completion(&worker);

        let cache = worker.cache().unwrap();
        assert_eq!(cache.height(), 256);
        assert_eq!(cache.width(), 160); // 40960 / 256
    }

    #[test]
    fn identical_params_do_not_invalidate() {
        let worker = CacheFillWorker::new(source(), FillParams::default());
        wait_for_completion(&worker);
        worker.set_params(FillParams::default());
        assert_eq!(worker.completion(), 100);
        assert!(worker.cache().is_some());
    }

    #[test]
    fn dormancy_drops_cache_and_wakeup_refills() {
        let worker = CacheFillWorker::new(source(), FillParams::default());
        wait_for_completion(&worker);

        worker.set_dormant(true);
        assert!(worker.cache().is_none());
        assert_eq!(worker.completion(), 0);

        worker.set_dormant(false);
        wait_for_completion(&worker);
        assert!(worker.cache().is_some());
    }

    #[test]
    fn odd_window_size_logs_and_parks() {
        let params = FillParams {
            window_size: 1023,
            ..FillParams::default()
        };
        let worker = CacheFillWorker::new(source(), params);
        thread::sleep(Duration::from_millis(200));
        assert!(worker.cache().is_none());
        assert_eq!(worker.completion(), 0);
    }
}
