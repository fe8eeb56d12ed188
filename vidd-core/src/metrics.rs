//! Frame processing metrics
//!
//! Provides:
//! - Lock-free counters for the acquire/release handshake
//! - Forwarding counters (forwarded, dropped on a full queue, sink failures)
//! - Rolling averages for per-frame processing time and frame interval

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Maximum number of samples to keep for rolling averages
const MAX_SAMPLES: usize = 120;

/// Rolling average calculator for timing data
#[derive(Debug)]
struct RollingAverage {
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl RollingAverage {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    fn add(&mut self, duration: Duration) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
    }

    fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }
}

/// Snapshot of a processor's counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessorStats {
    /// Successful acquires
    pub frames_acquired: u64,
    /// Releases handed back to the compositor
    pub frames_released: u64,
    /// Recoverable acquire failures
    pub transient_errors: u64,
    /// Frames queued for the sink
    pub frames_forwarded: u64,
    /// Forward copies dropped because the queue was full
    pub frames_dropped: u64,
    /// Frames the sink rejected
    pub sink_failures: u64,
    /// Dirty pixels seen across all frames
    pub dirty_pixels: u64,
    /// Average time from acquire to release, in milliseconds
    pub avg_hold_ms: f64,
    /// Frames per second over the recent window
    pub fps: f64,
    /// Seconds since the processor started
    pub elapsed_seconds: f64,
}

impl ProcessorStats {
    /// Acquires not yet matched by a release
    pub fn outstanding(&self) -> u64 {
        self.frames_acquired.saturating_sub(self.frames_released)
    }
}

impl std::fmt::Display for ProcessorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} acquired, {} released, {} transient, {} forwarded, {} dropped, {} sink failures ({:.1} fps, hold {:.2}ms)",
            self.frames_acquired,
            self.frames_released,
            self.transient_errors,
            self.frames_forwarded,
            self.frames_dropped,
            self.sink_failures,
            self.fps,
            self.avg_hold_ms
        )
    }
}

/// Thread-safe metrics shared by the worker, the forwarder and observers
#[derive(Debug)]
pub struct ProcessorMetrics {
    frames_acquired: AtomicU64,
    frames_released: AtomicU64,
    transient_errors: AtomicU64,
    frames_forwarded: AtomicU64,
    frames_dropped: AtomicU64,
    sink_failures: AtomicU64,
    dirty_pixels: AtomicU64,
    /// Acquire-to-release samples
    hold_times: RwLock<RollingAverage>,
    /// Interval between successive acquires
    frame_times: RwLock<RollingAverage>,
    last_acquire: RwLock<Option<Instant>>,
    start_time: Instant,
}

impl Default for ProcessorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessorMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            frames_acquired: AtomicU64::new(0),
            frames_released: AtomicU64::new(0),
            transient_errors: AtomicU64::new(0),
            frames_forwarded: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            dirty_pixels: AtomicU64::new(0),
            hold_times: RwLock::new(RollingAverage::new(MAX_SAMPLES)),
            frame_times: RwLock::new(RollingAverage::new(MAX_SAMPLES)),
            last_acquire: RwLock::new(None),
            start_time: Instant::now(),
        }
    }

    /// Record a successful acquire; returns the running total
    pub fn record_acquire(&self, dirty_pixels: u64) -> u64 {
        let now = Instant::now();
        if let Some(last) = self.last_acquire.write().replace(now) {
            self.frame_times.write().add(now.duration_since(last));
        }
        self.dirty_pixels.fetch_add(dirty_pixels, Ordering::Relaxed);
        self.frames_acquired.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a release and how long the buffer was held
    pub fn record_release(&self, held: Duration) {
        self.hold_times.write().add(held);
        self.frames_released.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a recoverable acquire failure
    pub fn record_transient(&self) -> u64 {
        self.transient_errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a frame queued for the sink
    pub fn record_forwarded(&self) {
        self.frames_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a forward copy dropped on a full queue
    pub fn record_dropped(&self) -> u64 {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a sink rejection
    pub fn record_sink_failure(&self) -> u64 {
        self.sink_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Total successful acquires
    pub fn frames_acquired(&self) -> u64 {
        self.frames_acquired.load(Ordering::Relaxed)
    }

    /// Total releases
    pub fn frames_released(&self) -> u64 {
        self.frames_released.load(Ordering::Relaxed)
    }

    /// Current snapshot
    pub fn snapshot(&self) -> ProcessorStats {
        let avg_frame_time = self.frame_times.read().average();
        let fps = if avg_frame_time.as_secs_f64() > 0.0 {
            1.0 / avg_frame_time.as_secs_f64()
        } else {
            0.0
        };

        ProcessorStats {
            frames_acquired: self.frames_acquired.load(Ordering::Relaxed),
            frames_released: self.frames_released.load(Ordering::Relaxed),
            transient_errors: self.transient_errors.load(Ordering::Relaxed),
            frames_forwarded: self.frames_forwarded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            dirty_pixels: self.dirty_pixels.load(Ordering::Relaxed),
            avg_hold_ms: self.hold_times.read().average().as_secs_f64() * 1000.0,
            fps,
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_average() {
        let mut avg = RollingAverage::new(3);
        avg.add(Duration::from_millis(10));
        avg.add(Duration::from_millis(20));
        avg.add(Duration::from_millis(30));
        assert_eq!(avg.average(), Duration::from_millis(20));

        // Oldest sample falls out of the window
        avg.add(Duration::from_millis(40));
        assert_eq!(avg.average(), Duration::from_millis(30));
    }

    #[test]
    fn test_counters() {
        let metrics = ProcessorMetrics::new();
        assert_eq!(metrics.record_acquire(100), 1);
        metrics.record_release(Duration::from_millis(1));
        assert_eq!(metrics.record_acquire(50), 2);

        let stats = metrics.snapshot();
        assert_eq!(stats.frames_acquired, 2);
        assert_eq!(stats.frames_released, 1);
        assert_eq!(stats.outstanding(), 1);
        assert_eq!(stats.dirty_pixels, 150);
    }
}
