use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use serde::Serialize;

/// Running capture statistics. Written by the capture loop, read by the
/// HTTP handlers.
pub struct StreamStatistics {
    frame_count: AtomicU64,
    read_failures: AtomicU64,
    start_time: Instant,
    running: AtomicBool,
    last_error: ArcSwapOption<String>,
}

/// Point in time copy of the statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub running: bool,
    pub frame_count: u64,
    pub read_failures: u64,
    pub fps: f64,
    pub elapsed_time: f64,
    pub error_message: Option<String>,
}

impl Default for StreamStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamStatistics {
    pub fn new() -> Self {
        Self {
            frame_count: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            start_time: Instant::now(),
            running: AtomicBool::new(false),
            last_error: ArcSwapOption::empty(),
        }
    }

    /// Count a published frame, returning the new total.
    pub fn record_frame(&self) -> u64 {
        self.frame_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn record_failure(&self, message: impl Into<String>) -> u64 {
        self.set_error(message);
        self.read_failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn set_error(&self, message: impl Into<String>) {
        self.last_error.store(Some(Arc::new(message.into())));
    }

    pub fn clear_error(&self) {
        self.last_error.store(None);
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Acquire)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.load_full().map(|e| e.as_ref().clone())
    }

    /// Average FPS over the whole run, not a sliding window.
    pub fn fps(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.frame_count() as f64 / elapsed
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.elapsed().as_secs_f64();
        let frame_count = self.frame_count();
        StatsSnapshot {
            running: self.is_running(),
            frame_count,
            read_failures: self.read_failures.load(Ordering::Acquire),
            fps: if elapsed < 0.001 {
                0.0
            } else {
                frame_count as f64 / elapsed
            },
            elapsed_time: elapsed,
            error_message: self.last_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_frames_and_failures() {
        let stats = StreamStatistics::new();
        assert_eq!(stats.record_frame(), 1);
        assert_eq!(stats.record_frame(), 2);
        assert_eq!(stats.record_failure("timeout"), 1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frame_count, 2);
        assert_eq!(snapshot.read_failures, 1);
        assert_eq!(snapshot.error_message.as_deref(), Some("timeout"));
        assert!(!snapshot.running);
    }

    #[test]
    fn fps_uses_total_elapsed_time() {
        let stats = StreamStatistics::new();
        std::thread::sleep(Duration::from_millis(20));
        for _ in 0..10 {
            stats.record_frame();
        }
        let fps = stats.fps();
        assert!(fps > 0.0);
        assert!(fps <= 10.0 / 0.02);
    }

    #[test]
    fn clear_error_resets_message() {
        let stats = StreamStatistics::new();
        stats.set_error("boom");
        stats.clear_error();
        assert_eq!(stats.last_error(), None);
    }
}
