//! The single producer: pulls from the selected backend (or renders status
//! cards) and publishes into the [`FrameBuffer`] at the configured cadence.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Local;
use flume::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use super::buffer::FrameBuffer;
use super::stats::StreamStatistics;
use crate::capture::{BackendKind, BackendSelection, CaptureBackend, FramePair};
use crate::config::Config;
use crate::error::{CaptureError, Result};
use crate::render::{status_frame, StatusInfo};

/// Bounded wait for the capture thread on shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Log an FPS line every this many published frames.
const LOG_EVERY: u64 = 100;

/// Escalate repeated read failures to `error` every this many in a row.
const FAILURE_ESCALATION: u32 = 3;

enum LoopState {
    Active(Box<dyn CaptureBackend>),
    Degraded,
}

pub struct CaptureLoop {
    state: LoopState,
    buffer: Arc<FrameBuffer>,
    stats: Arc<StreamStatistics>,
    period: Duration,
    width: u32,
    height: u32,
    color_enabled: bool,
    depth_enabled: bool,
    consecutive_failures: u32,
    status_sequence: u64,
}

impl CaptureLoop {
    /// Enter Active or Degraded from the probe result. There are no further
    /// transitions.
    pub fn new(
        selection: BackendSelection,
        buffer: Arc<FrameBuffer>,
        stats: Arc<StreamStatistics>,
        config: &Config,
    ) -> Self {
        let state = match selection {
            BackendSelection::Active { backend, .. } => LoopState::Active(backend),
            BackendSelection::None { diagnostic } => {
                stats.set_error(diagnostic);
                LoopState::Degraded
            }
        };

        Self {
            state,
            buffer,
            stats,
            period: config.frame_period(),
            width: config.camera.width,
            height: config.camera.height,
            color_enabled: config.kinect.color_enabled,
            depth_enabled: config.kinect.depth_enabled,
            consecutive_failures: 0,
            status_sequence: 0,
        }
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        match &self.state {
            LoopState::Active(backend) => Some(backend.kind()),
            LoopState::Degraded => None,
        }
    }

    /// Start the loop on a dedicated thread.
    pub fn spawn(self) -> Result<CaptureHandle> {
        let (stop_tx, stop_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);

        let thread = std::thread::Builder::new()
            .name("capture-loop".into())
            .spawn(move || self.run(stop_rx, done_tx))?;

        Ok(CaptureHandle {
            stop_tx,
            done_rx,
            thread: Some(thread),
        })
    }

    fn run(mut self, stop_rx: Receiver<()>, done_tx: Sender<()>) {
        self.stats.set_running(true);
        match self.backend_kind() {
            Some(kind) => info!("Starting frame capture ({})", kind),
            None => info!("Starting frame capture (degraded, status frames only)"),
        }

        loop {
            self.step();

            // Pacing sleep, cut short by a stop request.
            match stop_rx.recv_timeout(self.period) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.finish();
        let _ = done_tx.send(());
    }

    /// One capture cycle. Returns whether anything was published.
    pub fn step(&mut self) -> bool {
        let pulled = match &mut self.state {
            LoopState::Active(backend) => Some(backend.pull_frame(self.period)),
            LoopState::Degraded => None,
        };

        match pulled {
            Some(Ok(pair)) => self.publish_pair(pair),
            Some(Err(e)) => {
                self.record_miss(e.to_string());
                false
            }
            None => self.publish_status(),
        }
    }

    fn publish_pair(&mut self, pair: FramePair) -> bool {
        let FramePair { color, depth } = pair;
        let color = color.filter(|_| self.color_enabled);
        let depth = depth.filter(|_| self.depth_enabled);

        if color.is_none() && depth.is_none() {
            self.record_miss("no frame within the capture period".into());
            return false;
        }

        if self.consecutive_failures > 0 {
            debug!(
                "Capture recovered after {} failed reads",
                self.consecutive_failures
            );
            self.consecutive_failures = 0;
            self.stats.clear_error();
        }
        self.buffer.publish(color, depth);
        self.after_publish();
        true
    }

    fn publish_status(&mut self) -> bool {
        self.status_sequence += 1;
        let error = self.stats.last_error();
        let info = StatusInfo {
            frame_count: self.stats.frame_count(),
            captured_at: Local::now(),
            error: error.as_deref(),
        };

        match status_frame(self.status_sequence, self.width, self.height, &info) {
            Ok(frame) => {
                self.buffer.publish(Some(frame), None);
                self.after_publish();
                true
            }
            Err(e) => {
                error!("Failed to render status frame: {}", e);
                false
            }
        }
    }

    fn record_miss(&mut self, message: String) {
        self.consecutive_failures += 1;
        self.stats.record_failure(message.clone());
        metrics::counter!("capture_read_failures_total").increment(1);

        if self.consecutive_failures % FAILURE_ESCALATION == 0 {
            error!(
                "Capture failed {} times in a row: {}",
                self.consecutive_failures, message
            );
        } else {
            warn!("Failed to read frame: {}", message);
        }
    }

    fn after_publish(&self) {
        let frames = self.stats.record_frame();
        metrics::counter!("capture_frames_total").increment(1);

        if frames % LOG_EVERY == 0 {
            let fps = self.stats.fps();
            metrics::gauge!("capture_fps").set(fps);
            let backend = self
                .backend_kind()
                .map(|k| k.as_str())
                .unwrap_or("none");
            info!(
                "Generated {} frames (FPS: {:.1}) - Camera: {}",
                frames, fps, backend
            );
        }
    }

    fn finish(&mut self) {
        self.stats.set_running(false);
        if let LoopState::Active(backend) = &mut self.state {
            let kind = backend.kind();
            match backend.close() {
                Ok(()) => info!("{} backend released", kind),
                Err(e) => warn!("Failed to release {} backend: {}", kind, e),
            }
        }
        info!("Frame capture stopped");
    }
}

/// Owner side of a running capture loop.
///
/// Dropping the handle also stops the loop, without waiting for it.
pub struct CaptureHandle {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Ask the loop to stop and wait at most `timeout` for it. The backend is
    /// released by the capture thread itself once its in-flight cycle
    /// completes, so a timed out join never leaves it released twice.
    pub fn shutdown(mut self, timeout: Duration) -> Result<()> {
        let _ = self.stop_tx.try_send(());

        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    thread
                        .join()
                        .map_err(|_| CaptureError::Shutdown("capture thread panicked".into()))?;
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Capture thread did not stop within {:?}, detaching", timeout);
                Err(CaptureError::Shutdown(format!(
                    "capture thread still running after {timeout:?}"
                )))
            }
        }
    }
}
