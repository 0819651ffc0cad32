//! libfreenect loaded from the system at runtime.
//!
//! `libfreenect` is used to check that a Kinect is attached; frames come from
//! the blocking `libfreenect_sync` wrapper. Those calls can hang when the USB
//! link stalls, so they run on a worker thread that deposits into a
//! `Mailbox`, and `pull_frame` only ever waits one cycle budget.

use std::ffi::c_void;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_NOW};
use tracing::{debug, info, warn};

use super::{
    DEPTH_FRAME_BYTES, FREENECT_DEPTH_11BIT, FREENECT_VIDEO_RGB, KINECT_HEIGHT, KINECT_WIDTH,
    RGB_FRAME_BYTES,
};
use crate::capture::backend::{BackendKind, BackendProber, CaptureBackend};
use crate::capture::frame::{ColorFrame, DepthFrame, FramePair};
use crate::capture::mailbox::Mailbox;
use crate::config::Config;
use crate::error::{CaptureError, Result};

const KIND: BackendKind = BackendKind::SystemLibrary;

const LIBRARY_DIRS: &[&str] = &[
    "/usr/local/lib",
    "/usr/lib",
    "/usr/lib/aarch64-linux-gnu",
    "/usr/lib/arm-linux-gnueabihf",
    "/usr/lib/x86_64-linux-gnu",
];
const FREENECT_LIB: &str = "libfreenect.so";
const FREENECT_SYNC_LIB: &str = "libfreenect_sync.so";

/// How long `close` waits for a worker stuck inside libfreenect_sync.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
/// Back-off after a failed sync read so a dead device does not spin.
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

type InitFn = unsafe extern "C" fn(*mut *mut c_void, *mut c_void) -> c_int;
type NumDevicesFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type ShutdownFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type SyncGetFn = unsafe extern "C" fn(*mut *mut c_void, *mut u32, c_int, c_int) -> c_int;
type SyncStopFn = unsafe extern "C" fn();

/// Resolved entry points. The libraries are kept loaded for as long as any
/// copy of the function pointers exists.
struct FreenectApi {
    init: InitFn,
    num_devices: NumDevicesFn,
    shutdown: ShutdownFn,
    sync_get_video: SyncGetFn,
    sync_get_depth: SyncGetFn,
    sync_stop: SyncStopFn,
    directory: PathBuf,
    _freenect: Library,
    _sync: Library,
}

/// Candidate directories: configured paths first, then the well-known ones.
fn search_dirs(extra: &[PathBuf]) -> Vec<PathBuf> {
    extra
        .iter()
        .cloned()
        .chain(LIBRARY_DIRS.iter().map(PathBuf::from))
        .collect()
}

/// Locate a directory holding both libfreenect and libfreenect_sync.
pub fn discover_library(extra: &[PathBuf]) -> Option<PathBuf> {
    search_dirs(extra).into_iter().find(|dir| {
        dir.join(FREENECT_LIB).exists() && dir.join(FREENECT_SYNC_LIB).exists()
    })
}

fn open_library(path: &Path) -> Result<Library> {
    unsafe { Library::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }
        .map_err(|e| CaptureError::init(KIND, format!("{}: {e}", path.display())))
}

impl FreenectApi {
    fn load(extra: &[PathBuf]) -> Result<Self> {
        let mut last_error = None;
        for dir in search_dirs(extra) {
            if !dir.join(FREENECT_LIB).exists() {
                continue;
            }
            match Self::load_from(&dir) {
                Ok(api) => return Ok(api),
                Err(e) => {
                    debug!("skipping {}: {}", dir.display(), e);
                    last_error = Some(e);
                }
            }
        }

        // Finally let the dynamic loader search its own path.
        Self::load_from(Path::new("")).map_err(|e| last_error.unwrap_or(e))
    }

    fn load_from(dir: &Path) -> Result<Self> {
        let freenect = open_library(&dir.join(FREENECT_LIB))?;
        let sync = open_library(&dir.join(FREENECT_SYNC_LIB))?;

        unsafe {
            let init = *freenect
                .get::<InitFn>(b"freenect_init\0")
                .map_err(|e| CaptureError::init(KIND, e.to_string()))?;
            let num_devices = *freenect
                .get::<NumDevicesFn>(b"freenect_num_devices\0")
                .map_err(|e| CaptureError::init(KIND, e.to_string()))?;
            let shutdown = *freenect
                .get::<ShutdownFn>(b"freenect_shutdown\0")
                .map_err(|e| CaptureError::init(KIND, e.to_string()))?;
            let sync_get_video = *sync
                .get::<SyncGetFn>(b"freenect_sync_get_video\0")
                .map_err(|e| CaptureError::init(KIND, e.to_string()))?;
            let sync_get_depth = *sync
                .get::<SyncGetFn>(b"freenect_sync_get_depth\0")
                .map_err(|e| CaptureError::init(KIND, e.to_string()))?;
            let sync_stop = *sync
                .get::<SyncStopFn>(b"freenect_sync_stop\0")
                .map_err(|e| CaptureError::init(KIND, e.to_string()))?;

            Ok(Self {
                init,
                num_devices,
                shutdown,
                sync_get_video,
                sync_get_depth,
                sync_stop,
                directory: dir.to_path_buf(),
                _freenect: freenect,
                _sync: sync,
            })
        }
    }

    /// Count attached devices with a throwaway context.
    fn device_count(&self) -> Result<i32> {
        let mut ctx = ptr::null_mut();
        let rc = unsafe { (self.init)(&mut ctx, ptr::null_mut()) };
        if rc < 0 || ctx.is_null() {
            return Err(CaptureError::init(KIND, format!("freenect_init returned {rc}")));
        }
        let count = unsafe { (self.num_devices)(ctx) };
        unsafe { (self.shutdown)(ctx) };
        Ok(count)
    }

    /// One blocking sync read; the returned buffer belongs to libfreenect_sync
    /// and is only valid until the next call, so it is copied out.
    fn read(&self, get: SyncGetFn, format: c_int, len: usize) -> Option<Vec<u8>> {
        let mut data: *mut c_void = ptr::null_mut();
        let mut timestamp = 0u32;
        let rc = unsafe { get(&mut data, &mut timestamp, 0, format) };
        if rc != 0 || data.is_null() {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts(data as *const u8, len) }.to_vec())
    }
}

struct Shared {
    api: FreenectApi,
    mailbox: Mailbox,
    running: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn record_error(&self, message: String) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some(message);
        }
    }
}

pub struct SystemLibraryBackend {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    done_rx: flume::Receiver<()>,
}

impl SystemLibraryBackend {
    pub fn open(config: &Config) -> Result<Self> {
        let api = FreenectApi::load(&config.kinect.library_paths)?;
        info!("Loaded libfreenect from {:?}", api.directory);

        let count = api.device_count()?;
        if count <= 0 {
            return Err(CaptureError::init(KIND, "no Kinect devices attached"));
        }
        info!("libfreenect reports {} device(s)", count);

        let shared = Arc::new(Shared {
            api,
            mailbox: Mailbox::new(),
            running: AtomicBool::new(true),
            last_error: Mutex::new(None),
        });

        let (done_tx, done_rx) = flume::bounded(1);
        let color = config.kinect.color_enabled;
        let depth = config.kinect.depth_enabled;
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("freenect-sync".into())
            .spawn(move || {
                poll_worker(&worker_shared, color, depth);
                let _ = done_tx.send(());
            })?;

        Ok(Self {
            shared,
            worker: Some(worker),
            done_rx,
        })
    }
}

fn poll_worker(shared: &Shared, color: bool, depth: bool) {
    let mut color_sequence = 0u64;
    let mut depth_sequence = 0u64;

    while shared.running.load(Ordering::Acquire) {
        let mut delivered = false;

        if color {
            if let Some(raw) = shared.api.read(shared.api.sync_get_video, FREENECT_VIDEO_RGB, RGB_FRAME_BYTES) {
                match ColorFrame::new(color_sequence, KINECT_WIDTH, KINECT_HEIGHT, Bytes::from(raw)) {
                    Ok(frame) => {
                        color_sequence += 1;
                        delivered = true;
                        shared.mailbox.deposit_color(frame);
                    }
                    Err(e) => shared.record_error(e.to_string()),
                }
            } else {
                shared.record_error("freenect_sync_get_video failed".into());
            }
        }

        if depth {
            if let Some(raw) = shared.api.read(shared.api.sync_get_depth, FREENECT_DEPTH_11BIT, DEPTH_FRAME_BYTES) {
                match DepthFrame::from_le_bytes(depth_sequence, KINECT_WIDTH, KINECT_HEIGHT, &raw) {
                    Ok(frame) => {
                        depth_sequence += 1;
                        delivered = true;
                        shared.mailbox.deposit_depth(frame);
                    }
                    Err(e) => shared.record_error(e.to_string()),
                }
            } else {
                shared.record_error("freenect_sync_get_depth failed".into());
            }
        }

        if !delivered {
            thread::sleep(READ_RETRY_DELAY);
        }
    }
}

impl CaptureBackend for SystemLibraryBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn describe(&self) -> String {
        format!("libfreenect_sync from {}", self.shared.api.directory.display())
    }

    fn pull_frame(&mut self, budget: Duration) -> Result<FramePair> {
        if self.worker.is_none() {
            return Err(CaptureError::FrameRead("device closed".into()));
        }
        let pair = self.shared.mailbox.drain_timeout(budget);
        if pair.is_empty() {
            let error = self.shared.last_error.lock().ok().and_then(|mut e| e.take());
            if let Some(message) = error {
                return Err(CaptureError::FrameRead(message));
            }
        }
        Ok(pair)
    }

    fn close(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.shared.running.store(false, Ordering::Release);

        match self.done_rx.recv_timeout(WORKER_JOIN_TIMEOUT) {
            Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                unsafe { (self.shared.api.sync_stop)() };
                debug!("libfreenect_sync stopped");
                Ok(())
            }
            Err(flume::RecvTimeoutError::Timeout) => {
                // The worker keeps its own reference to the loaded libraries,
                // so detaching it cannot unload code it is executing.
                Err(CaptureError::Shutdown(
                    "libfreenect_sync worker did not stop; detached".into(),
                ))
            }
        }
    }
}

impl Drop for SystemLibraryBackend {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("system library backend shutdown: {}", e);
        }
    }
}

/// Probes the system libfreenect at the configured and well-known paths.
pub struct SystemLibraryProber;

impl BackendProber for SystemLibraryProber {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn open(&self, config: &Config) -> Result<Box<dyn CaptureBackend>> {
        Ok(Box::new(SystemLibraryBackend::open(config)?))
    }
}
