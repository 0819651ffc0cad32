//! Native libfreenect backend with callback frame delivery.
//!
//! libfreenect invokes the video/depth callbacks from inside
//! `freenect_process_events_timeout`. The callbacks copy the driver buffer
//! into an owned frame and drop it into a `Mailbox`; `pull_frame` pumps
//! events for at most one cycle budget and drains the mailbox. The driver
//! buffer pointer never outlives the callback.

use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::ffi;
use super::{
    DEPTH_FRAME_BYTES, FREENECT_DEPTH_11BIT, FREENECT_DEVICE_CAMERA, FREENECT_RESOLUTION_MEDIUM,
    FREENECT_VIDEO_RGB, RGB_FRAME_BYTES,
};
use crate::capture::backend::{BackendKind, CaptureBackend};
use crate::capture::frame::{ColorFrame, DepthFrame, FramePair};
use crate::capture::mailbox::Mailbox;
use crate::config::Config;
use crate::error::{CaptureError, Result};

const KIND: BackendKind = BackendKind::NativeDriver;

/// State reachable from the C callbacks through `freenect_set_user`.
struct CallbackContext {
    mailbox: Mailbox,
    width: u32,
    height: u32,
    color_sequence: AtomicU64,
    depth_sequence: AtomicU64,
}

pub struct NativeDriverBackend {
    ctx: *mut ffi::freenect_context,
    dev: *mut ffi::freenect_device,
    /// Strong reference handed to libfreenect as the device user pointer.
    /// Reclaimed in `close` once no callback can fire any more.
    user: *const CallbackContext,
    callbacks: Arc<CallbackContext>,
    video_started: bool,
    depth_started: bool,
}

// The raw handles are only touched from the thread that owns the backend.
unsafe impl Send for NativeDriverBackend {}

impl NativeDriverBackend {
    /// Initialise libfreenect and open device 0 in RGB + 11-bit depth mode.
    pub fn open(config: &Config) -> Result<Self> {
        let mut ctx = ptr::null_mut();
        let rc = unsafe { ffi::freenect_init(&mut ctx, ptr::null_mut()) };
        if rc < 0 || ctx.is_null() {
            return Err(CaptureError::init(KIND, format!("freenect_init returned {rc}")));
        }

        // From here on `Drop` releases whatever has been acquired.
        let mut backend = Self {
            ctx,
            dev: ptr::null_mut(),
            user: ptr::null(),
            callbacks: Arc::new(CallbackContext {
                mailbox: Mailbox::new(),
                width: super::KINECT_WIDTH,
                height: super::KINECT_HEIGHT,
                color_sequence: AtomicU64::new(0),
                depth_sequence: AtomicU64::new(0),
            }),
            video_started: false,
            depth_started: false,
        };

        unsafe { ffi::freenect_select_subdevices(ctx, FREENECT_DEVICE_CAMERA) };

        let devices = unsafe { ffi::freenect_num_devices(ctx) };
        if devices <= 0 {
            return Err(CaptureError::init(KIND, "no Kinect devices attached"));
        }
        info!("libfreenect reports {} device(s)", devices);

        let rc = unsafe { ffi::freenect_open_device(ctx, &mut backend.dev, 0) };
        if rc < 0 || backend.dev.is_null() {
            backend.dev = ptr::null_mut();
            return Err(CaptureError::init(
                KIND,
                format!(
                    "freenect_open_device returned {rc} (is the gspca_kinect kernel module loaded?)"
                ),
            ));
        }

        let video_mode =
            unsafe { ffi::freenect_find_video_mode(FREENECT_RESOLUTION_MEDIUM, FREENECT_VIDEO_RGB) };
        let depth_mode = unsafe {
            ffi::freenect_find_depth_mode(FREENECT_RESOLUTION_MEDIUM, FREENECT_DEPTH_11BIT)
        };
        if !video_mode.is_valid() || !depth_mode.is_valid() {
            return Err(CaptureError::init(KIND, "RGB/11-bit frame modes unsupported"));
        }
        if video_mode.dimensions() != (super::KINECT_WIDTH, super::KINECT_HEIGHT) {
            return Err(CaptureError::init(
                KIND,
                format!("unexpected video mode {:?}", video_mode.dimensions()),
            ));
        }

        let rc = unsafe { ffi::freenect_set_video_mode(backend.dev, video_mode) };
        if rc < 0 {
            return Err(CaptureError::init(KIND, format!("freenect_set_video_mode returned {rc}")));
        }
        let rc = unsafe { ffi::freenect_set_depth_mode(backend.dev, depth_mode) };
        if rc < 0 {
            return Err(CaptureError::init(KIND, format!("freenect_set_depth_mode returned {rc}")));
        }

        backend.user = Arc::into_raw(backend.callbacks.clone());
        unsafe {
            ffi::freenect_set_user(backend.dev, backend.user as *mut c_void);
            ffi::freenect_set_video_callback(backend.dev, video_callback);
            ffi::freenect_set_depth_callback(backend.dev, depth_callback);
        }

        if config.kinect.color_enabled {
            let rc = unsafe { ffi::freenect_start_video(backend.dev) };
            if rc < 0 {
                return Err(CaptureError::init(KIND, format!("freenect_start_video returned {rc}")));
            }
            backend.video_started = true;
        }
        if config.kinect.depth_enabled {
            let rc = unsafe { ffi::freenect_start_depth(backend.dev) };
            if rc < 0 {
                return Err(CaptureError::init(KIND, format!("freenect_start_depth returned {rc}")));
            }
            backend.depth_started = true;
        }

        Ok(backend)
    }
}

impl CaptureBackend for NativeDriverBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn describe(&self) -> String {
        "libfreenect (linked) device 0".into()
    }

    fn pull_frame(&mut self, budget: Duration) -> Result<FramePair> {
        if self.ctx.is_null() {
            return Err(CaptureError::FrameRead("device closed".into()));
        }

        let mut timeout = libc::timeval {
            tv_sec: budget.as_secs() as libc::time_t,
            tv_usec: budget.subsec_micros() as libc::suseconds_t,
        };
        let rc = unsafe { ffi::freenect_process_events_timeout(self.ctx, &mut timeout) };
        if rc < 0 {
            return Err(CaptureError::FrameRead(format!(
                "freenect_process_events_timeout returned {rc}"
            )));
        }

        Ok(self.callbacks.mailbox.drain())
    }

    fn close(&mut self) -> Result<()> {
        let mut failures = Vec::new();

        if !self.dev.is_null() {
            unsafe {
                if self.video_started && ffi::freenect_stop_video(self.dev) < 0 {
                    failures.push("freenect_stop_video");
                }
                if self.depth_started && ffi::freenect_stop_depth(self.dev) < 0 {
                    failures.push("freenect_stop_depth");
                }
                ffi::freenect_set_user(self.dev, ptr::null_mut());
                if ffi::freenect_close_device(self.dev) < 0 {
                    failures.push("freenect_close_device");
                }
            }
            self.dev = ptr::null_mut();
            self.video_started = false;
            self.depth_started = false;
        }

        if !self.user.is_null() {
            // No callback can run after the device is closed.
            drop(unsafe { Arc::from_raw(self.user) });
            self.user = ptr::null();
        }

        if !self.ctx.is_null() {
            if unsafe { ffi::freenect_shutdown(self.ctx) } < 0 {
                failures.push("freenect_shutdown");
            }
            self.ctx = ptr::null_mut();
            debug!("libfreenect context released");
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CaptureError::Shutdown(failures.join(", ")))
        }
    }
}

impl Drop for NativeDriverBackend {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("native backend shutdown: {}", e);
        }
    }
}

unsafe fn callback_context<'a>(dev: *mut ffi::freenect_device) -> Option<&'a CallbackContext> {
    let user = ffi::freenect_get_user(dev) as *const CallbackContext;
    user.as_ref()
}

unsafe extern "C" fn video_callback(dev: *mut ffi::freenect_device, data: *mut c_void, _ts: u32) {
    let Some(cb) = callback_context(dev) else {
        return;
    };
    if data.is_null() {
        return;
    }
    let raw = std::slice::from_raw_parts(data as *const u8, RGB_FRAME_BYTES);
    let sequence = cb.color_sequence.fetch_add(1, Ordering::Relaxed);
    if let Ok(frame) = ColorFrame::new(sequence, cb.width, cb.height, Bytes::copy_from_slice(raw)) {
        cb.mailbox.deposit_color(frame);
    }
}

unsafe extern "C" fn depth_callback(dev: *mut ffi::freenect_device, data: *mut c_void, _ts: u32) {
    let Some(cb) = callback_context(dev) else {
        return;
    };
    if data.is_null() {
        return;
    }
    let raw = std::slice::from_raw_parts(data as *const u8, DEPTH_FRAME_BYTES);
    let sequence = cb.depth_sequence.fetch_add(1, Ordering::Relaxed);
    if let Ok(frame) = DepthFrame::from_le_bytes(sequence, cb.width, cb.height, raw) {
        cb.mailbox.deposit_depth(frame);
    }
}
