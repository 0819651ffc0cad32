//! Raw libfreenect declarations for the linked native binding.
//!
//! Only compiled with the `freenect` feature. All access goes through
//! `NativeDriverBackend`.

#![allow(non_camel_case_types)]

use std::ffi::c_void;
use std::os::raw::c_int;

use super::FrameMode;

#[repr(C)]
pub struct freenect_context {
    _private: [u8; 0],
}

#[repr(C)]
pub struct freenect_device {
    _private: [u8; 0],
}

/// Video and depth callbacks share this shape.
pub type freenect_frame_cb =
    unsafe extern "C" fn(dev: *mut freenect_device, data: *mut c_void, timestamp: u32);

#[link(name = "freenect")]
extern "C" {
    pub fn freenect_init(ctx: *mut *mut freenect_context, usb_ctx: *mut c_void) -> c_int;

    pub fn freenect_shutdown(ctx: *mut freenect_context) -> c_int;

    /// Restrict which subdevices (motor, camera, audio) are claimed on open.
    pub fn freenect_select_subdevices(ctx: *mut freenect_context, subdevs: c_int);

    pub fn freenect_num_devices(ctx: *mut freenect_context) -> c_int;

    pub fn freenect_open_device(
        ctx: *mut freenect_context,
        dev: *mut *mut freenect_device,
        index: c_int,
    ) -> c_int;

    pub fn freenect_close_device(dev: *mut freenect_device) -> c_int;

    pub fn freenect_find_video_mode(res: c_int, fmt: c_int) -> FrameMode;

    pub fn freenect_find_depth_mode(res: c_int, fmt: c_int) -> FrameMode;

    pub fn freenect_set_video_mode(dev: *mut freenect_device, mode: FrameMode) -> c_int;

    pub fn freenect_set_depth_mode(dev: *mut freenect_device, mode: FrameMode) -> c_int;

    pub fn freenect_set_user(dev: *mut freenect_device, user: *mut c_void);

    pub fn freenect_get_user(dev: *mut freenect_device) -> *mut c_void;

    pub fn freenect_set_video_callback(dev: *mut freenect_device, cb: freenect_frame_cb);

    pub fn freenect_set_depth_callback(dev: *mut freenect_device, cb: freenect_frame_cb);

    pub fn freenect_start_video(dev: *mut freenect_device) -> c_int;

    pub fn freenect_start_depth(dev: *mut freenect_device) -> c_int;

    pub fn freenect_stop_video(dev: *mut freenect_device) -> c_int;

    pub fn freenect_stop_depth(dev: *mut freenect_device) -> c_int;

    /// Pump USB events, invoking frame callbacks on the calling thread.
    pub fn freenect_process_events_timeout(
        ctx: *mut freenect_context,
        timeout: *mut libc::timeval,
    ) -> c_int;
}
