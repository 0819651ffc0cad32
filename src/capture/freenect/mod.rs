//! Kinect access through libfreenect.
//!
//! Two flavours exist: the native backend links libfreenect at build time
//! (`freenect` feature) and receives frames through driver callbacks; the
//! system library backend loads libfreenect and libfreenect_sync at runtime
//! and polls them.

#[cfg(feature = "freenect")]
mod ffi;
#[cfg(feature = "freenect")]
mod native;
mod system;

use std::os::raw::c_int;

#[cfg(feature = "freenect")]
pub use native::NativeDriverBackend;
pub use system::{discover_library, SystemLibraryBackend, SystemLibraryProber};

use super::backend::{BackendKind, BackendProber, CaptureBackend};
use crate::config::Config;
use crate::error::Result;

/// Whether the native libfreenect binding was compiled into this binary.
pub const NATIVE_BINDING_AVAILABLE: bool = cfg!(feature = "freenect");

/// The Kinect v1 delivers 640x480 at `FREENECT_RESOLUTION_MEDIUM`.
pub const KINECT_WIDTH: u32 = 640;
pub const KINECT_HEIGHT: u32 = 480;

pub(crate) const RGB_FRAME_BYTES: usize = (KINECT_WIDTH * KINECT_HEIGHT * 3) as usize;
pub(crate) const DEPTH_FRAME_BYTES: usize = (KINECT_WIDTH * KINECT_HEIGHT * 2) as usize;

// libfreenect enum values
#[cfg_attr(not(feature = "freenect"), allow(dead_code))]
pub(crate) const FREENECT_RESOLUTION_MEDIUM: c_int = 1;
pub(crate) const FREENECT_VIDEO_RGB: c_int = 0;
pub(crate) const FREENECT_DEPTH_11BIT: c_int = 0;
#[cfg_attr(not(feature = "freenect"), allow(dead_code))]
pub(crate) const FREENECT_DEVICE_CAMERA: c_int = 0x02;

/// `freenect_frame_mode`, passed by value across the FFI boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[cfg_attr(not(feature = "freenect"), allow(dead_code))]
pub(crate) struct FrameMode {
    reserved: u32,
    resolution: c_int,
    format: i32,
    bytes: i32,
    width: i16,
    height: i16,
    data_bits_per_pixel: i8,
    padding_bits_per_pixel: i8,
    framerate: i8,
    is_valid: i8,
}

#[cfg_attr(not(feature = "freenect"), allow(dead_code))]
impl FrameMode {
    pub(crate) fn is_valid(&self) -> bool {
        self.is_valid != 0
    }

    pub(crate) fn dimensions(&self) -> (u32, u32) {
        (self.width.max(0) as u32, self.height.max(0) as u32)
    }
}

/// Opens the linked libfreenect, device 0, RGB video plus 11-bit depth.
pub struct NativeDriverProber;

impl BackendProber for NativeDriverProber {
    fn kind(&self) -> BackendKind {
        BackendKind::NativeDriver
    }

    #[cfg(feature = "freenect")]
    fn open(&self, config: &Config) -> Result<Box<dyn CaptureBackend>> {
        Ok(Box::new(NativeDriverBackend::open(config)?))
    }

    #[cfg(not(feature = "freenect"))]
    fn open(&self, _config: &Config) -> Result<Box<dyn CaptureBackend>> {
        Err(crate::error::CaptureError::init(
            BackendKind::NativeDriver,
            "native libfreenect binding not compiled in (build with --features freenect)",
        ))
    }
}
