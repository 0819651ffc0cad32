//! Generic V4L2 camera backend

use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::backend::{BackendKind, BackendProber, CaptureBackend};
use super::decoder;
use super::frame::{ColorFrame, FramePair, PixelFormat};
use crate::config::Config;
use crate::error::{CaptureError, Result};

const KIND: BackendKind = BackendKind::GenericCamera;
const BUFFER_COUNT: u32 = 4;
/// Upper bound on waiting for the very first frame while probing.
const PROBE_READ_TIMEOUT: Duration = Duration::from_secs(2);
/// Number of alternates tried after the configured index.
const ALTERNATE_INDICES: usize = 4;

/// V4L2 capture from `/dev/videoN`, decoded to RGB24.
pub struct GenericCameraBackend {
    // Released before the device.
    stream: Option<MmapStream<'static>>,
    device: Option<Box<Device>>,
    index: u32,
    format: PixelFormat,
    width: u32,
    height: u32,
    sequence: u64,
}

impl GenericCameraBackend {
    /// Open `/dev/video{index}`, negotiate MJPEG or YUYV at the configured
    /// resolution and frame rate, and start an mmap stream.
    pub fn open(index: u32, config: &Config) -> Result<Self> {
        let device = Device::new(index as usize)
            .map_err(|e| CaptureError::init(KIND, format!("/dev/video{index}: {e}")))?;

        let caps = device
            .query_caps()
            .map_err(|e| CaptureError::init(KIND, e.to_string()))?;
        debug!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::init(
                KIND,
                format!("/dev/video{index} doesn't support video capture"),
            ));
        }

        let format = preferred_format(&device)?;
        let mut fmt = device
            .format()
            .map_err(|e| CaptureError::init(KIND, e.to_string()))?;
        fmt.width = config.camera.width;
        fmt.height = config.camera.height;
        fmt.fourcc = fourcc(format);
        let actual = device
            .set_format(&fmt)
            .map_err(|e| CaptureError::init(KIND, e.to_string()))?;
        if actual.fourcc != fmt.fourcc {
            return Err(CaptureError::init(
                KIND,
                format!("driver refused {} and chose {}", fmt.fourcc, actual.fourcc),
            ));
        }
        if actual.width != config.camera.width || actual.height != config.camera.height {
            warn!(
                "/dev/video{} negotiated {}x{} instead of {}x{}",
                index, actual.width, actual.height, config.camera.width, config.camera.height
            );
        }

        if let Err(e) = device.set_params(&Parameters::with_fps(config.camera.fps)) {
            warn!("/dev/video{} ignored frame rate request: {}", index, e);
        }

        let device = Box::new(device);
        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| CaptureError::init(KIND, format!("stream setup failed: {e}")))?;

        let mut backend = Self {
            stream: Some(stream),
            device: Some(device),
            index,
            format,
            width: actual.width,
            height: actual.height,
            sequence: 0,
        };

        // "Opened" is not enough: require one decodable frame.
        backend
            .capture_frame(PROBE_READ_TIMEOUT)
            .map_err(|e| CaptureError::init(KIND, format!("/dev/video{index} opened but {e}")))?;

        info!(
            "Capture stream started on /dev/video{} ({}x{} {:?})",
            index, backend.width, backend.height, backend.format
        );
        Ok(backend)
    }

    #[instrument(skip(self), fields(index = self.index))]
    fn capture_frame(&mut self, timeout: Duration) -> Result<ColorFrame> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CaptureError::FrameRead("stream not started".into()))?;

        stream.set_timeout(timeout);
        let (buf, meta) = stream
            .next()
            .map_err(|e| CaptureError::FrameRead(e.to_string()))?;

        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };
        let rgb = decoder::decode_frame(&buf[..used], self.format, self.width, self.height)?;

        let frame = ColorFrame::new(self.sequence, self.width, self.height, rgb)?;
        self.sequence += 1;
        Ok(frame)
    }
}

fn fourcc(format: PixelFormat) -> FourCC {
    match format {
        PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
        PixelFormat::Yuyv => FourCC::new(b"YUYV"),
        PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
    }
}

/// Prefer MJPEG (less USB bandwidth), then YUYV, then raw RGB.
fn preferred_format(device: &Device) -> Result<PixelFormat> {
    let formats = device
        .enum_formats()
        .map_err(|e| CaptureError::init(KIND, e.to_string()))?;
    let supported: Vec<FourCC> = formats.iter().map(|f| f.fourcc).collect();

    [PixelFormat::Mjpeg, PixelFormat::Yuyv, PixelFormat::Rgb24]
        .into_iter()
        .find(|format| supported.contains(&fourcc(*format)))
        .ok_or_else(|| CaptureError::init(KIND, format!("no supported pixel format in {supported:?}")))
}

impl CaptureBackend for GenericCameraBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn describe(&self) -> String {
        format!("camera index {} (/dev/video{})", self.index, self.index)
    }

    fn pull_frame(&mut self, budget: Duration) -> Result<FramePair> {
        let color = self.capture_frame(budget)?;
        Ok(FramePair {
            color: Some(color),
            depth: None,
        })
    }

    fn close(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            debug!("Closed /dev/video{}", self.index);
        }
        self.device = None;
        Ok(())
    }
}

impl Drop for GenericCameraBackend {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// The configured index followed by the first four other indices.
pub fn camera_indices(preferred: u32) -> Vec<u32> {
    std::iter::once(preferred)
        .chain((0..).filter(move |i| *i != preferred).take(ALTERNATE_INDICES))
        .collect()
}

/// Tries `/dev/videoN` for the configured index and four alternates.
pub struct GenericCameraProber;

impl BackendProber for GenericCameraProber {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn open(&self, config: &Config) -> Result<Box<dyn CaptureBackend>> {
        let mut last_error = None;
        for index in camera_indices(config.camera.index) {
            match GenericCameraBackend::open(index, config) {
                Ok(backend) => return Ok(Box::new(backend)),
                Err(e) => {
                    debug!("camera index {} unavailable: {}", index, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CaptureError::init(KIND, "no camera indices to try")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_index_is_tried_first_with_four_alternates() {
        assert_eq!(camera_indices(0), vec![0, 1, 2, 3, 4]);
        assert_eq!(camera_indices(2), vec![2, 0, 1, 3, 4]);
        assert_eq!(camera_indices(9), vec![9, 0, 1, 2, 3]);
    }

    #[test]
    fn fourcc_mapping() {
        assert_eq!(fourcc(PixelFormat::Mjpeg), FourCC::new(b"MJPG"));
        assert_eq!(fourcc(PixelFormat::Yuyv), FourCC::new(b"YUYV"));
    }
}
