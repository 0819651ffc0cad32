use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::error::{CaptureError, Result};

/// Capture bookkeeping shared by color and depth frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMeta {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Wall clock time of capture, reported to HTTP clients.
    pub captured_at: SystemTime,
    /// Monotonic capture instant for latency tracking.
    pub timestamp: Instant,
}

impl FrameMeta {
    pub fn new(sequence: u64, width: u32, height: u32) -> Self {
        Self {
            sequence,
            width,
            height,
            captured_at: SystemTime::now(),
            timestamp: Instant::now(),
        }
    }

    /// Seconds since the Unix epoch.
    pub fn unix_timestamp(&self) -> f64 {
        self.captured_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }

    fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Packed RGB24 frame. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct ColorFrame {
    pub meta: FrameMeta,
    data: Bytes,
}

impl ColorFrame {
    pub fn new(sequence: u64, width: u32, height: u32, data: impl Into<Bytes>) -> Result<Self> {
        let meta = FrameMeta::new(sequence, width, height);
        let data = data.into();
        let expected = meta.pixel_count() * 3;
        if data.len() != expected {
            return Err(CaptureError::Decode(format!(
                "color frame {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self { meta, data })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }
}

/// Single channel depth frame of raw sensor samples.
///
/// The Kinect delivers 11-bit depth packed into 16-bit words; `0` and values at
/// or above the sensor ceiling mean "no return".
#[derive(Debug, Clone)]
pub struct DepthFrame {
    pub meta: FrameMeta,
    samples: Arc<[u16]>,
}

impl DepthFrame {
    pub fn new(sequence: u64, width: u32, height: u32, samples: impl Into<Arc<[u16]>>) -> Result<Self> {
        let meta = FrameMeta::new(sequence, width, height);
        let samples = samples.into();
        if samples.len() != meta.pixel_count() {
            return Err(CaptureError::Decode(format!(
                "depth frame {width}x{height} needs {} samples, got {}",
                meta.pixel_count(),
                samples.len()
            )));
        }
        Ok(Self { meta, samples })
    }

    /// Build a depth frame from little-endian 16-bit words as delivered by
    /// libfreenect.
    pub fn from_le_bytes(sequence: u64, width: u32, height: u32, raw: &[u8]) -> Result<Self> {
        let samples: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::new(sequence, width, height, samples)
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }
}

/// Result of one backend read: color and depth are independently optional.
#[derive(Debug, Clone, Default)]
pub struct FramePair {
    pub color: Option<ColorFrame>,
    pub depth: Option<DepthFrame>,
}

impl FramePair {
    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.depth.is_none()
    }
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Yuyv,
    Mjpeg,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_frame_rejects_wrong_length() {
        assert!(ColorFrame::new(0, 4, 4, vec![0u8; 47]).is_err());
        let frame = ColorFrame::new(7, 4, 4, vec![0u8; 48]).unwrap();
        assert_eq!(frame.sequence(), 7);
        assert_eq!(frame.data().len(), 48);
    }

    #[test]
    fn depth_frame_from_le_bytes() {
        let raw = [0x01, 0x00, 0xff, 0x07, 0x00, 0x08, 0x00, 0x00];
        let frame = DepthFrame::from_le_bytes(1, 2, 2, &raw).unwrap();
        assert_eq!(frame.samples(), &[1, 2047, 2048, 0]);
    }

    #[test]
    fn depth_frame_rejects_wrong_length() {
        assert!(DepthFrame::new(0, 3, 3, vec![0u16; 8]).is_err());
    }

    #[test]
    fn unix_timestamp_is_recent() {
        let meta = FrameMeta::new(0, 1, 1);
        assert!(meta.unix_timestamp() > 1_600_000_000.0);
    }
}
