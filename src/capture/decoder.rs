use jpeg_decoder::{Decoder, PixelFormat as JpegPixelFormat};

use super::frame::PixelFormat;
use crate::error::{CaptureError, Result};

/// Decode a raw capture buffer into packed RGB24.
pub fn decode_frame(data: &[u8], format: PixelFormat, width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    match format {
        PixelFormat::Mjpeg => decode_mjpeg(data, width, height),
        PixelFormat::Rgb24 => {
            if data.len() < pixels * 3 {
                return Err(CaptureError::Decode(format!(
                    "short RGB24 buffer: {} < {}",
                    data.len(),
                    pixels * 3
                )));
            }
            Ok(data[..pixels * 3].to_vec())
        }
        PixelFormat::Yuyv => {
            if data.len() < pixels * 2 {
                return Err(CaptureError::Decode(format!(
                    "short YUYV buffer: {} < {}",
                    data.len(),
                    pixels * 2
                )));
            }
            Ok(yuyv_to_rgb(&data[..pixels * 2]))
        }
    }
}

fn decode_mjpeg(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut decoder = Decoder::new(data);
    let pixels = decoder
        .decode()
        .map_err(|e| CaptureError::Decode(e.to_string()))?;
    let info = decoder
        .info()
        .ok_or_else(|| CaptureError::Decode("missing JPEG header".into()))?;

    if u32::from(info.width) != width || u32::from(info.height) != height {
        return Err(CaptureError::Decode(format!(
            "camera delivered {}x{}, expected {width}x{height}",
            info.width, info.height
        )));
    }

    match info.pixel_format {
        JpegPixelFormat::RGB24 => Ok(pixels),
        JpegPixelFormat::L8 => Ok(pixels.iter().flat_map(|&l| [l, l, l]).collect()),
        other => Err(CaptureError::Decode(format!(
            "unsupported JPEG pixel format {other:?}"
        ))),
    }
}

/// BT.601 limited range YUYV (YUY2) to RGB24, integer arithmetic.
pub fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for chunk in data.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    rgb
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_black_and_white() {
        let black = yuyv_to_rgb(&[16, 128, 16, 128]);
        assert_eq!(black, vec![0, 0, 0, 0, 0, 0]);

        let white = yuyv_to_rgb(&[235, 128, 235, 128]);
        assert_eq!(white, vec![255, 255, 255, 255, 255, 255]);
    }

    #[test]
    fn yuyv_expands_two_pixels_per_macropixel() {
        let rgb = decode_frame(&[128u8; 8], PixelFormat::Yuyv, 4, 1).unwrap();
        assert_eq!(rgb.len(), 12);
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(decode_frame(&[0u8; 5], PixelFormat::Rgb24, 2, 1).is_err());
        assert!(decode_frame(&[0u8; 3], PixelFormat::Yuyv, 2, 1).is_err());
    }

    #[test]
    fn garbage_mjpeg_is_a_decode_error() {
        let err = decode_frame(&[0x00, 0x01, 0x02], PixelFormat::Mjpeg, 1, 1).unwrap_err();
        assert!(matches!(err, CaptureError::Decode(_)));
    }
}
