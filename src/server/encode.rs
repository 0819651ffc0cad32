//! Image encoding for HTTP responses. All of these are CPU bound and run on
//! the blocking pool.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::error::{ParameterError, ParameterErrorKind};
use image::{ExtendedColorType, GrayImage, ImageBuffer, ImageError, ImageFormat, Luma, RgbImage};

use crate::capture::{ColorFrame, DepthFrame};
use crate::error::ServerError;

/// Encode packed RGB24 as JPEG.
pub fn rgb_jpeg(data: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>, ServerError> {
    let mut out = Vec::with_capacity(data.len() / 8);
    JpegEncoder::new_with_quality(&mut out, quality).encode(
        data,
        width,
        height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

pub fn color_frame_jpeg(frame: &ColorFrame, quality: u8) -> Result<Vec<u8>, ServerError> {
    rgb_jpeg(frame.data(), frame.width(), frame.height(), quality)
}

pub fn rgb_image_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ServerError> {
    rgb_jpeg(image.as_raw(), image.width(), image.height(), quality)
}

pub fn gray_jpeg(image: &GrayImage, quality: u8) -> Result<Vec<u8>, ServerError> {
    let mut out = Vec::with_capacity(image.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut out, quality).encode(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::L8,
    )?;
    Ok(out)
}

/// Lossless 16-bit grayscale PNG of the raw depth samples.
pub fn depth_png16(depth: &DepthFrame) -> Result<Vec<u8>, ServerError> {
    let image: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(depth.width(), depth.height(), depth.samples().to_vec()).ok_or_else(
            || ImageError::Parameter(ParameterError::from_kind(ParameterErrorKind::DimensionMismatch)),
        )?;

    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_keeps_dimensions() {
        let frame = ColorFrame::new(1, 32, 16, vec![128u8; 32 * 16 * 3]).unwrap();
        let jpeg = color_frame_jpeg(&frame, 85).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }

    #[test]
    fn gray_jpeg_is_single_channel() {
        let image = GrayImage::from_pixel(8, 8, Luma([200]));
        let jpeg = gray_jpeg(&image, 90).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.color(), image::ColorType::L8);
    }

    #[test]
    fn depth_png_is_lossless() {
        let samples: Vec<u16> = (0..12).map(|i| i * 300).collect();
        let depth = DepthFrame::new(3, 4, 3, samples.clone()).unwrap();
        let png = depth_png16(&depth).unwrap();

        let decoded = image::load_from_memory(&png).unwrap().into_luma16();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.into_raw(), samples);
    }
}
