//! Synthetic frames: the degraded-mode status card and endpoint placeholders.

use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};

use super::font::{draw_text, draw_text_centered, text_width, GLYPH_HEIGHT};
use crate::capture::ColorFrame;
use crate::error::Result;

const UNAVAILABLE_BACKGROUND: Rgb<u8> = Rgb([50, 0, 0]);
const PLACEHOLDER_BACKGROUND: Rgb<u8> = Rgb([50, 50, 50]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const ERROR_TEXT: Rgb<u8> = Rgb([255, 100, 100]);

/// Longest error message burnt into a status frame.
const MAX_ERROR_CHARS: usize = 50;

const HEADLINE: &str = "KINECT NOT AVAILABLE";

/// What a status frame reports.
#[derive(Debug, Clone)]
pub struct StatusInfo<'a> {
    pub frame_count: u64,
    pub captured_at: DateTime<Local>,
    pub error: Option<&'a str>,
}

/// Render the dark red "KINECT NOT AVAILABLE" card with frame counter, local
/// timestamp and the last error.
fn status_image(width: u32, height: u32, info: &StatusInfo<'_>) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, UNAVAILABLE_BACKGROUND);
    let h = height as i32;

    let scale = fit_scale(HEADLINE, width, 3);
    draw_text_centered(&mut image, h * 5 / 12, HEADLINE, scale, WHITE);

    let small = fit_scale("Frame: 000000", width, 2);
    draw_text(&mut image, 10, 10, &format!("Frame: {}", info.frame_count), small, WHITE);

    let line = line_height(1) as i32;
    draw_text(
        &mut image,
        10,
        h - 10 - line,
        &format_timestamp(&info.captured_at),
        1,
        WHITE,
    );

    if let Some(error) = info.error.filter(|e| !e.is_empty()) {
        let truncated: String = error.chars().take(MAX_ERROR_CHARS).collect();
        draw_text(&mut image, 10, h - 10 - 3 * line, &truncated, 1, ERROR_TEXT);
    }

    image
}

/// Status card wrapped as a publishable color frame.
pub fn status_frame(sequence: u64, width: u32, height: u32, info: &StatusInfo<'_>) -> Result<ColorFrame> {
    let image = status_image(width, height, info);
    ColorFrame::new(sequence, width, height, image.into_raw())
}

/// Dark gray card with a centred label, served when a frame kind was never
/// published.
pub fn placeholder(width: u32, height: u32, label: &str) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, PLACEHOLDER_BACKGROUND);
    let scale = fit_scale(label, width, 3);
    let y = (height as i32 - line_height(scale) as i32) / 2;
    draw_text_centered(&mut image, y, label, scale, WHITE);
    image
}

/// Largest scale up to `preferred` at which `text` fits inside `width`.
fn fit_scale(text: &str, width: u32, preferred: u32) -> u32 {
    (1..=preferred)
        .rev()
        .find(|&scale| text_width(text, scale) + 20 <= width)
        .unwrap_or(1)
}

fn line_height(scale: u32) -> u32 {
    (GLYPH_HEIGHT + 3) * scale
}

/// `YYYY-MM-DD HH:MM:SS` in the local time zone.
fn format_timestamp(time: &DateTime<Local>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, sec: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, sec).earliest().unwrap()
    }

    fn info(error: Option<&str>) -> StatusInfo<'_> {
        StatusInfo {
            frame_count: 42,
            captured_at: at(2023, 11, 14, 22, 13, 20),
            error,
        }
    }

    #[test]
    fn degraded_card_is_dark_red_with_text() {
        let image = status_image(640, 480, &info(Some("no camera")));
        assert_eq!(image.dimensions(), (640, 480));
        assert_eq!(*image.get_pixel(639, 240), UNAVAILABLE_BACKGROUND);
        assert!(image.pixels().any(|p| *p == WHITE));
        assert!(image.pixels().any(|p| *p == ERROR_TEXT));
    }

    #[test]
    fn card_without_error_has_no_error_text() {
        let image = status_image(640, 480, &info(None));
        assert_eq!(*image.get_pixel(0, 479), UNAVAILABLE_BACKGROUND);
        assert!(!image.pixels().any(|p| *p == ERROR_TEXT));
    }

    #[test]
    fn status_frame_matches_requested_size() {
        let frame = status_frame(9, 320, 240, &info(None)).unwrap();
        assert_eq!((frame.width(), frame.height()), (320, 240));
        assert_eq!(frame.sequence(), 9);
    }

    #[test]
    fn tiny_frames_do_not_panic() {
        let image = status_image(16, 8, &info(Some("x")));
        assert_eq!(image.dimensions(), (16, 8));
        let image = placeholder(4, 4, "Depth Not Available");
        assert_eq!(image.dimensions(), (4, 4));
    }

    #[test]
    fn placeholder_is_gray_with_label() {
        let image = placeholder(640, 480, "Depth Not Available");
        assert_eq!(*image.get_pixel(0, 0), PLACEHOLDER_BACKGROUND);
        assert!(image.pixels().any(|p| *p == WHITE));
    }

    #[test]
    fn timestamps_render_in_local_wall_clock() {
        assert_eq!(format_timestamp(&at(2023, 11, 14, 22, 13, 20)), "2023-11-14 22:13:20");
        assert_eq!(format_timestamp(&at(2000, 2, 29, 0, 0, 0)), "2000-02-29 00:00:00");
    }
}
