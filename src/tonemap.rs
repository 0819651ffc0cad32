//! Percentile based tone mapping of raw depth into a viewable 8-bit image.
//!
//! Depth sensors leave large regions without a return, so a plain min/max
//! scale is dominated by invalid samples. Instead the 1st and 99th percentile
//! of the *valid* samples span the output range.

use image::GrayImage;

use crate::capture::DepthFrame;

/// Kinect 11-bit depth: samples at or above `2048` carry no reading.
pub const DEFAULT_DEPTH_CEILING: u16 = 2048;

const LOW_PERCENTILE: f64 = 1.0;
const HIGH_PERCENTILE: f64 = 99.0;

/// Tone map with the Kinect 11-bit ceiling.
pub fn tone_map(depth: &DepthFrame) -> GrayImage {
    tone_map_with_ceiling(depth, DEFAULT_DEPTH_CEILING)
}

/// Samples equal to `0` or at/above `ceiling` are invalid. Returns an
/// all-zero image when nothing is valid or every valid sample is equal.
pub fn tone_map_with_ceiling(depth: &DepthFrame, ceiling: u16) -> GrayImage {
    let (width, height) = (depth.width(), depth.height());
    let samples = depth.samples();

    let Some((low, high)) = valid_range(samples, ceiling) else {
        return GrayImage::new(width, height);
    };
    if high <= low {
        return GrayImage::new(width, height);
    }

    let span = high - low;
    let pixels = samples
        .iter()
        .map(|&s| {
            let normalized = ((f64::from(s) - low) / span).clamp(0.0, 1.0);
            (normalized * 255.0) as u8
        })
        .collect();

    GrayImage::from_raw(width, height, pixels).unwrap_or_else(|| GrayImage::new(width, height))
}

/// 1st and 99th percentile of the valid samples, or `None` if there are none.
fn valid_range(samples: &[u16], ceiling: u16) -> Option<(f64, f64)> {
    // Counting sort: the valid range is bounded by the ceiling.
    let mut histogram = vec![0u32; usize::from(ceiling)];
    let mut valid = 0usize;
    for &s in samples {
        if s != 0 && s < ceiling {
            histogram[usize::from(s)] += 1;
            valid += 1;
        }
    }
    if valid == 0 {
        return None;
    }

    Some((
        percentile(&histogram, valid, LOW_PERCENTILE),
        percentile(&histogram, valid, HIGH_PERCENTILE),
    ))
}

/// Linear interpolation between closest ranks, as numpy's default method.
fn percentile(histogram: &[u32], count: usize, p: f64) -> f64 {
    let rank = p / 100.0 * (count - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    let a = f64::from(nth_value(histogram, lower));
    let b = f64::from(nth_value(histogram, upper));
    a + (b - a) * fraction
}

/// The `n`-th smallest sample (zero based) described by `histogram`.
fn nth_value(histogram: &[u32], n: usize) -> u16 {
    let mut seen = 0usize;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count as usize;
        if seen > n {
            return value as u16;
        }
    }
    histogram.len().saturating_sub(1) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, samples: Vec<u16>) -> DepthFrame {
        DepthFrame::new(0, width, height, samples).unwrap()
    }

    #[test]
    fn all_invalid_samples_give_black_image() {
        let samples = (0..64).map(|i| if i % 2 == 0 { 0 } else { 2048 + i }).collect();
        let image = tone_map(&frame(8, 8, samples));
        assert_eq!(image.dimensions(), (8, 8));
        assert!(image.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn uniform_valid_samples_do_not_divide_by_zero() {
        let mut samples = vec![700u16; 30];
        samples.extend([0, 0, 4000, 2048, 0, 0]);
        let image = tone_map(&frame(6, 6, samples));
        assert_eq!(image.dimensions(), (6, 6));
        assert!(image.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn percentiles_span_output_range_monotonically() {
        // 1..=1000 uniformly, plus invalid padding that must not shift the scale.
        let mut samples: Vec<u16> = (1..=1000).collect();
        samples.extend(std::iter::repeat(0).take(24));
        let image = tone_map(&frame(32, 32, samples.clone()));

        let mut valid: Vec<u16> = samples.iter().copied().filter(|&s| s != 0).collect();
        valid.sort_unstable();
        let (low, high) = valid_range(&samples, DEFAULT_DEPTH_CEILING).unwrap();
        // numpy.percentile(range(1, 1001), [1, 99]) == [10.99, 990.01]
        assert!((low - 10.99).abs() < 1e-9);
        assert!((high - 990.01).abs() < 1e-9);

        let at = |value: u16| {
            let idx = samples.iter().position(|&s| s == value).unwrap();
            image.as_raw()[idx]
        };
        assert_eq!(at(11), 0);
        assert!(at(990) >= 254);
        assert_eq!(at(1000), 255);
        assert_eq!(at(1), 0);

        let mut previous = 0u8;
        for value in valid {
            let mapped = at(value);
            assert!(mapped >= previous, "{value} mapped to {mapped} < {previous}");
            previous = mapped;
        }
    }

    #[test]
    fn invalid_samples_follow_the_clamped_formula() {
        let mut samples: Vec<u16> = (100..116).collect();
        samples[0] = 0;
        samples[15] = 3000;
        let image = tone_map(&frame(4, 4, samples));
        assert_eq!(image.as_raw()[0], 0);
        assert_eq!(image.as_raw()[15], 255);
    }

    #[test]
    fn configurable_ceiling_excludes_larger_samples() {
        let samples = vec![100, 200, 300, 5000];
        let open = tone_map_with_ceiling(&frame(2, 2, samples.clone()), 10_000);
        let narrow = tone_map_with_ceiling(&frame(2, 2, samples), 1000);
        assert!(open.as_raw()[2] < 255);
        assert_eq!(narrow.as_raw()[3], 255);
        assert!(narrow.as_raw()[2] > open.as_raw()[2]);
    }

    #[test]
    fn top_of_the_11_bit_range_is_a_valid_reading() {
        assert_eq!(
            valid_range(&[0, 2047, 2048, 4095], DEFAULT_DEPTH_CEILING),
            Some((2047.0, 2047.0))
        );
        assert_eq!(valid_range(&[0, 2048, 4095], DEFAULT_DEPTH_CEILING), None);
    }

    #[test]
    fn nth_value_walks_histogram() {
        let mut histogram = vec![0u32; 10];
        histogram[3] = 2;
        histogram[7] = 1;
        assert_eq!(nth_value(&histogram, 0), 3);
        assert_eq!(nth_value(&histogram, 1), 3);
        assert_eq!(nth_value(&histogram, 2), 7);
    }
}
