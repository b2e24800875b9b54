//! Intensity transforms and image operations for sidescan data.
//!
//! This module provides the color maps used to render sidescan rows, the
//! normalization and time-variable gain applied to raw intensity profiles,
//! and the width resampling used to bound cell images.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Color map applied to normalized intensities in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMap {
    #[default]
    Grayscale,
    Bronze,
    Jet,
}

const BRONZE_STOPS: &[(f64, [u8; 3])] = &[
    (0.0, [0, 0, 0]),
    (0.5, [184, 115, 51]),
    (1.0, [255, 255, 204]),
];

const JET_STOPS: &[(f64, [u8; 3])] = &[
    (0.0, [0, 0, 143]),
    (0.125, [0, 0, 255]),
    (0.375, [0, 255, 255]),
    (0.625, [255, 255, 0]),
    (0.875, [255, 0, 0]),
    (1.0, [128, 0, 0]),
];

impl ColorMap {
    /// Map an intensity to RGB. Values outside `[0, 1]` are clamped; NaN maps to black.
    pub fn color(&self, value: f64) -> [u8; 3] {
        let v = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        match self {
            ColorMap::Grayscale => {
                let g = (v * 255.0).round() as u8;
                [g, g, g]
            }
            ColorMap::Bronze => interpolate(BRONZE_STOPS, v),
            ColorMap::Jet => interpolate(JET_STOPS, v),
        }
    }
}

fn interpolate(stops: &[(f64, [u8; 3])], v: f64) -> [u8; 3] {
    for pair in stops.windows(2) {
        let (v0, c0) = pair[0];
        let (v1, c1) = pair[1];
        if v <= v1 {
            let t = if v1 > v0 { (v - v0) / (v1 - v0) } else { 0.0 };
            let mut out = [0u8; 3];
            for k in 0..3 {
                out[k] = (c0[k] as f64 + (c1[k] as f64 - c0[k] as f64) * t).round() as u8;
            }
            return out;
        }
    }
    stops.last().map(|&(_, c)| c).unwrap_or([0, 0, 0])
}

/// Map intensity values to RGB colors with the given color map.
///
/// Parallelized using Rayon.
pub fn intensity_to_colors(values: &[f64], cmap: ColorMap) -> Vec<[u8; 3]> {
    values.par_iter().map(|&v| cmap.color(v)).collect()
}

/// Normalize a raw sidescan profile and apply time-variable gain.
///
/// Each side (port = first half, starboard = second half) is divided by its
/// mean scaled by `normalization`. Samples are amplified by
/// `10^(|30 ln r| / tvg_gain)` where `r` is the relative distance from the
/// outer edge of that side, so far-range returns get the largest boost.
pub fn apply_normalization_and_tvg(data: &mut [f64], normalization: f64, tvg_gain: f64) {
    let len = data.len();
    let middle = len / 2;
    if middle == 0 || normalization <= 0.0 || tvg_gain <= 0.0 {
        return;
    }

    let port_sum: f64 = data[..middle].iter().sum();
    let starboard_sum: f64 = data[middle..].iter().sum();
    let port_avg = port_sum / (middle as f64 * normalization);
    let starboard_avg = starboard_sum / ((len - middle) as f64 * normalization);

    let min_r = 1.0 / middle as f64;
    for (c, sample) in data.iter_mut().enumerate() {
        let (r, avg) = if c < middle {
            (c as f64 / middle as f64, port_avg)
        } else {
            (1.0 - (c - middle) as f64 / middle as f64, starboard_avg)
        };
        let r = r.max(min_r);
        let gain = (30.0 * r.ln()).abs();
        let boosted = *sample * 10f64.powf(gain / tvg_gain);
        *sample = if avg > 0.0 { boosted / avg } else { 0.0 };
    }
}

/// Resample an image to `max_width` columns with bilinear filtering when it
/// is wider; narrower or equal images are returned unchanged.
pub fn limit_width(img: RgbImage, max_width: u32) -> RgbImage {
    if img.width() <= max_width {
        return img;
    }
    imageops::resize(&img, max_width, img.height(), FilterType::Triangle)
}

/// Copy a `size` x `size` block starting at column `x`, optionally mirrored
/// left-to-right. Pixels outside the source stay black.
pub fn crop_square(img: &RgbImage, x: u32, size: u32, mirrored: bool) -> RgbImage {
    let mut out = RgbImage::new(size, size);
    let rows = size.min(img.height());
    for dy in 0..rows {
        for dx in 0..size {
            let sx = x + dx;
            if sx >= img.width() {
                continue;
            }
            let tx = if mirrored { size - 1 - dx } else { dx };
            out.put_pixel(tx, dy, *img.get_pixel(sx, dy));
        }
    }
    out
}

/// Draw a vertical line of `color` at column `x`.
pub fn draw_vertical_line(img: &mut RgbImage, x: u32, color: Rgb<u8>) {
    if x >= img.width() {
        return;
    }
    for y in 0..img.height() {
        img.put_pixel(x, y, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grayscale_endpoints() {
        assert_eq!(ColorMap::Grayscale.color(0.0), [0, 0, 0]);
        assert_eq!(ColorMap::Grayscale.color(1.0), [255, 255, 255]);
        assert_eq!(ColorMap::Grayscale.color(7.5), [255, 255, 255]);
        assert_eq!(ColorMap::Grayscale.color(f64::NAN), [0, 0, 0]);
    }

    #[test]
    fn test_bronze_midpoint() {
        assert_eq!(ColorMap::Bronze.color(0.5), [184, 115, 51]);
        assert_eq!(ColorMap::Bronze.color(1.0), [255, 255, 204]);
    }

    #[test]
    fn test_intensity_to_colors() {
        let colors = intensity_to_colors(&[0.0, 1.0], ColorMap::Jet);
        assert_eq!(colors, vec![[0, 0, 143], [128, 0, 0]]);
    }

    #[test]
    fn test_tvg_flat_profile_is_symmetric() {
        let mut data = vec![1.0; 10];
        apply_normalization_and_tvg(&mut data, 0.2, 250.0);
        // First starboard column sits at nadir and gets no gain: 1.0 / (1.0 / 0.2)
        assert!((data[5] - 0.2).abs() < 1e-9);
        // Columns at the same relative distance get the same gain
        assert!((data[1] - data[9]).abs() < 1e-9);
        assert!(data[9] > data[5]);
    }

    #[test]
    fn test_tvg_zero_profile_stays_zero() {
        let mut data = vec![0.0; 8];
        apply_normalization_and_tvg(&mut data, 0.2, 250.0);
        assert!(data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_limit_width() {
        let wide = RgbImage::new(2600, 4);
        let resized = limit_width(wide, 2000);
        assert_eq!(resized.dimensions(), (2000, 4));

        let exact = RgbImage::from_pixel(2000, 4, Rgb([9, 9, 9]));
        let kept = limit_width(exact.clone(), 2000);
        assert_eq!(kept, exact);
    }

    #[test]
    fn test_crop_square_mirrored() {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(0, 0, Rgb([10, 0, 0]));
        img.put_pixel(1, 0, Rgb([20, 0, 0]));

        let straight = crop_square(&img, 0, 2, false);
        assert_eq!(straight.get_pixel(0, 0), &Rgb([10, 0, 0]));

        let mirrored = crop_square(&img, 0, 2, true);
        assert_eq!(mirrored.get_pixel(0, 0), &Rgb([20, 0, 0]));
        assert_eq!(mirrored.get_pixel(1, 0), &Rgb([10, 0, 0]));
    }
}
