//! Slant-range to ground-range correction of sidescan cell images.
//!
//! A sidescan column measures slant distance from the transducer. Near nadir
//! the ground distance changes much faster than the slant distance, which
//! compresses the seabed and shows the water column as a dark band. The
//! correction resamples every row so column `x` shows the return from
//! ground distance `|x - w/2|`.

use image::RgbImage;
use rayon::prelude::*;

/// Toggle-gated slant-range correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlantRangeCorrector {
    enabled: bool,
}

impl SlantRangeCorrector {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Correct `img` for a sensor `altitude` meters above the seafloor with
    /// `range` meters per side. The output has the same dimensions; columns
    /// whose slant distance exceeds the range are black. Disabled correctors,
    /// a non-positive range or a negative altitude return the image as is.
    pub fn apply(&self, img: RgbImage, altitude: f64, range: f64) -> RgbImage {
        if !self.enabled || range <= 0.0 || altitude < 0.0 || img.width() < 2 {
            return img;
        }

        let width = img.width() as usize;
        let columns = source_columns(width, altitude, range);
        let row_len = width * 3;

        let mut out = RgbImage::new(img.width(), img.height());
        out.par_chunks_mut(row_len)
            .zip(img.par_chunks(row_len))
            .for_each(|(dst, src)| {
                for (x, tap) in columns.iter().enumerate() {
                    let Some((i0, i1, f)) = *tap else {
                        continue;
                    };
                    for k in 0..3 {
                        let a = src[i0 * 3 + k] as f64;
                        let b = src[i1 * 3 + k] as f64;
                        dst[x * 3 + k] = (a + (b - a) * f).round() as u8;
                    }
                }
            });
        out
    }
}

/// For each output column, the two source columns and blend factor to
/// sample, or `None` past the range.
fn source_columns(width: usize, altitude: f64, range: f64) -> Vec<Option<(usize, usize, f64)>> {
    let half = (width / 2) as f64;
    let px_per_meter = width as f64 / (2.0 * range);
    let altitude_px = altitude * px_per_meter;
    let last = (width - 1) as f64;

    (0..width)
        .map(|x| {
            let ground = x as f64 - half;
            let slant = (ground * ground + altitude_px * altitude_px).sqrt();
            let src = if ground < 0.0 { half - slant } else { half + slant };
            if src < 0.0 || src > last {
                return None;
            }
            let i0 = src.floor() as usize;
            let i1 = (i0 + 1).min(width - 1);
            Some((i0, i1, src - i0 as f64))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            let v = (x * 255 / (width - 1)) as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn test_disabled_passes_through() {
        let img = gradient(64, 4);
        let out = SlantRangeCorrector::new(false).apply(img.clone(), 10.0, 50.0);
        assert_eq!(out, img);
    }

    #[test]
    fn test_zero_altitude_is_identity() {
        let img = gradient(64, 4);
        let out = SlantRangeCorrector::new(true).apply(img.clone(), 0.0, 50.0);
        assert_eq!(out, img);
    }

    #[test]
    fn test_keeps_dimensions_and_removes_water_column() {
        let img = gradient(100, 3);
        // 1 px per meter, 10 m altitude
        let out = SlantRangeCorrector::new(true).apply(img.clone(), 10.0, 50.0);
        assert_eq!(out.dimensions(), img.dimensions());

        // Nadir column now shows the first seabed return, 10 px starboard
        assert_eq!(out.get_pixel(50, 0), img.get_pixel(60, 0));
        // Far edges map past the range
        assert_eq!(out.get_pixel(99, 1), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(0, 2), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_source_columns_symmetry() {
        let cols = source_columns(100, 5.0, 50.0);
        let (l0, _, _) = cols[40].unwrap();
        let (r0, _, fr) = cols[60].unwrap();
        // Mirror positions around the center column 50
        assert!(((50.0 - l0 as f64) - (r0 as f64 + fr - 50.0)).abs() <= 1.0);
    }
}
