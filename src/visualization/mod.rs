//! Top-down previews of bathymetry point clouds.
//!
//! Points are drawn east (horizontal) against north (vertical), colored by
//! depth, using the plotters bitmap backend. No axes or labels are drawn.

use std::path::Path;

use log::debug;
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::core::loaders::PointCloud;
use crate::core::transforms::ColorMap;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Empty point cloud")]
    EmptyPointCloud,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Preview rendering options.
#[derive(Debug, Clone, Copy)]
pub struct PreviewOptions {
    pub width: u32,
    pub height: u32,
    /// Maximum number of points to plot (subsamples if exceeded)
    pub max_points: usize,
    pub point_size: u32,
    /// Used when the cloud carries no colors of its own
    pub color_map: ColorMap,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            max_points: 1_000_000,
            point_size: 1,
            color_map: ColorMap::Jet,
        }
    }
}

fn plot_err<E: std::fmt::Display>(e: E) -> VisualizationError {
    VisualizationError::PlottingError(e.to_string())
}

/// Render `cloud` as a depth-colored scatter plot and save it as PNG.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `cloud` - Bathymetry cloud in the local (north, east, depth) frame
/// * `options` - Image size, subsampling and coloring
pub fn plot_bathymetry(output_path: &Path, cloud: &PointCloud, options: &PreviewOptions) -> Result<()> {
    if cloud.is_empty() {
        return Err(VisualizationError::EmptyPointCloud);
    }

    let colors = match &cloud.colors {
        Some(colors) if colors.len() == cloud.len() => colors.clone(),
        _ => {
            let mut colored = cloud.clone();
            colored.colorize_by_depth(options.color_map);
            colored.colors.unwrap_or_default()
        }
    };

    let n = cloud.len();
    let step = n.div_ceil(options.max_points.max(1)).max(1);
    let points: Vec<(f32, f32, RGBColor)> = (0..n)
        .step_by(step)
        .map(|i| {
            let [r, g, b] = colors.get(i).copied().unwrap_or([100, 149, 237]);
            (cloud.y[i], cloud.x[i], RGBColor(r, g, b))
        })
        .collect();
    debug!("Plotting {} of {} points", points.len(), n);

    let (x_min, x_max, y_min, y_max) = compute_bounds(&points);
    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;

    let root = BitMapBackend::new(output_path, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(
            (x_min - x_padding)..(x_max + x_padding),
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(plot_err)?;

    chart
        .draw_series(
            points
                .iter()
                .map(|(x, y, color)| Circle::new((*x, *y), options.point_size, color.filled())),
        )
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;

    Ok(())
}

/// Compute the bounds (min/max) for x and y coordinates.
fn compute_bounds(points: &[(f32, f32, RGBColor)]) -> (f32, f32, f32, f32) {
    let mut x_min = f32::MAX;
    let mut x_max = f32::MIN;
    let mut y_min = f32::MAX;
    let mut y_max = f32::MIN;

    for (x, y, _) in points {
        x_min = x_min.min(*x);
        x_max = x_max.max(*x);
        y_min = y_min.min(*y);
        y_max = y_max.max(*y);
    }

    if (x_max - x_min).abs() < f32::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    if (y_max - y_min).abs() < f32::EPSILON {
        y_min -= 1.0;
        y_max += 1.0;
    }

    (x_min, x_max, y_min, y_max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_cloud_is_rejected() {
        let dir = tempdir().unwrap();
        let err = plot_bathymetry(
            &dir.path().join("empty.png"),
            &PointCloud::new(),
            &PreviewOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, VisualizationError::EmptyPointCloud));
    }

    #[test]
    fn test_plot_bathymetry_writes_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preview.png");

        let mut cloud = PointCloud::new();
        for i in 0..50 {
            cloud.push(i as f32, (i % 7) as f32, 10.0 + i as f32 * 0.2);
        }
        let options = PreviewOptions {
            width: 200,
            height: 100,
            max_points: 20,
            ..PreviewOptions::default()
        };

        plot_bathymetry(&path, &cloud, &options).unwrap();
        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (200, 100));
    }

    #[test]
    fn test_compute_bounds_pads_degenerate_axes() {
        let points = vec![(1.0, 2.0, RGBColor(0, 0, 0)), (1.0, 5.0, RGBColor(0, 0, 0))];
        let (x_min, x_max, y_min, y_max) = compute_bounds(&points);
        assert_eq!((x_min, x_max), (0.0, 2.0));
        assert_eq!((y_min, y_max), (2.0, 5.0));
    }
}
