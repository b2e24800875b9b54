//! Buffering of sidescan lines into fixed-height image cells.
//!
//! Lines are appended in time order and drained from the front, `H` at a
//! time, whenever more than `H` lines are buffered. Each drained block is
//! rendered into one cell image whose geometry comes from a single pivot
//! line, the line at buffer index `H/2` when the flush starts.

use std::collections::VecDeque;

use image::{Rgb, RgbImage};
use log::debug;

use crate::config::SidescanConfig;
use crate::core::geo::GeoPoint;
use crate::core::records::SidescanLine;
use crate::core::transforms::{crop_square, draw_vertical_line, intensity_to_colors, limit_width, ColorMap};

use super::slant_range::SlantRangeCorrector;

/// Grid line color in row mosaics.
const GRID_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Result of a flush attempt.
#[derive(Debug)]
pub enum FlushOutcome {
    /// Not enough lines buffered; nothing was consumed.
    Pending,
    /// `H` lines were consumed but the vehicle was too slow to keep the cell.
    Discarded { avg_speed: f64 },
    Ready(Cell),
}

/// One flushed block of `H` lines rendered into an image.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Normalized, slant-corrected image, `H` rows tall
    pub image: RgbImage,
    pub pivot: SidescanLine,
    pub row: u32,
    /// Mean of altitude + depth over the consumed lines
    pub avg_depth: f64,
    pub avg_speed: f64,
}

/// Placement of one square tile inside a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubCell {
    /// 1-based column index within the row
    pub column: u32,
    /// Left edge in cell image pixels
    pub px: u32,
    pub location: GeoPoint,
    /// Lateral distance from nadir in meters
    pub distance: f64,
    /// Tiles left of nadir are flipped so every tile reads nadir-left
    pub mirrored: bool,
}

impl Cell {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn time_ms(&self) -> i64 {
        self.pivot.timestamp_ms
    }

    pub fn frequency(&self) -> f64 {
        self.pivot.frequency
    }

    pub fn range(&self) -> f64 {
        self.pivot.range
    }

    /// Square sub-cells of `cell_size` pixels across the image, starting at
    /// half the leftover margin. The last tile may run past the right edge;
    /// its missing pixels are black.
    ///
    /// Each tile is located through the pivot's index mapping at
    /// `px + width/2`, rescaled to the pivot's sample count.
    pub fn sub_cells(&self, cell_size: u32) -> Vec<SubCell> {
        let w = self.width();
        if cell_size == 0 || w == 0 {
            return Vec::new();
        }
        let half = w as f64 / 2.0;
        let start = (w % cell_size) / 2;
        let scale = self.pivot.width() as f64 / w as f64;

        (start..w)
            .step_by(cell_size as usize)
            .enumerate()
            .map(|(i, px)| {
                let center = px as f64 + cell_size as f64 / 2.0;
                SubCell {
                    column: i as u32 + 1,
                    px,
                    location: self
                        .pivot
                        .location_at((px as f64 + half) * scale, self.pivot.width()),
                    distance: (center - half).abs() * self.range() / w as f64,
                    mirrored: px as f64 <= half,
                }
            })
            .collect()
    }

    pub fn tile_image(&self, sub: &SubCell, cell_size: u32) -> RgbImage {
        crop_square(&self.image, sub.px, cell_size, sub.mirrored)
    }

    /// Full cell image with white grid lines at each sub-cell boundary.
    pub fn row_mosaic(&self, sub_cells: &[SubCell]) -> RgbImage {
        let mut img = self.image.clone();
        for sub in sub_cells {
            draw_vertical_line(&mut img, sub.px, GRID_COLOR);
        }
        img
    }
}

/// FIFO of sidescan lines flushed into cells of a fixed height.
#[derive(Debug)]
pub struct TileAccumulator {
    buffer: VecDeque<SidescanLine>,
    cell_height: usize,
    color_map: ColorMap,
    min_speed: f64,
    max_width: u32,
    slant_range: SlantRangeCorrector,
}

impl TileAccumulator {
    pub fn new(cell_height: usize, color_map: ColorMap) -> Self {
        Self {
            buffer: VecDeque::new(),
            cell_height: cell_height.max(1),
            color_map,
            min_speed: 0.8,
            max_width: 2000,
            slant_range: SlantRangeCorrector::new(false),
        }
    }

    pub fn from_config(config: &SidescanConfig) -> Self {
        Self::new(config.cell_size, config.color_map)
            .with_quality_gate(config.min_speed, config.max_width)
            .with_slant_range(SlantRangeCorrector::new(config.slant_range_correction))
    }

    pub fn with_quality_gate(mut self, min_speed: f64, max_width: u32) -> Self {
        self.min_speed = min_speed;
        self.max_width = max_width.max(1);
        self
    }

    pub fn with_slant_range(mut self, corrector: SlantRangeCorrector) -> Self {
        self.slant_range = corrector;
        self
    }

    pub fn cell_height(&self) -> usize {
        self.cell_height
    }

    pub fn push_lines<I: IntoIterator<Item = SidescanLine>>(&mut self, lines: I) {
        self.buffer.extend(lines);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// True when the next [`flush`](Self::flush) will consume lines.
    pub fn is_ready(&self) -> bool {
        self.buffer.len() > self.cell_height
    }

    /// Drain exactly `H` lines into a cell tagged with `row`.
    pub fn flush(&mut self, row: u32) -> FlushOutcome {
        if !self.is_ready() {
            return FlushOutcome::Pending;
        }
        let h = self.cell_height;
        let pivot = self.buffer[h / 2].clone();
        let width = pivot.width();

        let mut image = RgbImage::new(width as u32, h as u32);
        let mut depth_sum = 0.0;
        let mut speed_sum = 0.0;

        for (y, line) in self.buffer.drain(..h).enumerate() {
            depth_sum += line.state.altitude + line.state.depth;
            speed_sum += line.state.speed;

            let colors = intensity_to_colors(&line.data, self.color_map);
            for (x, rgb) in colors.into_iter().take(width).enumerate() {
                image.put_pixel(x as u32, y as u32, Rgb(rgb));
            }
        }

        let avg_depth = depth_sum / h as f64;
        let avg_speed = speed_sum / h as f64;

        if avg_speed < self.min_speed {
            debug!(
                "Discarding cell at {}: average speed {:.2} m/s",
                pivot.timestamp_ms, avg_speed
            );
            return FlushOutcome::Discarded { avg_speed };
        }

        let image = limit_width(image, self.max_width);
        let image = self
            .slant_range
            .apply(image, pivot.state.altitude, pivot.range);

        FlushOutcome::Ready(Cell {
            image,
            pivot,
            row,
            avg_depth,
            avg_speed,
        })
    }
}
