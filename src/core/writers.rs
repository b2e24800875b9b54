//! Data writers for point clouds and sidescan tiles.
//!
//! This module provides the output sinks of the pipeline:
//! - PLY (Polygon File Format) with ASCII encoding and RGB colors
//! - CSV with Cartesian coordinates
//! - [`TileWriter`]: per-tile PNGs, full-row mosaics and the `cells.csv` metadata table

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use log::warn;
use thiserror::Error;

use super::geo::GeoPoint;
use super::loaders::PointCloud;
use super::records::ClassificationLabel;

/// Default color for points when no colors are specified (light gray).
const DEFAULT_COLOR: [u8; 3] = [180, 180, 180];

/// Name of the tile metadata table inside the output directory.
pub const METADATA_FILE: &str = "cells.csv";

/// Metadata table columns; `label` is appended when classification is enabled.
pub const METADATA_HEADER: [&str; 9] = [
    "filename",
    "time",
    "frequency",
    "range",
    "latitude",
    "longitude",
    "depth",
    "distance",
    "speed",
];

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create a directory.
    #[error("failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Image encoding error.
    #[error("failed to encode image '{path}': {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Write point cloud to ASCII PLY file with RGB colors.
///
/// The header carries the cloud's origin and point count as comments so
/// [`super::loaders::load_ply`] can restore the local frame. Points without
/// colors are written light gray.
///
/// # Errors
///
/// Returns an error if parent directories cannot be created or the file
/// cannot be written.
pub fn write_ply(path: &Path, cloud: &PointCloud) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;

    let path_str = path.display().to_string();
    let io_err = |e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    };

    let mut header = String::from("ply\nformat ascii 1.0\n");
    if let Some(origin) = cloud.metadata.origin {
        header.push_str(&format!(
            "comment origin {} {}\n",
            origin.latitude, origin.longitude
        ));
    }
    header.push_str(&format!(
        "comment total_points {}\n",
        cloud.metadata.total_points
    ));
    header.push_str(&format!("element vertex {}\n", cloud.len()));
    for prop in ["float x", "float y", "float z", "uchar red", "uchar green", "uchar blue"] {
        header.push_str(&format!("property {}\n", prop));
    }
    header.push_str("end_header\n");
    writer.write_all(header.as_bytes()).map_err(io_err)?;

    for i in 0..cloud.len() {
        let [r, g, b] = cloud
            .colors
            .as_ref()
            .and_then(|c| c.get(i).copied())
            .unwrap_or(DEFAULT_COLOR);

        writeln!(
            writer,
            "{:.6} {:.6} {:.6} {} {} {}",
            cloud.x[i], cloud.y[i], cloud.z[i], r, g, b
        )
        .map_err(io_err)?;
    }

    writer.flush().map_err(io_err)?;

    Ok(())
}

/// Write point cloud to CSV with x, y, z columns.
///
/// # Errors
///
/// Returns an error if parent directories cannot be created or the file
/// cannot be written.
pub fn write_cartesian_csv(path: &Path, cloud: &PointCloud) -> Result<()> {
    ensure_parent_dirs(path)?;

    let buf_writer = create_buffered_writer(path)?;
    let mut csv_writer = csv::Writer::from_writer(buf_writer);

    let path_str = path.display().to_string();
    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    csv_writer.write_record(["x", "y", "z"]).map_err(csv_err)?;

    for i in 0..cloud.len() {
        csv_writer
            .write_record(&[
                format!("{:.6}", cloud.x[i]),
                format!("{:.6}", cloud.y[i]),
                format!("{:.6}", cloud.z[i]),
            ])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })?;

    Ok(())
}

/// One row of the tile metadata table.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRecord {
    pub row: u32,
    pub column: u32,
    pub time_ms: i64,
    pub frequency: f64,
    pub range: f64,
    pub location: GeoPoint,
    /// Tide-corrected water depth in meters
    pub depth: f64,
    /// Lateral distance from nadir in meters
    pub distance: f64,
    pub speed: f64,
    pub label: Option<ClassificationLabel>,
}

impl TileRecord {
    /// Tile key, `t{row:03}_{col:02}`.
    pub fn name(&self) -> String {
        tile_name(self.row, self.column)
    }
}

pub fn tile_name(row: u32, column: u32) -> String {
    format!("t{:03}_{:02}", row, column)
}

pub fn row_mosaic_name(row: u32) -> String {
    format!("l{:03}.png", row)
}

/// Output sink for sidescan tiles.
///
/// Opening the writer creates the output directory and the metadata table
/// header; both are preconditions for a run. Each tile is committed as a
/// unit: if its row cannot be appended, the tile image is removed again.
pub struct TileWriter {
    dir: PathBuf,
    csv: csv::Writer<BufWriter<File>>,
    csv_path: String,
    labeled: bool,
}

impl TileWriter {
    /// Create `dir` and a fresh metadata table with its header.
    pub fn create(dir: &Path, labeled: bool) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| WriteError::CreateDirectory {
            path: dir.display().to_string(),
            source: e,
        })?;

        let csv_path = dir.join(METADATA_FILE);
        let buf_writer = create_buffered_writer(&csv_path)?;
        let mut csv = csv::Writer::from_writer(buf_writer);
        let csv_path = csv_path.display().to_string();

        let mut header: Vec<&str> = METADATA_HEADER.to_vec();
        if labeled {
            header.push("label");
        }
        csv.write_record(&header).map_err(|e| WriteError::CsvError {
            path: csv_path.clone(),
            source: e,
        })?;
        csv.flush().map_err(|e| WriteError::WriteFile {
            path: csv_path.clone(),
            source: e,
        })?;

        Ok(Self {
            dir: dir.to_path_buf(),
            csv,
            csv_path,
            labeled,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tile_path(&self, row: u32, column: u32) -> PathBuf {
        self.dir.join(format!("{}.png", tile_name(row, column)))
    }

    /// Write the tile image (when given) and its metadata row.
    pub fn commit_tile(&mut self, record: &TileRecord, image: Option<&RgbImage>) -> Result<()> {
        let path = self.tile_path(record.row, record.column);

        if let Some(img) = image {
            if let Err(e) = save_png(img, &path) {
                discard_tile(&path);
                return Err(e);
            }
        }

        if let Err(e) = self.append_row(record) {
            if image.is_some() {
                discard_tile(&path);
            }
            return Err(e);
        }

        Ok(())
    }

    /// Write the full-row mosaic `l{row:03}.png`.
    pub fn write_row_mosaic(&self, row: u32, image: &RgbImage) -> Result<PathBuf> {
        let path = self.dir.join(row_mosaic_name(row));
        save_png(image, &path)?;
        Ok(path)
    }

    /// Flush the metadata table.
    pub fn finish(mut self) -> Result<()> {
        self.csv.flush().map_err(|e| WriteError::WriteFile {
            path: self.csv_path.clone(),
            source: e,
        })
    }

    fn append_row(&mut self, record: &TileRecord) -> Result<()> {
        let mut fields = vec![
            record.name(),
            record.time_ms.to_string(),
            record.frequency.to_string(),
            record.range.to_string(),
            record.location.latitude.to_string(),
            record.location.longitude.to_string(),
            record.depth.to_string(),
            record.distance.to_string(),
            record.speed.to_string(),
        ];
        if self.labeled {
            fields.push(
                record
                    .label
                    .map(|l| l.as_str().to_string())
                    .unwrap_or_default(),
            );
        }

        self.csv
            .write_record(&fields)
            .map_err(|e| WriteError::CsvError {
                path: self.csv_path.clone(),
                source: e,
            })?;
        self.csv.flush().map_err(|e| WriteError::WriteFile {
            path: self.csv_path.clone(),
            source: e,
        })
    }
}

/// Remove a tile image that was not committed.
fn discard_tile(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove uncommitted tile {}: {}", path.display(), e),
    }
}

fn save_png(image: &RgbImage, path: &Path) -> Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| WriteError::Image {
            path: path.display().to_string(),
            source: e,
        })
}
