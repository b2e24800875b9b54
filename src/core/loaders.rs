//! Data loaders for survey CSV recordings and PLY point clouds.
//!
//! This module provides parsers for:
//! - Multibeam swath CSV files (one row per beam)
//! - Sidescan line CSV files (one row per ping, samples as trailing columns)
//! - ASCII PLY point cloud files written by [`super::writers::write_ply`]
//!
//! It also defines the [`PointCloud`] container the bathymetry path appends to.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord};
use log::{debug, warn};
use thiserror::Error;

use super::geo::GeoPoint;
use super::records::{BeamSample, Pose, SidescanLine, SwathRecord, VehicleState};
use super::source::{MemorySidescanSource, MemorySwathSource};
use super::transforms::ColorMap;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Number of fixed columns preceding the samples in a sidescan CSV.
pub const SIDESCAN_FIXED_COLUMNS: usize = 10;

/// Upper bound on beam indices accepted from a swath CSV.
pub const MAX_BEAMS: usize = 4096;

/// Metadata carried alongside the point coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloudMetadata {
    /// Points appended by the last bathymetry run
    pub total_points: usize,
    /// Shared origin of the local north/east frame
    pub origin: Option<GeoPoint>,
}

/// Container for 3D point cloud data.
///
/// Coordinates are north (`x`), east (`y`) and depth (`z`) in meters in a
/// local tangent plane around `metadata.origin`.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
    /// Optional RGB colors for each point.
    pub colors: Option<Vec<[u8; 3]>>,
    pub metadata: CloudMetadata,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            colors: None,
            metadata: CloudMetadata::default(),
        }
    }

    /// Returns the number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Converts point cloud to a vector of [x, y, z] coordinate arrays.
    pub fn to_coords(&self) -> Vec<[f32; 3]> {
        (0..self.len())
            .map(|i| [self.x[i], self.y[i], self.z[i]])
            .collect()
    }

    /// Adds a point to the cloud.
    #[inline]
    pub fn push(&mut self, x: f32, y: f32, z: f32) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    /// Minimum and maximum depth, or `None` for an empty cloud.
    pub fn depth_bounds(&self) -> Option<(f32, f32)> {
        let mut iter = self.z.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), z| (lo.min(z), hi.max(z))))
    }

    /// Assign a color to every point from its depth, shallowest to deepest.
    pub fn colorize_by_depth(&mut self, cmap: ColorMap) {
        let Some((lo, hi)) = self.depth_bounds() else {
            return;
        };
        let span = (hi - lo).max(f32::EPSILON) as f64;
        self.colors = Some(
            self.z
                .iter()
                .map(|&z| cmap.color((z - lo) as f64 / span))
                .collect(),
        );
    }
}

fn field<T: FromStr>(record: &StringRecord, idx: usize) -> Option<T> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

fn column_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect()
}

fn require(cols: &HashMap<String, usize>, names: &[&str]) -> Result<Vec<usize>> {
    let missing: Vec<&str> = names
        .iter()
        .copied()
        .filter(|n| !cols.contains_key(*n))
        .collect();
    if !missing.is_empty() {
        return Err(LoaderError::MissingColumns(missing.join(", ")));
    }
    Ok(names.iter().map(|n| cols[*n]).collect())
}

/// Load multibeam swaths from a CSV file.
///
/// Expected header (case-insensitive, any order):
/// `timestamp_ms,latitude,longitude,depth,roll,pitch,yaw,beam,north,east,beam_depth`
///
/// One row per beam; consecutive rows sharing a timestamp form one swath and
/// the pose is taken from the first of them. Angles are in degrees. A row
/// with empty `north`, `east` or `beam_depth` is a null sample, as is any
/// beam index skipped within a swath. Rows without a usable timestamp or
/// beam index are skipped with a warning.
pub fn load_swaths_csv<P: AsRef<Path>>(path: P) -> Result<MemorySwathSource> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let cols = column_map(reader.headers()?);
    let idx = require(
        &cols,
        &[
            "timestamp_ms",
            "latitude",
            "longitude",
            "depth",
            "roll",
            "pitch",
            "yaw",
            "beam",
            "north",
            "east",
            "beam_depth",
        ],
    )?;
    let [ts_i, lat_i, lon_i, depth_i, roll_i, pitch_i, yaw_i, beam_i, north_i, east_i, bdepth_i] =
        idx[..]
    else {
        return Err(LoaderError::MissingColumns("swath columns".to_string()));
    };

    let mut swaths: Vec<SwathRecord> = Vec::new();
    let mut skipped = 0usize;

    for (row, result) in reader.records().enumerate() {
        let record = result?;

        let (Some(ts), Some(beam)) = (field::<i64>(&record, ts_i), field::<usize>(&record, beam_i))
        else {
            skipped += 1;
            debug!("{}: skipping malformed row {}", path.display(), row + 2);
            continue;
        };
        if beam >= MAX_BEAMS {
            skipped += 1;
            warn!(
                "{}: row {} has beam index {} (limit {})",
                path.display(),
                row + 2,
                beam,
                MAX_BEAMS
            );
            continue;
        }

        let sample = match (
            field::<f32>(&record, north_i),
            field::<f32>(&record, east_i),
            field::<f32>(&record, bdepth_i),
        ) {
            (Some(north), Some(east), Some(depth)) => Some(BeamSample { north, east, depth }),
            _ => None,
        };

        if swaths.last().map(|s| s.timestamp_ms) != Some(ts) {
            let pose = Pose {
                position: GeoPoint::new(
                    field(&record, lat_i).unwrap_or(0.0),
                    field(&record, lon_i).unwrap_or(0.0),
                ),
                depth: field(&record, depth_i).unwrap_or(0.0),
                roll: field::<f64>(&record, roll_i).unwrap_or(0.0).to_radians(),
                pitch: field::<f64>(&record, pitch_i).unwrap_or(0.0).to_radians(),
                yaw: field::<f64>(&record, yaw_i).unwrap_or(0.0).to_radians(),
            };
            swaths.push(SwathRecord {
                timestamp_ms: ts,
                pose,
                beams: Vec::new(),
            });
        }

        if let Some(swath) = swaths.last_mut() {
            if swath.beams.len() <= beam {
                swath.beams.resize(beam + 1, None);
            }
            swath.beams[beam] = sample;
        }
    }

    if skipped > 0 {
        warn!("{}: skipped {} malformed rows", path.display(), skipped);
    }
    if swaths.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(MemorySwathSource::new(swaths))
}

/// Load raw sidescan lines from a CSV file.
///
/// Columns, by position:
/// `timestamp_ms,subsystem,frequency,range,latitude,longitude,heading,altitude,depth,speed`
/// followed by one column per intensity sample, port to starboard. Heading
/// is in degrees. Rows with a malformed fixed column are skipped with a
/// warning; malformed samples read as 0.
pub fn load_sidescan_csv<P: AsRef<Path>>(path: P) -> Result<MemorySidescanSource> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let header_len = reader.headers()?.len();
    if header_len < SIDESCAN_FIXED_COLUMNS {
        return Err(LoaderError::MissingColumns(format!(
            "expected at least {} columns, found {}",
            SIDESCAN_FIXED_COLUMNS, header_len
        )));
    }

    let mut lines = Vec::with_capacity(4096);
    let mut skipped = 0usize;

    for result in reader.records() {
        let record = result?;

        let fixed: Option<Vec<f64>> = (0..SIDESCAN_FIXED_COLUMNS)
            .map(|i| field::<f64>(&record, i))
            .collect();
        let Some(fixed) = fixed else {
            skipped += 1;
            continue;
        };

        let data: Vec<f64> = (SIDESCAN_FIXED_COLUMNS..record.len())
            .map(|i| field(&record, i).unwrap_or(0.0))
            .collect();

        lines.push(SidescanLine {
            timestamp_ms: fixed[0] as i64,
            subsystem: fixed[1] as u32,
            frequency: fixed[2],
            range: fixed[3],
            position: GeoPoint::new(fixed[4], fixed[5]),
            heading: fixed[6].to_radians(),
            state: VehicleState {
                altitude: fixed[7],
                depth: fixed[8],
                speed: fixed[9],
            },
            data,
        });
    }

    if skipped > 0 {
        warn!("{}: skipped {} malformed rows", path.display(), skipped);
    }
    if lines.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(MemorySidescanSource::new(lines))
}

/// Load a point cloud from an ASCII PLY file.
///
/// Supports PLY files with vertex elements containing:
/// - Required: x, y, z properties
/// - Optional: red, green, blue color properties
///
/// An `origin <lat> <lon>` comment restores the cloud's local frame origin.
///
/// # Errors
///
/// Returns an error if the file is not a valid PLY or lacks required properties.
pub fn load_ply<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let first_line = lines
        .next()
        .ok_or_else(|| LoaderError::InvalidPly("Empty file".to_string()))??;

    if !first_line.trim().starts_with("ply") {
        return Err(LoaderError::InvalidPly(format!(
            "{} is not a PLY file",
            path.display()
        )));
    }

    let mut num_vertices: Option<usize> = None;
    let mut prop_names: Vec<String> = Vec::new();
    let mut origin: Option<GeoPoint> = None;
    let mut header_done = false;

    for line in &mut lines {
        let line = line?;
        let stripped = line.trim();

        if stripped.starts_with("element vertex") {
            num_vertices = stripped
                .split_whitespace()
                .last()
                .and_then(|s| s.parse().ok());
        } else if stripped.starts_with("property") {
            if let Some(name) = stripped.split_whitespace().last() {
                prop_names.push(name.to_string());
            }
        } else if let Some(rest) = stripped.strip_prefix("comment origin") {
            let parts: Vec<f64> = rest
                .split_whitespace()
                .filter_map(|s| s.parse().ok())
                .collect();
            if let [lat, lon] = parts[..] {
                origin = Some(GeoPoint::new(lat, lon));
            }
        } else if stripped == "end_header" {
            header_done = true;
            break;
        }
    }

    let num_vertices = num_vertices
        .ok_or_else(|| LoaderError::InvalidPly("No vertex count in header".to_string()))?;

    if !header_done {
        return Err(LoaderError::InvalidPly("Missing end_header".to_string()));
    }

    let prop_idx: HashMap<&str, usize> = prop_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let lookup = |name: &str| {
        prop_idx
            .get(name)
            .copied()
            .ok_or_else(|| LoaderError::MissingColumns(name.to_string()))
    };
    let (x_idx, y_idx, z_idx) = (lookup("x")?, lookup("y")?, lookup("z")?);

    let color_idx = match (lookup("red"), lookup("green"), lookup("blue")) {
        (Ok(r), Ok(g), Ok(b)) => Some((r, g, b)),
        _ => None,
    };

    let mut cloud = PointCloud::with_capacity(num_vertices);
    let mut colors = Vec::with_capacity(if color_idx.is_some() { num_vertices } else { 0 });

    let parse = |values: &[&str], i: usize, axis: &str| -> Result<f32> {
        values[i]
            .parse()
            .map_err(|_| LoaderError::ParseError(format!("Invalid {} value: {}", axis, values[i])))
    };

    for line in lines {
        if cloud.len() >= num_vertices {
            break;
        }

        let line = line?;
        let values: Vec<&str> = line.split_whitespace().collect();

        if values.len() < prop_names.len() {
            continue;
        }

        cloud.push(
            parse(&values, x_idx, "x")?,
            parse(&values, y_idx, "y")?,
            parse(&values, z_idx, "z")?,
        );

        if let Some((r, g, b)) = color_idx {
            colors.push([
                values[r].parse().unwrap_or(180),
                values[g].parse().unwrap_or(180),
                values[b].parse().unwrap_or(180),
            ]);
        }
    }

    if cloud.len() < num_vertices {
        return Err(LoaderError::InvalidPly(format!(
            "Expected {} vertices, found {}",
            num_vertices,
            cloud.len()
        )));
    }

    if color_idx.is_some() {
        cloud.colors = Some(colors);
    }
    cloud.metadata = CloudMetadata {
        total_points: num_vertices,
        origin,
    };

    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::source::{SidescanParameters, SidescanSource, SwathSource};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_point_cloud_operations() {
        let mut cloud = PointCloud::new();
        assert!(cloud.is_empty());
        assert_eq!(cloud.depth_bounds(), None);

        cloud.push(1.0, 2.0, 3.0);
        cloud.push(4.0, 5.0, 6.0);

        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.to_coords()[1], [4.0, 5.0, 6.0]);
        assert_eq!(cloud.depth_bounds(), Some((3.0, 6.0)));
    }

    #[test]
    fn test_colorize_by_depth() {
        let mut cloud = PointCloud::new();
        cloud.push(0.0, 0.0, 10.0);
        cloud.push(0.0, 0.0, 20.0);
        cloud.colorize_by_depth(ColorMap::Grayscale);

        let colors = cloud.colors.unwrap();
        assert_eq!(colors[0], [0, 0, 0]);
        assert_eq!(colors[1], [255, 255, 255]);
    }

    #[test]
    fn test_load_swaths_csv_groups_and_nulls() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timestamp_ms,latitude,longitude,depth,roll,pitch,yaw,beam,north,east,beam_depth").unwrap();
        writeln!(file, "1000,41.0,-8.0,2.0,0,0,90,0,0.5,-3.0,12.5").unwrap();
        writeln!(file, "1000,41.0,-8.0,2.0,0,0,90,1,,,").unwrap();
        writeln!(file, "1000,41.0,-8.0,2.0,0,0,90,3,0.5,3.0,12.9").unwrap();
        writeln!(file, "1100,41.0,-8.0,2.0,0,0,90,0,0.4,-3.0,12.4").unwrap();
        writeln!(file, "oops,41.0,-8.0,2.0,0,0,90,0,0.4,-3.0,12.4").unwrap();
        file.flush().unwrap();

        let mut source = load_swaths_csv(file.path())?;
        assert_eq!(source.len(), 2);

        let first = source.next_swath().unwrap();
        assert_eq!(first.num_beams(), 4);
        assert!(first.beams[1].is_none());
        assert!(first.beams[2].is_none());
        assert_eq!(first.beams[3].unwrap().depth, 12.9);
        assert!((first.pose.yaw - std::f64::consts::FRAC_PI_2).abs() < 1e-12);

        let second = source.next_swath().unwrap();
        assert_eq!(second.timestamp_ms, 1100);
        assert_eq!(second.num_beams(), 1);

        Ok(())
    }

    #[test]
    fn test_load_swaths_csv_skips_huge_beam_index() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timestamp_ms,latitude,longitude,depth,roll,pitch,yaw,beam,north,east,beam_depth").unwrap();
        writeln!(file, "1000,41.0,-8.0,2.0,0,0,0,0,0.5,-3.0,12.5").unwrap();
        writeln!(file, "1000,41.0,-8.0,2.0,0,0,0,18446744073709551614,0.5,3.0,12.9").unwrap();
        writeln!(file, "1000,41.0,-8.0,2.0,0,0,0,{},0.5,3.0,12.9", MAX_BEAMS).unwrap();
        file.flush().unwrap();

        let mut source = load_swaths_csv(file.path())?;
        let swath = source.next_swath().unwrap();
        assert_eq!(swath.num_beams(), 1);

        Ok(())
    }

    #[test]
    fn test_load_swaths_csv_missing_columns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timestamp_ms,latitude,longitude").unwrap();
        writeln!(file, "1000,41.0,-8.0").unwrap();
        file.flush().unwrap();

        let err = load_swaths_csv(file.path()).unwrap_err();
        assert!(matches!(err, LoaderError::MissingColumns(_)));
    }

    #[test]
    fn test_load_sidescan_csv() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "timestamp_ms,subsystem,frequency,range,latitude,longitude,heading,altitude,depth,speed,s0,s1,s2,s3"
        )
        .unwrap();
        writeln!(file, "2000,1,770000,40,41.0,-8.0,180,5.0,2.0,1.3,1,2,2,1").unwrap();
        writeln!(file, "1000,1,770000,40,41.0,-8.0,180,5.0,2.0,1.3,1,2,2,1").unwrap();
        writeln!(file, "bad,1,770000,40,41.0,-8.0,180,5.0,2.0,1.3,1,2,2,1").unwrap();
        file.flush().unwrap();

        let mut source = load_sidescan_csv(file.path())?;
        assert_eq!(source.len(), 2);
        assert_eq!(source.first_timestamp(), Some(1000));
        assert_eq!(source.subsystems(), vec![1]);

        let params = SidescanParameters::new(0.2, 250.0);
        let lines = source.lines_between(1000, 2000, 1, &params);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].width(), 4);
        assert_eq!(lines[0].state.speed, 1.3);
        assert!((lines[0].heading - std::f64::consts::PI).abs() < 1e-12);

        Ok(())
    }

    #[test]
    fn test_load_ply() -> Result<()> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ply").unwrap();
        writeln!(file, "format ascii 1.0").unwrap();
        writeln!(file, "comment origin 41.5 -8.25").unwrap();
        writeln!(file, "element vertex 2").unwrap();
        writeln!(file, "property float x").unwrap();
        writeln!(file, "property float y").unwrap();
        writeln!(file, "property float z").unwrap();
        writeln!(file, "property uchar red").unwrap();
        writeln!(file, "property uchar green").unwrap();
        writeln!(file, "property uchar blue").unwrap();
        writeln!(file, "end_header").unwrap();
        writeln!(file, "1.0 2.0 3.0 255 0 0").unwrap();
        writeln!(file, "4.0 5.0 6.0 0 255 0").unwrap();
        file.flush().unwrap();

        let cloud = load_ply(file.path())?;
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.y[1], 5.0);
        assert_eq!(cloud.metadata.origin, Some(GeoPoint::new(41.5, -8.25)));

        let colors = cloud.colors.unwrap();
        assert_eq!(colors[0], [255, 0, 0]);

        Ok(())
    }

    #[test]
    fn test_load_ply_rejects_other_files() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "x,y,z").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            load_ply(file.path()),
            Err(LoaderError::InvalidPly(_))
        ));
    }
}
