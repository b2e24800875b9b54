//! Sonar survey processing pipeline.
//!
//! This crate turns recorded multibeam and sidescan data into:
//! - A tide-corrected bathymetry point cloud (PLY / CSV)
//! - Slant-range corrected sidescan tiles with per-tile geolocation metadata
//! - Optional sand/rock labels from GeoJSON seabed boundaries
//!
//! # Example
//!
//! ```no_run
//! use sonar_survey::core::loaders::{load_sidescan_csv, load_swaths_csv};
//! use sonar_survey::processors::survey::{BathymetryJob, SurveyPipeline, TileJob};
//! use sonar_survey::{PipelineConfig, PointCloud};
//! use std::path::Path;
//!
//! let config = PipelineConfig::default();
//! let mut swaths = load_swaths_csv("survey/swaths.csv").unwrap();
//! let mut sidescan = load_sidescan_csv("survey/sidescan.csv").unwrap();
//! let mut cloud = PointCloud::new();
//!
//! let status = SurveyPipeline::new(&config)
//!     .run(
//!         Some(BathymetryJob { source: &mut swaths, cloud: &mut cloud }),
//!         Some(TileJob { source: &mut sidescan, output_dir: Path::new("survey/mra/sss_tiles") }),
//!     )
//!     .unwrap();
//! println!("{:?}", status.summary());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{BathymetryConfig, ClassificationConfig, PipelineConfig, SidescanConfig, TideConfig};
pub use core::loaders::PointCloud;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
