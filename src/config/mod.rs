//! Configuration types for the survey pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::transforms::ColorMap;

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for sidescan tiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidescanConfig {
    /// Time-variable gain applied by the line source
    #[serde(default = "default_time_variable_gain")]
    pub time_variable_gain: f64,

    /// Normalization factor applied by the line source
    #[serde(default = "default_normalization")]
    pub normalization: f64,

    /// Apply slant-range correction to each flushed cell
    #[serde(default = "default_true")]
    pub slant_range_correction: bool,

    /// Color map used to render intensity rows
    #[serde(default)]
    pub color_map: ColorMap,

    /// Index into the source's subsystem list
    #[serde(default)]
    pub frequency_index: usize,

    /// Cell height in lines, also the sub-cell edge in pixels
    #[serde(default = "default_cell_size")]
    pub cell_size: usize,

    /// Write one PNG per sub-cell
    #[serde(default = "default_true")]
    pub separate_cells: bool,

    /// Write one full-row mosaic PNG per retained flush
    #[serde(default = "default_true")]
    pub row_mosaics: bool,

    /// Cells with a lower average forward speed (m/s) are discarded
    #[serde(default = "default_min_speed")]
    pub min_speed: f64,

    /// Cells wider than this are resampled down to it
    #[serde(default = "default_max_width")]
    pub max_width: u32,
}

fn default_time_variable_gain() -> f64 {
    250.0
}

fn default_normalization() -> f64 {
    0.2
}

fn default_true() -> bool {
    true
}

fn default_cell_size() -> usize {
    64
}

fn default_min_speed() -> f64 {
    0.8
}

fn default_max_width() -> u32 {
    2000
}

impl Default for SidescanConfig {
    fn default() -> Self {
        Self {
            time_variable_gain: default_time_variable_gain(),
            normalization: default_normalization(),
            slant_range_correction: true,
            color_map: ColorMap::default(),
            frequency_index: 0,
            cell_size: default_cell_size(),
            separate_cells: true,
            row_mosaics: true,
            min_speed: default_min_speed(),
            max_width: default_max_width(),
        }
    }
}

/// Beam decimation strategy for the bathymetry point cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecimationMode {
    /// Keep every Nth beam index
    #[default]
    Stride,
    /// Keep each beam with probability 1/N
    Probabilistic,
}

/// Configuration for the bathymetry point cloud.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BathymetryConfig {
    #[serde(default)]
    pub decimation: DecimationMode,

    /// Decimation factor N
    #[serde(default = "default_factor")]
    pub factor: usize,

    /// Seed for probabilistic decimation; entropy-seeded when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_factor() -> usize {
    1
}

impl Default for BathymetryConfig {
    fn default() -> Self {
        Self {
            decimation: DecimationMode::default(),
            factor: default_factor(),
            seed: None,
        }
    }
}

/// Tide table location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TideConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Seabed classification boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// GeoJSON feature collection of sand/rock polygons
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Feature property holding the seabed type
    #[serde(default = "default_property")]
    pub property: String,
}

fn default_property() -> String {
    "TYPE".to_string()
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            file: None,
            property: default_property(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub sidescan: SidescanConfig,

    #[serde(default)]
    pub bathymetry: BathymetryConfig,

    #[serde(default)]
    pub tides: TideConfig,

    #[serde(default)]
    pub classification: ClassificationConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ss = &self.sidescan;
        if ss.cell_size == 0 {
            return Err(ConfigError::Invalid("sidescan.cell_size must be > 0".into()));
        }
        if ss.max_width == 0 {
            return Err(ConfigError::Invalid("sidescan.max_width must be > 0".into()));
        }
        if ss.normalization <= 0.0 || ss.time_variable_gain <= 0.0 {
            return Err(ConfigError::Invalid(
                "sidescan.normalization and sidescan.time_variable_gain must be positive".into(),
            ));
        }
        if self.bathymetry.factor == 0 {
            return Err(ConfigError::Invalid("bathymetry.factor must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sidescan_config() {
        let config = SidescanConfig::default();
        assert_eq!(config.cell_size, 64);
        assert_eq!(config.max_width, 2000);
        assert!(config.slant_range_correction);
        assert_eq!(config.color_map, ColorMap::Grayscale);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "sidescan:\n  cell_size: 32\nbathymetry:\n  decimation: probabilistic\n  factor: 4\n  seed: 7\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sidescan.cell_size, 32);
        assert_eq!(config.sidescan.min_speed, 0.8);
        assert_eq!(config.bathymetry.decimation, DecimationMode::Probabilistic);
        assert_eq!(config.bathymetry.factor, 4);
        assert_eq!(config.bathymetry.seed, Some(7));
        assert_eq!(config.classification.property, "TYPE");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_factor() {
        let mut config = PipelineConfig::default();
        config.bathymetry.factor = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_yaml_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        let mut config = PipelineConfig::default();
        config.sidescan.color_map = ColorMap::Bronze;
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.sidescan.color_map, ColorMap::Bronze);
        assert_eq!(loaded.bathymetry.decimation, DecimationMode::Stride);
    }
}
