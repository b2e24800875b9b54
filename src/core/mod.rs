//! Core data types, record sources and I/O.

pub mod geo;
pub mod loaders;
pub mod records;
pub mod source;
pub mod transforms;
pub mod writers;

pub use geo::GeoPoint;
pub use loaders::{load_ply, load_sidescan_csv, load_swaths_csv, LoaderError, PointCloud};
pub use records::{BeamSample, ClassificationLabel, Pose, SidescanLine, SwathRecord, VehicleState};
pub use source::{SidescanParameters, SidescanSource, SwathSource};
pub use writers::{write_cartesian_csv, write_ply, TileRecord, TileWriter, WriteError};
