//! Survey processing stages.

pub mod accumulator;
pub mod bathymetry;
pub mod classification;
pub mod slant_range;
pub mod survey;
pub mod tide;

// Re-export key types for convenience
pub use accumulator::{Cell, FlushOutcome, SubCell, TileAccumulator};
pub use bathymetry::{BathymetryStats, Decimation, PointCloudBuilder};
pub use classification::{ClassificationError, Polygon, PolygonSet, RegionClassifier, Verdict};
pub use slant_range::SlantRangeCorrector;
pub use survey::{
    BathymetryJob, CancelToken, PipelineError, RunStatus, RunSummary, StepProgress, SurveyPipeline,
    TileJob,
};
pub use tide::{TideCorrector, TideError, TideTable};
