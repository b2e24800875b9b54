//! Time-driven survey loop tying the bathymetry and tiling paths together.
//!
//! The loop walks the survey in one-second steps from the earliest to the
//! latest record of the configured sources. Each step feeds the swaths and
//! sidescan lines of `[t, t + 1s)` to their path; the tiling path flushes at
//! most one cell per step. Cancellation is polled before every step.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::core::loaders::PointCloud;
use crate::core::records::SwathRecord;
use crate::core::source::{
    MemorySidescanSource, MemorySwathSource, SidescanParameters, SidescanSource, SwathSource,
};
use crate::core::writers::{TileRecord, TileWriter, WriteError};

use super::accumulator::{Cell, FlushOutcome, TileAccumulator};
use super::bathymetry::PointCloudBuilder;
use super::classification::{ClassificationError, RegionClassifier, Verdict};
use super::tide::TideCorrector;

/// Length of one loop step in milliseconds.
pub const STEP_MS: i64 = 1000;

/// Errors that abort a survey run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("output error: {0}")]
    Output(#[from] WriteError),

    #[error("classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("sidescan source has no subsystems")]
    NoSubsystems,

    #[error("frequency index {index} out of range ({available} subsystems available)")]
    FrequencyIndex { index: usize, available: usize },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Shared cancellation flag, polled once per loop step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Install a Ctrl-C handler that cancels this token.
    pub fn cancel_on_ctrl_c(&self) -> std::result::Result<(), ctrlc::Error> {
        let flag = self.cancelled.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
    }
}

/// Counters collected over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub steps: usize,
    pub swaths: usize,
    pub points: usize,
    pub null_beams: usize,
    pub tide_misses: usize,
    /// Flushes that consumed lines, kept or not
    pub flushes: usize,
    pub discarded_slow: usize,
    /// Retained flushes
    pub rows: usize,
    pub tiles_written: usize,
    /// Tiles suppressed by classification
    pub tiles_dropped: usize,
    pub write_failures: usize,
}

/// How a run ended. Fatal failures are reported as [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed(RunSummary),
    Cancelled(RunSummary),
}

impl RunStatus {
    pub fn summary(&self) -> &RunSummary {
        match self {
            RunStatus::Completed(s) | RunStatus::Cancelled(s) => s,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunStatus::Cancelled(_))
    }
}

/// Progress reported after each completed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepProgress {
    /// 1-based index of the step just completed
    pub step: usize,
    pub total_steps: usize,
    pub time_ms: i64,
}

/// Inputs of the bathymetry path.
pub struct BathymetryJob<'a, W> {
    pub source: &'a mut W,
    pub cloud: &'a mut PointCloud,
}

/// Inputs of the tiling path.
pub struct TileJob<'a, S> {
    pub source: &'a mut S,
    pub output_dir: &'a Path,
}

/// Runs the survey loop over configured sources.
pub struct SurveyPipeline<'a> {
    config: &'a PipelineConfig,
    cancel: CancelToken,
    on_step: Option<Box<dyn FnMut(StepProgress) + 'a>>,
}

impl<'a> SurveyPipeline<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
            on_step: None,
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_step<F: FnMut(StepProgress) + 'a>(mut self, callback: F) -> Self {
        self.on_step = Some(Box::new(callback));
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Build a point cloud from `source` into `cloud`.
    pub fn run_bathymetry<W: SwathSource>(
        &mut self,
        source: &mut W,
        cloud: &mut PointCloud,
    ) -> Result<RunStatus> {
        self.run::<W, MemorySidescanSource>(Some(BathymetryJob { source, cloud }), None)
    }

    /// Write sidescan tiles from `source` into `output_dir`.
    pub fn run_tiles<S: SidescanSource>(
        &mut self,
        source: &mut S,
        output_dir: &Path,
    ) -> Result<RunStatus> {
        self.run::<MemorySwathSource, S>(None, Some(TileJob { source, output_dir }))
    }

    /// Drive both paths over the union of their time spans.
    ///
    /// Output preconditions (classification file, output directory, metadata
    /// header) are checked before the first step.
    pub fn run<W: SwathSource, S: SidescanSource>(
        &mut self,
        bathymetry: Option<BathymetryJob<'_, W>>,
        tiles: Option<TileJob<'_, S>>,
    ) -> Result<RunStatus> {
        let mut tide = TideCorrector::from_path(self.config.tides.file.as_deref());
        let mut summary = RunSummary::default();

        let mut tile_path = tiles.map(|job| TilePath::open(job, self.config)).transpose()?;
        let mut swath_path = bathymetry.map(|job| SwathPath::new(job, self.config));

        let spans = [
            swath_path.as_ref().and_then(|p| p.span()),
            tile_path.as_ref().and_then(|p| p.span()),
        ];
        let span = spans
            .into_iter()
            .flatten()
            .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)));

        let mut cancelled = false;
        if let Some((start, end)) = span {
            let total_steps = ((end - start) / STEP_MS + 1) as usize;
            info!(
                "Processing {} steps from {} to {}",
                total_steps, start, end
            );

            let mut t = start;
            while t <= end {
                if self.cancel.is_cancelled() {
                    warn!("Run cancelled at {} after {} steps", t, summary.steps);
                    cancelled = true;
                    break;
                }
                let step_end = t + STEP_MS;

                if let Some(path) = swath_path.as_mut() {
                    path.advance(step_end, &mut tide);
                }
                if let Some(path) = tile_path.as_mut() {
                    path.advance(t, step_end, &mut tide, &mut summary);
                }

                summary.steps += 1;
                if let Some(callback) = self.on_step.as_mut() {
                    callback(StepProgress {
                        step: summary.steps,
                        total_steps,
                        time_ms: t,
                    });
                }
                t = step_end;
            }
        } else {
            warn!("No records to process");
        }

        if let Some(path) = swath_path {
            let stats = path.finish();
            summary.swaths = stats.swaths;
            summary.points = stats.points;
            summary.null_beams = stats.null_beams;
        }
        if let Some(path) = tile_path {
            path.finish()?;
        }
        summary.tide_misses = tide.misses();

        info!(
            "Run {}: {} steps, {} points, {} tiles written",
            if cancelled { "cancelled" } else { "completed" },
            summary.steps,
            summary.points,
            summary.tiles_written
        );

        Ok(if cancelled {
            RunStatus::Cancelled(summary)
        } else {
            RunStatus::Completed(summary)
        })
    }
}

/// Swaths flow into the cloud as the loop passes their timestamps.
struct SwathPath<'a, W> {
    source: &'a mut W,
    cloud: &'a mut PointCloud,
    builder: PointCloudBuilder,
    pending: Option<SwathRecord>,
}

impl<'a, W: SwathSource> SwathPath<'a, W> {
    fn new(job: BathymetryJob<'a, W>, config: &PipelineConfig) -> Self {
        let BathymetryJob { source, cloud } = job;
        source.rewind();
        let pending = source.next_swath();
        let mut builder = PointCloudBuilder::from_config(&config.bathymetry);
        builder.begin();
        Self {
            source,
            cloud,
            builder,
            pending,
        }
    }

    fn span(&self) -> Option<(i64, i64)> {
        Some((self.source.first_timestamp()?, self.source.last_timestamp()?))
    }

    /// Consume every swath stamped before `end`.
    fn advance(&mut self, end: i64, tide: &mut TideCorrector) {
        while self.pending.as_ref().is_some_and(|s| s.timestamp_ms < end) {
            if let Some(swath) = self.pending.take() {
                self.builder.add_swath(&swath, tide, self.cloud);
            }
            self.pending = self.source.next_swath();
        }
    }

    fn finish(self) -> super::bathymetry::BathymetryStats {
        self.builder.finish(self.cloud)
    }
}

/// Sidescan lines of one subsystem flow through the accumulator into tiles.
struct TilePath<'a, S> {
    source: &'a mut S,
    subsystem: u32,
    params: SidescanParameters,
    accumulator: TileAccumulator,
    classifier: RegionClassifier,
    writer: TileWriter,
    cell_size: u32,
    separate_cells: bool,
    row_mosaics: bool,
    row: u32,
}

impl<'a, S: SidescanSource> TilePath<'a, S> {
    fn open(job: TileJob<'a, S>, config: &PipelineConfig) -> Result<Self> {
        let ss = &config.sidescan;
        let subsystems = job.source.subsystems();
        if subsystems.is_empty() {
            return Err(PipelineError::NoSubsystems);
        }
        let subsystem = *subsystems
            .get(ss.frequency_index)
            .ok_or(PipelineError::FrequencyIndex {
                index: ss.frequency_index,
                available: subsystems.len(),
            })?;
        info!("Tiling sidescan subsystem {}", subsystem);

        let classifier = RegionClassifier::from_config(&config.classification)?;
        let writer = TileWriter::create(job.output_dir, classifier.is_enabled())?;

        Ok(Self {
            source: job.source,
            subsystem,
            params: SidescanParameters::new(ss.normalization, ss.time_variable_gain),
            accumulator: TileAccumulator::from_config(ss),
            classifier,
            writer,
            cell_size: ss.cell_size as u32,
            separate_cells: ss.separate_cells,
            row_mosaics: ss.row_mosaics,
            row: 0,
        })
    }

    fn span(&self) -> Option<(i64, i64)> {
        Some((self.source.first_timestamp()?, self.source.last_timestamp()?))
    }

    fn advance(&mut self, start: i64, end: i64, tide: &mut TideCorrector, summary: &mut RunSummary) {
        let lines = self
            .source
            .lines_between(start, end, self.subsystem, &self.params);
        self.accumulator.push_lines(lines);

        match self.accumulator.flush(self.row + 1) {
            FlushOutcome::Pending => {}
            FlushOutcome::Discarded { .. } => {
                summary.flushes += 1;
                summary.discarded_slow += 1;
            }
            FlushOutcome::Ready(cell) => {
                summary.flushes += 1;
                summary.rows += 1;
                self.row = cell.row;
                self.write_cell(&cell, tide, summary);
            }
        }
    }

    fn write_cell(&mut self, cell: &Cell, tide: &mut TideCorrector, summary: &mut RunSummary) {
        let depth = cell.avg_depth - tide.tide_level(cell.time_ms());
        let sub_cells = cell.sub_cells(self.cell_size);

        for sub in &sub_cells {
            let label = match self.classifier.classify(&sub.location) {
                Verdict::Accept(label) => label,
                Verdict::Drop => {
                    summary.tiles_dropped += 1;
                    continue;
                }
            };

            let record = TileRecord {
                row: cell.row,
                column: sub.column,
                time_ms: cell.time_ms(),
                frequency: cell.frequency(),
                range: cell.range(),
                location: sub.location,
                depth,
                distance: sub.distance,
                speed: cell.avg_speed,
                label,
            };
            let image = self
                .separate_cells
                .then(|| cell.tile_image(sub, self.cell_size));

            match self.writer.commit_tile(&record, image.as_ref()) {
                Ok(()) => summary.tiles_written += 1,
                Err(e) => {
                    error!("Skipping tile {}: {}", record.name(), e);
                    summary.write_failures += 1;
                }
            }
        }

        if self.row_mosaics {
            if let Err(e) = self
                .writer
                .write_row_mosaic(cell.row, &cell.row_mosaic(&sub_cells))
            {
                error!("Skipping row mosaic {}: {}", cell.row, e);
                summary.write_failures += 1;
            }
        }
    }

    fn finish(self) -> Result<()> {
        self.writer.finish()?;
        Ok(())
    }
}
