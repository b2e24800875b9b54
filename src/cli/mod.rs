//! Command-line interface for the survey pipeline.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};

use crate::config::DecimationMode;
use crate::core::loaders::{self, PointCloud};
use crate::core::transforms::ColorMap;
use crate::core::writers;
use crate::processors::survey::{
    BathymetryJob, CancelToken, RunStatus, StepProgress, SurveyPipeline, TileJob,
};
use crate::visualization::{self, PreviewOptions};
use crate::PipelineConfig;

/// Survey-relative default locations.
const SWATHS_FILE: &str = "swaths.csv";
const SIDESCAN_FILE: &str = "sidescan.csv";
const TILES_DIR: &str = "mra/sss_tiles";
const CLOUD_FILE: &str = "mra/bathymetry.ply";

#[derive(Parser)]
#[command(name = "sonar-survey")]
#[command(about = "Sonar survey processing: bathymetry point clouds and sidescan tiles", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DecimationArg {
    Stride,
    Probabilistic,
}

impl From<DecimationArg> for DecimationMode {
    fn from(arg: DecimationArg) -> Self {
        match arg {
            DecimationArg::Stride => DecimationMode::Stride,
            DecimationArg::Probabilistic => DecimationMode::Probabilistic,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorMapArg {
    Grayscale,
    Bronze,
    Jet,
}

impl From<ColorMapArg> for ColorMap {
    fn from(arg: ColorMapArg) -> Self {
        match arg {
            ColorMapArg::Grayscale => ColorMap::Grayscale,
            ColorMapArg::Bronze => ColorMap::Bronze,
            ColorMapArg::Jet => ColorMap::Jet,
        }
    }
}

/// Bathymetry overrides shared by `bathymetry` and `run`.
#[derive(clap::Args)]
struct BathymetryArgs {
    /// Beam decimation mode
    #[arg(long, value_enum)]
    decimation: Option<DecimationArg>,
    /// Decimation factor N (stride N, or probability 1/N)
    #[arg(long)]
    factor: Option<usize>,
    /// Seed for probabilistic decimation
    #[arg(long)]
    seed: Option<u64>,
}

/// Sidescan overrides shared by `tiles` and `run`.
#[derive(clap::Args)]
struct TileArgs {
    /// Cell height and tile edge in pixels
    #[arg(long)]
    cell_size: Option<usize>,
    /// Index into the recorded sidescan subsystems
    #[arg(long)]
    frequency_index: Option<usize>,
    /// Color map for intensity rendering
    #[arg(long, value_enum)]
    color_map: Option<ColorMapArg>,
    /// Disable slant-range correction
    #[arg(long)]
    no_slant_correction: bool,
    /// Skip per-tile PNGs (metadata rows are still written)
    #[arg(long)]
    no_cells: bool,
    /// GeoJSON sand/rock boundaries; tiles outside both are dropped
    #[arg(long)]
    classification: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a tide-corrected point cloud from multibeam swaths
    Bathymetry {
        /// Swath CSV file
        swaths: PathBuf,
        /// Output PLY file
        #[arg(short, long, default_value = "bathymetry.ply")]
        output: PathBuf,
        /// Also write an x,y,z CSV
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Tide table file
        #[arg(long)]
        tides: Option<PathBuf>,
        #[command(flatten)]
        args: BathymetryArgs,
    },

    /// Export sidescan tiles with geolocation metadata
    Tiles {
        /// Sidescan CSV file
        sidescan: PathBuf,
        /// Output directory for tiles and cells.csv
        #[arg(short, long, default_value = "sss_tiles")]
        output_dir: PathBuf,
        /// Tide table file
        #[arg(long)]
        tides: Option<PathBuf>,
        #[command(flatten)]
        args: TileArgs,
    },

    /// Process a survey directory (swaths.csv and sidescan.csv) in one pass
    Run {
        /// Survey directory
        survey: PathBuf,
        /// Tide table file
        #[arg(long)]
        tides: Option<PathBuf>,
        #[command(flatten)]
        bathymetry: BathymetryArgs,
        #[command(flatten)]
        tiles: TileArgs,
    },

    /// Render a depth-colored top-down PNG of a PLY point cloud
    Preview {
        /// Input PLY file
        ply_file: PathBuf,
        /// Output PNG file path (defaults to same name as PLY with .png extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Maximum number of points to plot (subsamples if exceeded)
        #[arg(long, default_value_t = 1_000_000)]
        max_points: usize,
        /// Image width in pixels
        #[arg(long, default_value_t = 1920)]
        width: u32,
        /// Image height in pixels
        #[arg(long, default_value_t = 1080)]
        height: u32,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Output YAML file
        #[arg(default_value = "sonar-survey.yaml")]
        output: PathBuf,
    },
}

impl BathymetryArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(mode) = self.decimation {
            config.bathymetry.decimation = mode.into();
        }
        if let Some(factor) = self.factor {
            config.bathymetry.factor = factor;
        }
        if self.seed.is_some() {
            config.bathymetry.seed = self.seed;
        }
    }
}

impl TileArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        let ss = &mut config.sidescan;
        if let Some(size) = self.cell_size {
            ss.cell_size = size;
        }
        if let Some(index) = self.frequency_index {
            ss.frequency_index = index;
        }
        if let Some(cmap) = self.color_map {
            ss.color_map = cmap.into();
        }
        if self.no_slant_correction {
            ss.slant_range_correction = false;
        }
        if self.no_cells {
            ss.separate_cells = false;
        }
        if self.classification.is_some() {
            config.classification.file = self.classification.clone();
        }
    }
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Create a bar tracking one-second survey steps
fn create_step_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}s {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 37 {
            let head: String = value.chars().take(34).collect();
            format!("{}...", head)
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<37} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command {
        Commands::Bathymetry { swaths, output, csv, tides, args } => {
            let mut config = config;
            args.apply(&mut config);
            override_tides(&mut config, tides);
            cmd_bathymetry(&swaths, &output, csv.as_deref(), &config)
        }
        Commands::Tiles { sidescan, output_dir, tides, args } => {
            let mut config = config;
            args.apply(&mut config);
            override_tides(&mut config, tides);
            cmd_tiles(&sidescan, &output_dir, &config)
        }
        Commands::Run { survey, tides, bathymetry, tiles } => {
            let mut config = config;
            bathymetry.apply(&mut config);
            tiles.apply(&mut config);
            override_tides(&mut config, tides);
            cmd_run(&survey, &config)
        }
        Commands::Preview { ply_file, output, max_points, width, height } => {
            cmd_preview(&ply_file, output, max_points, width, height)
        }
        Commands::InitConfig { output } => cmd_init_config(&output, &config),
    };

    match result {
        Ok(Outcome::Completed) => {}
        Ok(Outcome::Cancelled) => std::process::exit(130),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// How a command ended when it did not fail.
enum Outcome {
    Completed,
    Cancelled,
}

fn override_tides(config: &mut PipelineConfig, tides: Option<PathBuf>) {
    if tides.is_some() {
        config.tides.file = tides;
    }
}

/// Validate merged settings and install the Ctrl-C handler.
fn prepare(config: &PipelineConfig) -> anyhow::Result<CancelToken> {
    config.validate().context("invalid settings")?;
    let cancel = CancelToken::new();
    if let Err(e) = cancel.cancel_on_ctrl_c() {
        warn!("Ctrl-C handler unavailable: {}", e);
    }
    Ok(cancel)
}

/// Run `pipeline` with a step bar attached.
fn with_step_bar<T>(
    config: &PipelineConfig,
    cancel: CancelToken,
    body: impl FnOnce(&mut SurveyPipeline<'_>) -> T,
) -> T {
    let bar = create_step_bar();
    let result = {
        let mut pipeline = SurveyPipeline::new(config)
            .with_cancel_token(cancel)
            .on_step(|p: StepProgress| {
                bar.set_length(p.total_steps as u64);
                bar.set_position(p.step as u64);
            });
        body(&mut pipeline)
    };
    bar.finish_and_clear();
    result
}

fn status_items(status: &RunStatus) -> Vec<(&'static str, String)> {
    let s = status.summary();
    vec![
        (
            "Status",
            if status.is_cancelled() { "cancelled" } else { "completed" }.to_string(),
        ),
        ("Steps", s.steps.to_string()),
        ("Tide misses", s.tide_misses.to_string()),
    ]
}

fn outcome(status: &RunStatus) -> Outcome {
    if status.is_cancelled() {
        Outcome::Cancelled
    } else {
        Outcome::Completed
    }
}

fn write_cloud(cloud: &PointCloud, ply: &Path, csv: Option<&Path>) -> anyhow::Result<()> {
    writers::write_ply(ply, cloud).with_context(|| format!("writing {}", ply.display()))?;
    if let Some(csv) = csv {
        writers::write_cartesian_csv(csv, cloud)
            .with_context(|| format!("writing {}", csv.display()))?;
    }
    Ok(())
}

fn cmd_bathymetry(
    swaths: &Path,
    output: &Path,
    csv: Option<&Path>,
    config: &PipelineConfig,
) -> anyhow::Result<Outcome> {
    let start = Instant::now();
    let cancel = prepare(config)?;

    println!("Building bathymetry point cloud...");
    println!("Input: {}", swaths.display());
    println!("Output: {}", output.display());

    let spinner = create_spinner("Loading swaths...");
    let loaded = loaders::load_swaths_csv(swaths);
    spinner.finish_and_clear();
    let mut source = loaded.with_context(|| format!("loading {}", swaths.display()))?;

    let mut cloud = PointCloud::new();
    let status = with_step_bar(config, cancel, |p| p.run_bathymetry(&mut source, &mut cloud))?;
    write_cloud(&cloud, output, csv)?;

    let mut items = status_items(&status);
    items.extend([
        ("Input file", swaths.display().to_string()),
        ("Output PLY", output.display().to_string()),
        ("Swaths", status.summary().swaths.to_string()),
        ("Points", status.summary().points.to_string()),
        ("Null beams", status.summary().null_beams.to_string()),
        ("Duration", format!("{:.2?}", start.elapsed())),
    ]);
    print_summary("Bathymetry Complete", &items);
    Ok(outcome(&status))
}

fn cmd_tiles(sidescan: &Path, output_dir: &Path, config: &PipelineConfig) -> anyhow::Result<Outcome> {
    let start = Instant::now();
    let cancel = prepare(config)?;

    println!("Exporting sidescan tiles...");
    println!("Input: {}", sidescan.display());
    println!("Output directory: {}", output_dir.display());

    let spinner = create_spinner("Loading sidescan lines...");
    let loaded = loaders::load_sidescan_csv(sidescan);
    spinner.finish_and_clear();
    let mut source = loaded.with_context(|| format!("loading {}", sidescan.display()))?;

    let status = with_step_bar(config, cancel, |p| p.run_tiles(&mut source, output_dir))?;

    let mut items = status_items(&status);
    items.extend(tile_items(&status));
    items.push(("Duration", format!("{:.2?}", start.elapsed())));
    print_summary("Tile Export Complete", &items);
    Ok(outcome(&status))
}

fn tile_items(status: &RunStatus) -> Vec<(&'static str, String)> {
    let s = status.summary();
    vec![
        ("Rows", s.rows.to_string()),
        ("Slow cells skipped", s.discarded_slow.to_string()),
        ("Tiles written", s.tiles_written.to_string()),
        ("Tiles unclassified", s.tiles_dropped.to_string()),
        ("Write failures", s.write_failures.to_string()),
    ]
}

fn cmd_run(survey: &Path, config: &PipelineConfig) -> anyhow::Result<Outcome> {
    let start = Instant::now();
    let cancel = prepare(config)?;

    let swaths_path = survey.join(SWATHS_FILE);
    let sidescan_path = survey.join(SIDESCAN_FILE);
    if !swaths_path.exists() && !sidescan_path.exists() {
        bail!(
            "{} contains neither {} nor {}",
            survey.display(),
            SWATHS_FILE,
            SIDESCAN_FILE
        );
    }
    let tiles_dir = survey.join(TILES_DIR);
    let cloud_path = survey.join(CLOUD_FILE);

    println!("Processing survey {}...", survey.display());

    let spinner = create_spinner("Loading survey data...");
    let swaths = swaths_path
        .exists()
        .then(|| loaders::load_swaths_csv(&swaths_path))
        .transpose();
    let sidescan = sidescan_path
        .exists()
        .then(|| loaders::load_sidescan_csv(&sidescan_path))
        .transpose();
    spinner.finish_and_clear();

    let mut swaths = swaths.with_context(|| format!("loading {}", swaths_path.display()))?;
    let mut sidescan = sidescan.with_context(|| format!("loading {}", sidescan_path.display()))?;
    if swaths.is_none() {
        warn!("No {} in survey, skipping bathymetry", SWATHS_FILE);
    }
    if sidescan.is_none() {
        warn!("No {} in survey, skipping tiles", SIDESCAN_FILE);
    }

    let mut cloud = PointCloud::new();
    let status = with_step_bar(config, cancel, |p| {
        p.run(
            swaths.as_mut().map(|source| BathymetryJob {
                source,
                cloud: &mut cloud,
            }),
            sidescan.as_mut().map(|source| TileJob {
                source,
                output_dir: &tiles_dir,
            }),
        )
    })?;

    if swaths.is_some() {
        write_cloud(&cloud, &cloud_path, None)?;
    }

    let mut items = status_items(&status);
    items.extend([
        ("Survey", survey.display().to_string()),
        ("Points", status.summary().points.to_string()),
    ]);
    if swaths.is_some() {
        items.push(("Output PLY", cloud_path.display().to_string()));
    }
    if sidescan.is_some() {
        items.push(("Tiles directory", tiles_dir.display().to_string()));
        items.extend(tile_items(&status));
    }
    items.push(("Duration", format!("{:.2?}", start.elapsed())));
    print_summary("Survey Processing Complete", &items);
    Ok(outcome(&status))
}

fn cmd_preview(
    ply_file: &Path,
    output: Option<PathBuf>,
    max_points: usize,
    width: u32,
    height: u32,
) -> anyhow::Result<Outcome> {
    let start = Instant::now();

    let output_path = output.unwrap_or_else(|| ply_file.with_extension("png"));

    println!("Rendering bathymetry preview...");
    println!("Input: {}", ply_file.display());
    println!("Output: {}", output_path.display());

    let spinner = create_spinner("Loading PLY file...");
    let cloud = match loaders::load_ply(ply_file) {
        Ok(c) => c,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e).with_context(|| format!("loading {}", ply_file.display()));
        }
    };

    spinner.set_message("Generating plot...");
    let options = PreviewOptions {
        width,
        height,
        max_points,
        ..PreviewOptions::default()
    };
    let plotted = visualization::plot_bathymetry(&output_path, &cloud, &options);
    spinner.finish_and_clear();
    plotted.context("rendering preview")?;

    print_summary(
        "Preview Complete",
        &[
            ("Input file", ply_file.display().to_string()),
            ("Output PNG", output_path.display().to_string()),
            ("Points in cloud", cloud.len().to_string()),
            ("Max points plotted", max_points.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(Outcome::Completed)
}

fn cmd_init_config(output: &Path, config: &PipelineConfig) -> anyhow::Result<Outcome> {
    config
        .to_yaml(output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("Wrote configuration to {}", output.display());
    Ok(Outcome::Completed)
}
