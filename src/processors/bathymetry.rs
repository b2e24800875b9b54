//! Multibeam swaths to a tide-corrected bathymetry point cloud.
//!
//! Each kept, non-null beam becomes one point `(north, east, depth - tide)`
//! in the cloud's local frame. The frame origin is taken from the cloud when
//! it already has one, otherwise from the first swath processed, so every
//! point of a run shares it.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{BathymetryConfig, DecimationMode};
use crate::core::loaders::PointCloud;
use crate::core::records::SwathRecord;
use crate::core::source::SwathSource;

use super::tide::TideCorrector;

/// Beam decimation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decimation {
    /// Keep beam indices 0, N, 2N, ...
    Stride(usize),
    /// Keep each beam independently with probability 1/N.
    Probabilistic(usize),
}

impl Decimation {
    pub fn from_config(config: &BathymetryConfig) -> Self {
        let factor = config.factor.max(1);
        match config.decimation {
            DecimationMode::Stride => Decimation::Stride(factor),
            DecimationMode::Probabilistic => Decimation::Probabilistic(factor),
        }
    }
}

/// Counters for one bathymetry run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BathymetryStats {
    pub swaths: usize,
    pub points: usize,
    /// Kept beam slots that held no sample
    pub null_beams: usize,
}

/// Appends decimated, tide-corrected beams to a caller-owned point cloud.
pub struct PointCloudBuilder<R: Rng = StdRng> {
    decimation: Decimation,
    rng: R,
    stats: BathymetryStats,
}

impl PointCloudBuilder<StdRng> {
    /// Builder seeded from `config.seed`, or from entropy when unset.
    pub fn from_config(config: &BathymetryConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(Decimation::from_config(config), rng)
    }
}

impl<R: Rng> PointCloudBuilder<R> {
    pub fn with_rng(decimation: Decimation, rng: R) -> Self {
        Self {
            decimation,
            rng,
            stats: BathymetryStats::default(),
        }
    }

    pub fn stats(&self) -> BathymetryStats {
        self.stats
    }

    /// Reset the run counters.
    pub fn begin(&mut self) {
        self.stats = BathymetryStats::default();
    }

    /// Append the kept beams of one swath; returns the number of points added.
    pub fn add_swath(
        &mut self,
        swath: &SwathRecord,
        tide: &mut TideCorrector,
        cloud: &mut PointCloud,
    ) -> usize {
        let origin = *cloud
            .metadata
            .origin
            .get_or_insert(swath.pose.position);
        let (pose_north, pose_east) = swath.pose.position.offset_from(&origin);
        let tide_offset = tide.tide_level(swath.timestamp_ms);

        let before = cloud.len();
        let n = swath.num_beams();

        let kept: Vec<usize> = match self.decimation {
            Decimation::Stride(step) => (0..n).step_by(step.max(1)).collect(),
            Decimation::Probabilistic(factor) => {
                let p = 1.0 / factor.max(1) as f64;
                (0..n).filter(|_| self.rng.gen_bool(p)).collect()
            }
        };

        for c in kept {
            let Some(beam) = swath.beams[c] else {
                self.stats.null_beams += 1;
                continue;
            };
            let north = pose_north + beam.north as f64;
            let east = pose_east + beam.east as f64;
            let depth = beam.depth as f64 - tide_offset;
            cloud.push(north as f32, east as f32, depth as f32);
        }

        let added = cloud.len() - before;
        self.stats.swaths += 1;
        self.stats.points += added;
        added
    }

    /// Record the run's point count in the cloud metadata.
    pub fn finish(&self, cloud: &mut PointCloud) -> BathymetryStats {
        cloud.metadata.total_points = self.stats.points;
        info!(
            "Bathymetry: {} points from {} swaths ({} null beams skipped)",
            self.stats.points, self.stats.swaths, self.stats.null_beams
        );
        self.stats
    }

    /// Rewind `source` and process every swath it yields.
    pub fn build<S: SwathSource>(
        &mut self,
        source: &mut S,
        tide: &mut TideCorrector,
        cloud: &mut PointCloud,
    ) -> BathymetryStats {
        source.rewind();
        self.begin();
        while let Some(swath) = source.next_swath() {
            let added = self.add_swath(&swath, tide, cloud);
            debug!("swath {}: {} points", swath.timestamp_ms, added);
        }
        self.finish(cloud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::GeoPoint;
    use crate::core::records::{BeamSample, Pose};
    use crate::core::source::MemorySwathSource;
    use crate::processors::tide::TideTable;

    fn swath(ts: i64, beams: usize, position: GeoPoint) -> SwathRecord {
        SwathRecord {
            timestamp_ms: ts,
            pose: Pose {
                position,
                ..Pose::default()
            },
            beams: (0..beams)
                .map(|i| {
                    Some(BeamSample {
                        north: 0.5,
                        east: i as f32 - 5.0,
                        depth: 20.0 + i as f32 * 0.1,
                    })
                })
                .collect(),
        }
    }

    fn stride_builder(n: usize) -> PointCloudBuilder<StdRng> {
        PointCloudBuilder::with_rng(Decimation::Stride(n), StdRng::seed_from_u64(0))
    }

    #[test]
    fn test_stride_keeps_ceil_of_beams() {
        let origin = GeoPoint::new(41.0, -8.0);
        for (beams, n, expected) in [(10, 2, 5), (10, 3, 4), (7, 7, 1), (5, 1, 5), (3, 8, 1)] {
            let mut cloud = PointCloud::new();
            let mut tide = TideCorrector::without_table();
            let added = stride_builder(n).add_swath(&swath(0, beams, origin), &mut tide, &mut cloud);
            assert_eq!(added, expected, "beams={} n={}", beams, n);
        }
    }

    #[test]
    fn test_null_beams_are_skipped() {
        let origin = GeoPoint::new(41.0, -8.0);
        let mut s = swath(0, 6, origin);
        s.beams[0] = None;
        s.beams[3] = None;

        let mut cloud = PointCloud::new();
        let mut tide = TideCorrector::without_table();
        let mut builder = stride_builder(1);
        assert_eq!(builder.add_swath(&s, &mut tide, &mut cloud), 4);
        assert_eq!(builder.stats().null_beams, 2);
    }

    #[test]
    fn test_points_are_offset_from_shared_origin() {
        let origin = GeoPoint::new(41.0, -8.0);
        let second = origin.translated(10.0, 0.0);
        let mut source = MemorySwathSource::new(vec![swath(0, 1, origin), swath(100, 1, second)]);

        let mut cloud = PointCloud::new();
        let mut tide = TideCorrector::without_table();
        let stats = stride_builder(1).build(&mut source, &mut tide, &mut cloud);

        assert_eq!(stats.points, 2);
        assert_eq!(cloud.metadata.origin, Some(origin));
        assert_eq!(cloud.metadata.total_points, 2);
        assert_eq!(cloud.x[0], 0.5);
        assert_eq!(cloud.y[0], -5.0);
        assert!((cloud.x[1] - 10.5).abs() < 1e-4);
    }

    #[test]
    fn test_tide_is_subtracted_once_per_swath() {
        // 2020-03-19T00:00:00Z
        let t0 = 1_584_576_000_000;
        let table = TideTable::from_samples([(t0, 1.5)]);
        let mut tide = TideCorrector::new(table);

        let mut cloud = PointCloud::new();
        stride_builder(1).add_swath(&swath(t0, 2, GeoPoint::default()), &mut tide, &mut cloud);
        assert_eq!(cloud.z[0], 18.5);
        assert!((cloud.z[1] - 18.6).abs() < 1e-5);
        assert_eq!(tide.misses(), 0);
    }

    #[test]
    fn test_probabilistic_is_reproducible_with_seed() {
        let origin = GeoPoint::new(41.0, -8.0);
        let run = |seed: u64| {
            let mut builder =
                PointCloudBuilder::with_rng(Decimation::Probabilistic(4), StdRng::seed_from_u64(seed));
            let mut cloud = PointCloud::new();
            let mut tide = TideCorrector::without_table();
            for i in 0..50 {
                builder.add_swath(&swath(i * 100, 40, origin), &mut tide, &mut cloud);
            }
            cloud.to_coords()
        };

        let a = run(42);
        let b = run(42);
        assert_eq!(a, b);
        // 2000 beams at p = 1/4
        assert!(a.len() > 350 && a.len() < 650, "kept {}", a.len());
    }

    #[test]
    fn test_probabilistic_factor_one_keeps_everything() {
        let mut builder =
            PointCloudBuilder::with_rng(Decimation::Probabilistic(1), StdRng::seed_from_u64(9));
        let mut cloud = PointCloud::new();
        let mut tide = TideCorrector::without_table();
        let added = builder.add_swath(&swath(0, 12, GeoPoint::default()), &mut tide, &mut cloud);
        assert_eq!(added, 12);
    }

    #[test]
    fn test_existing_origin_is_reused() {
        let origin = GeoPoint::new(41.0, -8.0);
        let mut cloud = PointCloud::new();
        cloud.metadata.origin = Some(origin.translated(-100.0, 0.0));

        let mut tide = TideCorrector::without_table();
        stride_builder(1).add_swath(&swath(0, 1, origin), &mut tide, &mut cloud);
        assert!((cloud.x[0] - 100.5).abs() < 1e-3);
    }
}
