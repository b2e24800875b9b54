//! Record sources feeding the pipeline.
//!
//! Log demultiplexing happens upstream; the pipeline only needs an ordered,
//! rewindable stream of swaths and a sidescan store that can be queried by
//! time window and subsystem.

use super::records::{SidescanLine, SwathRecord};
use super::transforms::apply_normalization_and_tvg;

/// Intensity processing requested from a sidescan source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SidescanParameters {
    pub normalization: f64,
    pub tvg_gain: f64,
}

impl SidescanParameters {
    pub fn new(normalization: f64, tvg_gain: f64) -> Self {
        Self {
            normalization,
            tvg_gain,
        }
    }
}

/// Ordered, rewindable sequence of multibeam swaths.
pub trait SwathSource {
    /// Reset to the first swath.
    fn rewind(&mut self);

    /// Next swath in time order, or `None` when exhausted.
    fn next_swath(&mut self) -> Option<SwathRecord>;

    fn first_timestamp(&self) -> Option<i64>;

    fn last_timestamp(&self) -> Option<i64>;
}

/// Time-indexed store of sidescan lines.
pub trait SidescanSource {
    fn first_timestamp(&self) -> Option<i64>;

    fn last_timestamp(&self) -> Option<i64>;

    /// Subsystem ids present in the recording, in ascending order.
    fn subsystems(&self) -> Vec<u32>;

    /// Lines of `subsystem` with `start <= timestamp < end`, in time order,
    /// processed with `params`.
    fn lines_between(
        &mut self,
        start: i64,
        end: i64,
        subsystem: u32,
        params: &SidescanParameters,
    ) -> Vec<SidescanLine>;
}

/// Swath source backed by a vector.
#[derive(Debug, Clone, Default)]
pub struct MemorySwathSource {
    swaths: Vec<SwathRecord>,
    cursor: usize,
}

impl MemorySwathSource {
    /// Swaths are sorted by timestamp; equal timestamps keep their order.
    pub fn new(mut swaths: Vec<SwathRecord>) -> Self {
        swaths.sort_by_key(|s| s.timestamp_ms);
        Self { swaths, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.swaths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swaths.is_empty()
    }
}

impl SwathSource for MemorySwathSource {
    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn next_swath(&mut self) -> Option<SwathRecord> {
        let swath = self.swaths.get(self.cursor).cloned();
        if swath.is_some() {
            self.cursor += 1;
        }
        swath
    }

    fn first_timestamp(&self) -> Option<i64> {
        self.swaths.first().map(|s| s.timestamp_ms)
    }

    fn last_timestamp(&self) -> Option<i64> {
        self.swaths.last().map(|s| s.timestamp_ms)
    }
}

/// Sidescan source backed by a time-sorted vector of raw lines.
#[derive(Debug, Clone, Default)]
pub struct MemorySidescanSource {
    lines: Vec<SidescanLine>,
}

impl MemorySidescanSource {
    pub fn new(mut lines: Vec<SidescanLine>) -> Self {
        lines.sort_by_key(|l| l.timestamp_ms);
        Self { lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl SidescanSource for MemorySidescanSource {
    fn first_timestamp(&self) -> Option<i64> {
        self.lines.first().map(|l| l.timestamp_ms)
    }

    fn last_timestamp(&self) -> Option<i64> {
        self.lines.last().map(|l| l.timestamp_ms)
    }

    fn subsystems(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.lines.iter().map(|l| l.subsystem).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn lines_between(
        &mut self,
        start: i64,
        end: i64,
        subsystem: u32,
        params: &SidescanParameters,
    ) -> Vec<SidescanLine> {
        let lo = self.lines.partition_point(|l| l.timestamp_ms < start);
        let hi = self.lines.partition_point(|l| l.timestamp_ms < end);
        if lo >= hi {
            return Vec::new();
        }

        self.lines[lo..hi]
            .iter()
            .filter(|l| l.subsystem == subsystem)
            .map(|l| {
                let mut line = l.clone();
                apply_normalization_and_tvg(&mut line.data, params.normalization, params.tvg_gain);
                line
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::GeoPoint;
    use crate::core::records::{Pose, VehicleState};

    fn swath(ts: i64) -> SwathRecord {
        SwathRecord {
            timestamp_ms: ts,
            pose: Pose::default(),
            beams: vec![None],
        }
    }

    fn line(ts: i64, subsystem: u32) -> SidescanLine {
        SidescanLine {
            timestamp_ms: ts,
            state: VehicleState::default(),
            range: 30.0,
            frequency: 450_000.0,
            subsystem,
            position: GeoPoint::default(),
            heading: 0.0,
            data: vec![1.0; 4],
        }
    }

    #[test]
    fn test_swath_source_rewind() {
        let mut source = MemorySwathSource::new(vec![swath(200), swath(100)]);
        assert_eq!(source.next_swath().map(|s| s.timestamp_ms), Some(100));
        assert_eq!(source.next_swath().map(|s| s.timestamp_ms), Some(200));
        assert!(source.next_swath().is_none());

        source.rewind();
        assert_eq!(source.next_swath().map(|s| s.timestamp_ms), Some(100));
    }

    #[test]
    fn test_lines_between_half_open_window() {
        let mut source = MemorySidescanSource::new(vec![
            line(0, 0),
            line(500, 0),
            line(999, 1),
            line(1000, 0),
        ]);
        let params = SidescanParameters::new(0.2, 250.0);

        let lines = source.lines_between(0, 1000, 0, &params);
        let times: Vec<i64> = lines.iter().map(|l| l.timestamp_ms).collect();
        assert_eq!(times, vec![0, 500]);

        assert_eq!(source.subsystems(), vec![0, 1]);
        assert_eq!(source.first_timestamp(), Some(0));
        assert_eq!(source.last_timestamp(), Some(1000));
    }
}
