//! Tide table lookups for depth correction.
//!
//! A tide table is a list of timestamped water levels relative to a fixed
//! vertical datum. Lookups never fail: a timestamp whose calendar day has no
//! sample yields 0.0 and a warning, so a missing table only costs accuracy.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use regex::Regex;
use thiserror::Error;

/// Errors that can occur while loading a tide table.
#[derive(Debug, Error)]
pub enum TideError {
    #[error("failed to read tide table {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid tide line pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("tide table {0} has no samples")]
    Empty(PathBuf),
}

pub type Result<T> = std::result::Result<T, TideError>;

/// Timestamped water levels, keyed by UTC milliseconds.
#[derive(Debug, Clone, Default)]
pub struct TideTable {
    levels: BTreeMap<i64, f64>,
    dates: BTreeSet<NaiveDate>,
}

fn utc_date(timestamp_ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(timestamp_ms).map(|dt| dt.date_naive())
}

impl TideTable {
    pub fn from_samples<I: IntoIterator<Item = (i64, f64)>>(samples: I) -> Self {
        let mut table = Self::default();
        for (ts, level) in samples {
            if let Some(date) = utc_date(ts) {
                table.levels.insert(ts, level);
                table.dates.insert(date);
            }
        }
        table
    }

    /// Parse tide table text.
    ///
    /// Each line is either `YYYY-MM-DD HH:MM[:SS] <level>` (UTC) or
    /// `<unix seconds> <level>`. Blank lines and `#` comments are ignored;
    /// other unparsable lines are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let calendar =
            Regex::new(r"^(\d{4}-\d{2}-\d{2})[ T](\d{2}:\d{2}(?::\d{2})?)\s+([-+]?\d+(?:\.\d+)?)$")?;
        let epoch = Regex::new(r"^(\d+(?:\.\d+)?)\s+([-+]?\d+(?:\.\d+)?)$")?;

        let mut samples = Vec::new();
        for (n, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let sample = if let Some(caps) = calendar.captures(line) {
                let time = if caps[2].len() == 5 {
                    format!("{}:00", &caps[2])
                } else {
                    caps[2].to_string()
                };
                NaiveDateTime::parse_from_str(
                    &format!("{} {}", &caps[1], time),
                    "%Y-%m-%d %H:%M:%S",
                )
                .ok()
                .zip(caps[3].parse::<f64>().ok())
                .map(|(dt, level)| (dt.and_utc().timestamp_millis(), level))
            } else if let Some(caps) = epoch.captures(line) {
                caps[1]
                    .parse::<f64>()
                    .ok()
                    .zip(caps[2].parse::<f64>().ok())
                    .map(|(secs, level)| ((secs * 1000.0).round() as i64, level))
            } else {
                None
            };

            match sample {
                Some(s) => samples.push(s),
                None => debug!("skipping malformed tide line {}: {:?}", n + 1, raw),
            }
        }

        Ok(Self::from_samples(samples))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| TideError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let table = Self::parse(&text)?;
        if table.is_empty() {
            return Err(TideError::Empty(path.to_path_buf()));
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// True when the table has at least one sample on the timestamp's UTC day.
    pub fn covers(&self, timestamp_ms: i64) -> bool {
        utc_date(timestamp_ms).is_some_and(|d| self.dates.contains(&d))
    }

    /// Level at `timestamp_ms`, linearly interpolated between the nearest
    /// samples, or `None` when the day is not covered.
    pub fn level_at(&self, timestamp_ms: i64) -> Option<f64> {
        if !self.covers(timestamp_ms) {
            return None;
        }
        let before = self.levels.range(..=timestamp_ms).next_back();
        let after = self.levels.range(timestamp_ms..).next();
        match (before, after) {
            (Some((&t0, &l0)), Some((&t1, &l1))) => {
                if t1 == t0 {
                    Some(l0)
                } else {
                    let f = (timestamp_ms - t0) as f64 / (t1 - t0) as f64;
                    Some(l0 + (l1 - l0) * f)
                }
            }
            (Some((_, &l)), None) | (None, Some((_, &l))) => Some(l),
            (None, None) => None,
        }
    }
}

/// Looks up tide offsets for depth correction.
///
/// Misses (no table, or no sample on the requested day) return 0.0 and are
/// warned about once per calendar day.
#[derive(Debug, Default)]
pub struct TideCorrector {
    table: Option<TideTable>,
    warned_dates: HashSet<NaiveDate>,
    warned_no_table: bool,
    misses: usize,
}

impl TideCorrector {
    pub fn new(table: TideTable) -> Self {
        Self {
            table: Some(table),
            ..Self::default()
        }
    }

    /// A corrector with no table; every lookup is a miss.
    pub fn without_table() -> Self {
        Self::default()
    }

    /// Load the table at `path`, falling back to no table on any error.
    pub fn from_path(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::without_table();
        };
        match TideTable::from_file(path) {
            Ok(table) => {
                info!("Loaded {} tide samples from {}", table.len(), path.display());
                Self::new(table)
            }
            Err(e) => {
                warn!("{}; depths will not be tide corrected", e);
                Self::without_table()
            }
        }
    }

    /// Tide level in meters above the datum at `timestamp_ms`.
    pub fn tide_level(&mut self, timestamp_ms: i64) -> f64 {
        let Some(table) = &self.table else {
            self.misses += 1;
            if !self.warned_no_table {
                warn!("No tide table loaded, using a tide offset of 0");
                self.warned_no_table = true;
            }
            return 0.0;
        };

        match table.level_at(timestamp_ms) {
            Some(level) => level,
            None => {
                self.misses += 1;
                if let Some(date) = utc_date(timestamp_ms) {
                    if self.warned_dates.insert(date) {
                        warn!("No tide data for {}, using a tide offset of 0", date);
                    }
                }
                0.0
            }
        }
    }

    /// `raw_depth - tide_level(timestamp_ms)`.
    pub fn correct(&mut self, raw_depth: f64, timestamp_ms: i64) -> f64 {
        raw_depth - self.tide_level(timestamp_ms)
    }

    /// Number of lookups that fell back to 0.0.
    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn has_table(&self) -> bool {
        self.table.is_some()
    }
}
