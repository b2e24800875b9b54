//! Swath and sidescan records produced by the survey sources.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::geo::GeoPoint;

/// Vehicle pose at ping time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub position: GeoPoint,
    /// Vehicle depth below the surface in meters
    pub depth: f64,
    /// Roll, pitch and yaw in radians
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// One multibeam depth sample, offset from the vehicle position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamSample {
    pub north: f32,
    pub east: f32,
    pub depth: f32,
}

/// One multibeam ping.
///
/// `beams` is ordered by beam index; `None` entries are sensor dropouts.
#[derive(Debug, Clone, PartialEq)]
pub struct SwathRecord {
    pub timestamp_ms: i64,
    pub pose: Pose,
    pub beams: Vec<Option<BeamSample>>,
}

impl SwathRecord {
    #[inline]
    pub fn num_beams(&self) -> usize {
        self.beams.len()
    }
}

/// Navigation state attached to each sidescan ping.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VehicleState {
    /// Altitude above the seafloor in meters
    pub altitude: f64,
    /// Depth below the surface in meters
    pub depth: f64,
    /// Forward speed (body-frame U) in m/s
    pub speed: f64,
}

/// One sidescan ping: an across-track intensity profile, port to starboard.
#[derive(Debug, Clone, PartialEq)]
pub struct SidescanLine {
    pub timestamp_ms: i64,
    pub state: VehicleState,
    /// Acoustic range per side in meters
    pub range: f64,
    /// Frequency in Hz
    pub frequency: f64,
    pub subsystem: u32,
    pub position: GeoPoint,
    /// Heading in radians, clockwise from north
    pub heading: f64,
    pub data: Vec<f64>,
}

impl SidescanLine {
    #[inline]
    pub fn width(&self) -> usize {
        self.data.len()
    }

    /// Geolocation of column `index` in an image of `width` columns
    /// rendered from this line.
    ///
    /// The center column is nadir; columns right of center lie to
    /// starboard. The slant distance is projected to ground range using
    /// the vehicle altitude, so every column closer than the altitude maps
    /// onto nadir.
    pub fn location_at(&self, index: f64, width: usize) -> GeoPoint {
        if width == 0 || self.range <= 0.0 {
            return self.position;
        }
        let half = width as f64 / 2.0;
        let meters_per_px = 2.0 * self.range / width as f64;
        let slant = (index - half) * meters_per_px;
        let altitude = self.state.altitude.max(0.0);
        let ground = (slant * slant - altitude * altitude).max(0.0).sqrt() * slant.signum();

        let bearing = self.heading + std::f64::consts::FRAC_PI_2;
        self.position
            .translated(ground * bearing.cos(), ground * bearing.sin())
    }
}

/// Seabed class attached to a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationLabel {
    Sand,
    Rock,
    Unlabeled,
}

impl ClassificationLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationLabel::Sand => "sand",
            ClassificationLabel::Rock => "rock",
            ClassificationLabel::Unlabeled => "unlabeled",
        }
    }
}

impl fmt::Display for ClassificationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(heading: f64, altitude: f64) -> SidescanLine {
        SidescanLine {
            timestamp_ms: 0,
            state: VehicleState {
                altitude,
                depth: 2.0,
                speed: 1.2,
            },
            range: 50.0,
            frequency: 770_000.0,
            subsystem: 0,
            position: GeoPoint::new(41.0, -8.0),
            heading,
            data: vec![0.0; 100],
        }
    }

    #[test]
    fn test_location_at_nadir() {
        let l = line(0.0, 5.0);
        assert_eq!(l.location_at(50.0, 100), l.position);
    }

    #[test]
    fn test_location_heading_north_starboard_is_east() {
        let l = line(0.0, 0.0);
        let p = l.location_at(100.0, 100);
        let (n, e) = p.offset_from(&l.position);
        assert!(n.abs() < 1e-6);
        assert!((e - 50.0).abs() < 1e-6);

        let port = l.location_at(0.0, 100);
        let (_, e) = port.offset_from(&l.position);
        assert!((e + 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_location_within_altitude_collapses_to_nadir() {
        let l = line(0.3, 10.0);
        // 5 px * 1 m/px = 5 m slant, below the 10 m altitude
        assert_eq!(l.location_at(55.0, 100), l.position);
    }
}
