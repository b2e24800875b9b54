//! Geographic points and local tangent-plane offsets.
//!
//! Survey extents are a few kilometres at most, so a spherical-earth
//! equirectangular approximation around a fixed origin is used for all
//! north/east conversions.

use serde::{Deserialize, Serialize};

/// Earth radius in meters (WGS84 equatorial).
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Returns this point moved by `north` and `east` meters.
    pub fn translated(&self, north: f64, east: f64) -> GeoPoint {
        let dlat = (north / EARTH_RADIUS_M).to_degrees();
        let cos_lat = self.latitude.to_radians().cos().max(1e-12);
        let dlon = (east / (EARTH_RADIUS_M * cos_lat)).to_degrees();
        GeoPoint::new(self.latitude + dlat, self.longitude + dlon)
    }

    /// North/east offset in meters of this point relative to `origin`.
    pub fn offset_from(&self, origin: &GeoPoint) -> (f64, f64) {
        let north = (self.latitude - origin.latitude).to_radians() * EARTH_RADIUS_M;
        let east = (self.longitude - origin.longitude).to_radians()
            * EARTH_RADIUS_M
            * origin.latitude.to_radians().cos();
        (north, east)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_of_origin_is_zero() {
        let p = GeoPoint::new(41.18, -8.70);
        assert_eq!(p.offset_from(&p), (0.0, 0.0));
    }

    #[test]
    fn test_translate_then_offset() {
        let origin = GeoPoint::new(41.18, -8.70);
        let moved = origin.translated(120.0, -45.0);
        let (n, e) = moved.offset_from(&origin);
        assert!((n - 120.0).abs() < 1e-6);
        assert!((e + 45.0).abs() < 1e-6);
    }

    #[test]
    fn test_one_degree_latitude() {
        let origin = GeoPoint::new(0.0, 0.0);
        let (n, _) = GeoPoint::new(1.0, 0.0).offset_from(&origin);
        assert!((n - 111_319.49).abs() < 1.0);
    }
}
