//! Seabed classification of tile locations against sand/rock polygons.
//!
//! Boundaries come from a GeoJSON feature collection. Each feature carries a
//! type property whose value is matched case-insensitively for the
//! substrings "sand" and "rock"; features matching neither are ignored.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::config::ClassificationConfig;
use crate::core::geo::GeoPoint;
use crate::core::records::ClassificationLabel;

/// Errors that can occur while loading classification boundaries.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("failed to read classification file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON root must be a FeatureCollection")]
    NotFeatureCollection,
}

pub type Result<T> = std::result::Result<T, ClassificationError>;

/// Closed polygon with optional holes, in geographic coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    exterior: Vec<GeoPoint>,
    holes: Vec<Vec<GeoPoint>>,
}

impl Polygon {
    pub fn new(exterior: Vec<GeoPoint>, holes: Vec<Vec<GeoPoint>>) -> Self {
        Self { exterior, holes }
    }

    /// Even-odd test treating longitude as x and latitude as y.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        ring_contains(&self.exterior, point) && !self.holes.iter().any(|h| ring_contains(h, point))
    }
}

fn ring_contains(ring: &[GeoPoint], p: &GeoPoint) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let (x, y) = (p.longitude, p.latitude);
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].longitude, ring[i].latitude);
        let (xj, yj) = (ring[j].longitude, ring[j].latitude);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Named collection of polygons answering membership queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolygonSet {
    pub name: String,
    polygons: Vec<Polygon>,
}

impl PolygonSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            polygons: Vec::new(),
        }
    }

    pub fn push(&mut self, polygon: Polygon) {
        self.polygons.push(polygon);
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.polygons.iter().any(|p| p.contains(point))
    }
}

/// Outcome of classifying one sub-cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Write the tile, with a label when classification is enabled
    Accept(Option<ClassificationLabel>),
    /// Suppress the tile entirely
    Drop,
}

/// Labels locations against sand and rock boundaries.
#[derive(Debug, Clone, Default)]
pub enum RegionClassifier {
    /// Every location is accepted without a label.
    #[default]
    Disabled,
    Enabled { sand: PolygonSet, rock: PolygonSet },
}

impl RegionClassifier {
    pub fn new(sand: PolygonSet, rock: PolygonSet) -> Self {
        RegionClassifier::Enabled { sand, rock }
    }

    /// Build the classifier described by `config`.
    ///
    /// No configured file disables classification, as does a configured path
    /// that does not exist (with a warning). A file that exists but cannot be
    /// read or parsed is an error.
    pub fn from_config(config: &ClassificationConfig) -> Result<Self> {
        let Some(path) = config.file.as_deref() else {
            return Ok(RegionClassifier::Disabled);
        };
        if !path.exists() {
            warn!(
                "Classification file {} not found, tiles will not be classified",
                path.display()
            );
            return Ok(RegionClassifier::Disabled);
        }
        Self::from_file(path, &config.property)
    }

    pub fn from_file(path: &Path, property: &str) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| ClassificationError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let classifier = Self::from_geojson_str(&text, property)?;
        if let RegionClassifier::Enabled { sand, rock } = &classifier {
            info!(
                "Loaded {} sand and {} rock polygons from {}",
                sand.len(),
                rock.len(),
                path.display()
            );
        }
        Ok(classifier)
    }

    /// Parse a GeoJSON feature collection. Features with a missing property
    /// or malformed geometry are skipped.
    pub fn from_geojson_str(text: &str, property: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text)?;
        let features = match (root.get("type").and_then(Value::as_str), root.get("features")) {
            (Some("FeatureCollection"), Some(Value::Array(features))) => features,
            _ => return Err(ClassificationError::NotFeatureCollection),
        };

        let mut sand = PolygonSet::new("sand");
        let mut rock = PolygonSet::new("rock");

        for (i, feature) in features.iter().enumerate() {
            let Some(kind) = feature_type(feature, property) else {
                warn!("Skipping feature {}: no '{}' property", i, property);
                continue;
            };
            let kind = kind.to_lowercase();
            let (is_sand, is_rock) = (kind.contains("sand"), kind.contains("rock"));
            if !is_sand && !is_rock {
                debug!("Ignoring feature {} of type {:?}", i, kind);
                continue;
            }

            let Some(polygons) = feature.get("geometry").and_then(parse_geometry) else {
                warn!("Skipping feature {}: unsupported or malformed geometry", i);
                continue;
            };
            // A mixed type such as "sand and rock" belongs to both sets
            if is_sand && is_rock {
                polygons.iter().cloned().for_each(|p| sand.push(p));
                polygons.into_iter().for_each(|p| rock.push(p));
            } else if is_sand {
                polygons.into_iter().for_each(|p| sand.push(p));
            } else {
                polygons.into_iter().for_each(|p| rock.push(p));
            }
        }

        Ok(Self::new(sand, rock))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, RegionClassifier::Enabled { .. })
    }

    /// Rock wins when a location lies in both sets; a location in neither
    /// is dropped.
    pub fn classify(&self, point: &GeoPoint) -> Verdict {
        match self {
            RegionClassifier::Disabled => Verdict::Accept(None),
            RegionClassifier::Enabled { sand, rock } => {
                if rock.contains(point) {
                    Verdict::Accept(Some(ClassificationLabel::Rock))
                } else if sand.contains(point) {
                    Verdict::Accept(Some(ClassificationLabel::Sand))
                } else {
                    Verdict::Drop
                }
            }
        }
    }
}

/// Property value looked up with a case-insensitive key.
fn feature_type<'a>(feature: &'a Value, property: &str) -> Option<&'a str> {
    feature
        .get("properties")?
        .as_object()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(property))
        .and_then(|(_, v)| v.as_str())
}

fn parse_geometry(geometry: &Value) -> Option<Vec<Polygon>> {
    let coords = geometry.get("coordinates")?;
    match geometry.get("type")?.as_str()? {
        "Polygon" => parse_polygon(coords).map(|p| vec![p]),
        "MultiPolygon" => coords.as_array()?.iter().map(parse_polygon).collect(),
        _ => None,
    }
}

fn parse_polygon(rings: &Value) -> Option<Polygon> {
    let mut rings = rings.as_array()?.iter().map(parse_ring);
    let exterior = rings.next()??;
    let holes = rings.collect::<Option<Vec<_>>>()?;
    Some(Polygon::new(exterior, holes))
}

/// GeoJSON positions are `[longitude, latitude, ...]`.
fn parse_ring(ring: &Value) -> Option<Vec<GeoPoint>> {
    ring.as_array()?
        .iter()
        .map(|pos| {
            let pos = pos.as_array()?;
            let lon = pos.first()?.as_f64()?;
            let lat = pos.get(1)?.as_f64()?;
            Some(GeoPoint::new(lat, lon))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn square(lat: f64, lon: f64, size: f64) -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(lat, lon),
            GeoPoint::new(lat, lon + size),
            GeoPoint::new(lat + size, lon + size),
            GeoPoint::new(lat + size, lon),
            GeoPoint::new(lat, lon),
        ]
    }

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"type": "Fine SAND"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]]}},
            {"type": "Feature", "properties": {"TYPE": "rock outcrop"},
             "geometry": {"type": "MultiPolygon", "coordinates": [
                [[[1,1],[3,1],[3,3],[1,3],[1,1]]],
                [[[10,10],[11,10],[11,11],[10,11],[10,10]]]
             ]}},
            {"type": "Feature", "properties": {"TYPE": "mud"},
             "geometry": {"type": "Polygon", "coordinates": [[[5,5],[6,5],[6,6],[5,6],[5,5]]]}},
            {"type": "Feature", "properties": {"TYPE": "sand"},
             "geometry": {"type": "Polygon", "coordinates": "broken"}},
            {"type": "Feature", "properties": {},
             "geometry": {"type": "Polygon", "coordinates": [[[7,7],[8,7],[8,8],[7,7]]]}}
        ]
    }"#;

    #[test]
    fn test_polygon_with_hole() {
        let poly = Polygon::new(square(0.0, 0.0, 10.0), vec![square(4.0, 4.0, 2.0)]);
        assert!(poly.contains(&GeoPoint::new(1.0, 1.0)));
        assert!(!poly.contains(&GeoPoint::new(5.0, 5.0)));
        assert!(!poly.contains(&GeoPoint::new(11.0, 1.0)));
    }

    #[test]
    fn test_rock_wins_over_sand() {
        let mut sand = PolygonSet::new("sand");
        sand.push(Polygon::new(square(0.0, 0.0, 2.0), vec![]));
        let mut rock = PolygonSet::new("rock");
        rock.push(Polygon::new(square(1.0, 1.0, 2.0), vec![]));
        let classifier = RegionClassifier::new(sand, rock);

        let both = GeoPoint::new(1.5, 1.5);
        assert_eq!(
            classifier.classify(&both),
            Verdict::Accept(Some(ClassificationLabel::Rock))
        );
        assert_eq!(
            classifier.classify(&GeoPoint::new(0.5, 0.5)),
            Verdict::Accept(Some(ClassificationLabel::Sand))
        );
        assert_eq!(classifier.classify(&GeoPoint::new(-5.0, 0.5)), Verdict::Drop);
    }

    #[test]
    fn test_disabled_accepts_everything() {
        let classifier = RegionClassifier::Disabled;
        assert!(!classifier.is_enabled());
        assert_eq!(classifier.classify(&GeoPoint::new(45.0, 45.0)), Verdict::Accept(None));
    }

    #[test]
    fn test_geojson_skips_malformed_features() {
        let classifier = RegionClassifier::from_geojson_str(COLLECTION, "TYPE").unwrap();
        let RegionClassifier::Enabled { sand, rock } = &classifier else {
            panic!("expected an enabled classifier");
        };
        assert_eq!(sand.len(), 1);
        assert_eq!(rock.len(), 2);

        // GeoJSON is lon/lat: (lat 10.5, lon 10.5) is in the second rock polygon
        assert_eq!(
            classifier.classify(&GeoPoint::new(10.5, 10.5)),
            Verdict::Accept(Some(ClassificationLabel::Rock))
        );
        // Inside the mud polygon only
        assert_eq!(classifier.classify(&GeoPoint::new(5.5, 5.5)), Verdict::Drop);
    }

    #[test]
    fn test_mixed_type_feature_joins_both_sets() {
        let text = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"TYPE": "Sand and Rock"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]]}}
        ]}"#;
        let classifier = RegionClassifier::from_geojson_str(text, "TYPE").unwrap();
        let RegionClassifier::Enabled { sand, rock } = &classifier else {
            panic!("expected an enabled classifier");
        };
        assert_eq!((sand.len(), rock.len()), (1, 1));
        assert_eq!(
            classifier.classify(&GeoPoint::new(1.0, 1.0)),
            Verdict::Accept(Some(ClassificationLabel::Rock))
        );
    }

    #[test]
    fn test_geojson_rejects_non_collection() {
        let err = RegionClassifier::from_geojson_str(r#"{"type": "Feature"}"#, "TYPE").unwrap_err();
        assert!(matches!(err, ClassificationError::NotFeatureCollection));
        assert!(RegionClassifier::from_geojson_str("not json", "TYPE").is_err());
    }

    #[test]
    fn test_from_config() {
        let config = ClassificationConfig::default();
        assert!(!RegionClassifier::from_config(&config).unwrap().is_enabled());

        let missing = ClassificationConfig {
            file: Some(PathBuf::from("/nonexistent/boundaries.geojson")),
            ..ClassificationConfig::default()
        };
        assert!(!RegionClassifier::from_config(&missing).unwrap().is_enabled());

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(COLLECTION.as_bytes()).unwrap();
        file.flush().unwrap();
        let present = ClassificationConfig {
            file: Some(file.path().to_path_buf()),
            ..ClassificationConfig::default()
        };
        assert!(RegionClassifier::from_config(&present).unwrap().is_enabled());
    }
}
