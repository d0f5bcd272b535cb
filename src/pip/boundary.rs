//! Region boundary loading from GeoJSON.

use geo::{BoundingRect, MultiPolygon};
use geojson::{feature::Id, GeoJson};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{LocalnessError, Result};
use crate::models::{BoundingBox, RegionId};

/// A single region polygon with its identifier
#[derive(Debug, Clone)]
pub struct RegionBoundary {
    pub id: RegionId,
    pub geometry: MultiPolygon<f64>,
}

impl RegionBoundary {
    pub fn new(id: impl Into<RegionId>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            id: id.into(),
            geometry,
        }
    }

    /// Get the bounding box of this boundary
    pub fn bbox(&self) -> Option<BoundingBox> {
        self.geometry.bounding_rect().map(BoundingBox::from)
    }
}

/// Load boundaries from a GeoJSON file
///
/// The region id is read from the `id_property` feature property, falling back
/// to the feature id.
pub fn load_boundaries(path: &Path, id_property: &str) -> Result<Vec<RegionBoundary>> {
    info!("Loading boundaries from {}", path.display());
    let content = fs::read_to_string(path)?;
    let geojson: GeoJson = content.parse()?;
    let boundaries = boundaries_from_geojson(geojson, id_property)?;
    info!("Loaded {} boundaries", boundaries.len());
    Ok(boundaries)
}

/// Extract polygon boundaries from parsed GeoJSON.
///
/// Features without an id or with non-areal geometry are skipped.
pub fn boundaries_from_geojson(geojson: GeoJson, id_property: &str) -> Result<Vec<RegionBoundary>> {
    let features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => {
            return Err(LocalnessError::Boundary(
                "expected a Feature or FeatureCollection, found a bare geometry".to_string(),
            ))
        }
    };

    let mut boundaries = Vec::with_capacity(features.len());

    for feature in features {
        let id = match feature.property(id_property) {
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            _ => match &feature.id {
                Some(Id::String(s)) => Some(s.clone()),
                Some(Id::Number(n)) => Some(n.to_string()),
                None => None,
            },
        };

        let Some(id) = id else {
            warn!("Skipping feature without '{}' property", id_property);
            continue;
        };

        let Some(geometry) = feature.geometry else {
            warn!("Skipping feature {} without geometry", id);
            continue;
        };

        let geometry: geo::Geometry<f64> = geometry.try_into()?;
        let geometry = match geometry {
            geo::Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
            geo::Geometry::MultiPolygon(multi) => multi,
            _ => {
                warn!("Skipping feature {} with non-polygon geometry", id);
                continue;
            }
        };

        boundaries.push(RegionBoundary { id, geometry });
    }

    Ok(boundaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"FIPS": "01001"},
                "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}
            },
            {
                "type": "Feature",
                "properties": {"FIPS": 1003},
                "geometry": {"type": "MultiPolygon", "coordinates": [[[[2,0],[3,0],[3,1],[2,1],[2,0]]]]}
            },
            {
                "type": "Feature",
                "properties": {"NAME": "no id"},
                "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}
            },
            {
                "type": "Feature",
                "properties": {"FIPS": "01005"},
                "geometry": {"type": "Point", "coordinates": [0.5, 0.5]}
            }
        ]
    }"#;

    #[test]
    fn test_loads_polygons_and_multipolygons() {
        let geojson: GeoJson = COLLECTION.parse().unwrap();
        let boundaries = boundaries_from_geojson(geojson, "FIPS").unwrap();
        let ids: Vec<&str> = boundaries.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["01001", "1003"]);
        assert_eq!(
            boundaries[0].bbox(),
            Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0))
        );
    }

    #[test]
    fn test_bare_geometry_is_an_error() {
        let geojson: GeoJson = r#"{"type": "Point", "coordinates": [0, 0]}"#.parse().unwrap();
        assert!(boundaries_from_geojson(geojson, "FIPS").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counties.geojson");
        fs::write(&path, COLLECTION).unwrap();
        let boundaries = load_boundaries(&path, "FIPS").unwrap();
        assert_eq!(boundaries.len(), 2);
    }
}
