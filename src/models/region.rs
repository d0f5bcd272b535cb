//! Region identifiers and bounding boxes.

use geo::{Polygon, Rect};
use rstar::AABB;
use serde::{Deserialize, Serialize};

use super::GeoPoint;

/// Region identifier, e.g. a 5-digit county FIPS code.
pub type RegionId = String;

/// Axis-aligned bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Contiguous United States.
    pub const CONTIGUOUS_US: BoundingBox = BoundingBox {
        min_lon: -124.848974,
        min_lat: 24.396308,
        max_lon: -66.885444,
        max_lat: 49.384358,
    };

    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Inclusive containment; points on an edge still reach the exact polygon test.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lon >= self.min_lon
            && point.lon <= self.max_lon
            && point.lat >= self.min_lat
            && point.lat <= self.max_lat
    }

    /// Containment excluding the edges.
    pub fn contains_interior(&self, point: &GeoPoint) -> bool {
        point.lon > self.min_lon
            && point.lon < self.max_lon
            && point.lat > self.min_lat
            && point.lat < self.max_lat
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lon: self.min_lon.min(other.min_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lon: self.max_lon.max(other.max_lon),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Rect::new(
            geo::coord! { x: self.min_lon, y: self.min_lat },
            geo::coord! { x: self.max_lon, y: self.max_lat },
        )
        .to_polygon()
    }

    pub fn to_aabb(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_lon, self.min_lat], [self.max_lon, self.max_lat])
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_inclusive() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(bbox.contains(&GeoPoint::new(0.5, 0.5)));
        assert!(bbox.contains(&GeoPoint::new(1.0, 0.0)));
        assert!(!bbox.contains(&GeoPoint::new(1.0001, 0.5)));
        assert!(bbox.contains_interior(&GeoPoint::new(0.5, 0.5)));
        assert!(!bbox.contains_interior(&GeoPoint::new(1.0, 0.5)));
        assert!(!bbox.contains_interior(&GeoPoint::new(0.5, 0.0)));
    }

    #[test]
    fn test_contiguous_us() {
        let minneapolis = GeoPoint::new(44.977753, -93.265011);
        let honolulu = GeoPoint::new(21.306944, -157.858333);
        assert!(BoundingBox::CONTIGUOUS_US.contains(&minneapolis));
        assert!(!BoundingBox::CONTIGUOUS_US.contains(&honolulu));
    }

    #[test]
    fn test_union() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let b = BoundingBox::new(-2.0, 0.5, 0.5, 3.0);
        assert_eq!(a.union(&b), BoundingBox::new(-2.0, 0.0, 1.0, 3.0));
    }
}
