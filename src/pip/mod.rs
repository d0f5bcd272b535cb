//! Point-in-Polygon (PIP) region classification.
//!
//! Loads region boundaries from GeoJSON and classifies points into regions
//! through a group bounding-box pre-filter, exact polygon tests and a
//! point-level memo cache.

mod boundary;
mod classifier;
pub(crate) mod index;

pub use boundary::{boundaries_from_geojson, load_boundaries, RegionBoundary};
pub use classifier::{
    classify, classify_counted, distinct_regions, ClassificationCache, ClassificationStats,
    PointClassifier,
};
pub use index::{RegionGroup, RegionIndex, RegionPolygon};
