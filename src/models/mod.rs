//! Core data models shared by the estimator, the classifier and the batch runner.

pub mod point;
pub mod record;
pub mod region;

pub use point::{GeoPoint, COORD_DECIMALS};
pub use record::{
    EntityLocation, EntityMedian, EntityRegion, EntityRegionCount, PointInput, PointRecord,
};
pub use region::{BoundingBox, RegionId};
