//! Localness - per-entity geographic medians and region assignment.
//!
//! This library provides the estimator, the region index and the batch runner
//! shared by the `compute-medians`, `point-to-county` and `count-regions`
//! binaries.

pub mod batch;
pub mod config;
pub mod error;
pub mod geodesic;
pub mod median;
pub mod models;
pub mod pip;

pub use config::Config;
pub use error::{LocalnessError, Result};
pub use median::{GeoMedianEstimator, MedianResult};
pub use models::{BoundingBox, GeoPoint, RegionId};
pub use pip::{PointClassifier, RegionIndex};
