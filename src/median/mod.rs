//! Geometric median estimation for per-entity point sets.

mod estimator;

pub use estimator::{
    centroid, compute, median_absolute_deviation, medoid, objective, GeoMedianEstimator,
    MedianOutcome, MedianResult, Rejection,
};
