//! Run configuration, loaded from TOML with every field defaulted.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::models::BoundingBox;

/// Minimum number of points before a median is attempted.
pub const MIN_POINTS: usize = 5;
/// Largest accepted median absolute deviation, in kilometers.
pub const MAD_LIMIT_KM: f64 = 30.0;
/// Displacement between iterations, in meters, that ends the search.
pub const CONVERGENCE_METERS: f64 = 1.0;
pub const MAX_ITERATIONS: usize = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub median: MedianConfig,
    pub classification: ClassificationConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MedianConfig {
    pub min_points: usize,
    pub mad_limit_km: f64,
    pub convergence_meters: f64,
    pub max_iterations: usize,
    /// Pick the input point with the least total distance instead of iterating.
    pub snap_to_input_points: bool,
}

impl Default for MedianConfig {
    fn default() -> Self {
        Self {
            min_points: MIN_POINTS,
            mad_limit_km: MAD_LIMIT_KM,
            convergence_meters: CONVERGENCE_METERS,
            max_iterations: MAX_ITERATIONS,
            snap_to_input_points: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Feature property holding the region identifier.
    pub id_property: String,
    /// Leading characters of a region id that name its group (2 for state FIPS).
    pub group_key_len: usize,
    /// Reject points outside `country_bbox` before any group is tested.
    pub country_filter: bool,
    pub country_bbox: BoundingBox,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            id_property: "FIPS".to_string(),
            group_key_len: 2,
            country_filter: true,
            country_bbox: BoundingBox::CONTIGUOUS_US,
        }
    }
}

impl ClassificationConfig {
    pub fn country_bbox(&self) -> Option<BoundingBox> {
        self.country_filter.then_some(self.country_bbox)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write a row for every entity, leaving unresolved ones empty.
    pub emit_all_entities: bool,
    /// Entities estimated per parallel batch.
    pub chunk_size: usize,
    /// Log progress every this many entities.
    pub progress_every: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            emit_all_entities: true,
            chunk_size: 4096,
            progress_every: 2500,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.median.min_points, 5);
        assert_eq!(config.median.max_iterations, 1000);
        assert_eq!(config.median.mad_limit_km, 30.0);
        assert!(config.output.emit_all_entities);
        assert_eq!(
            config.classification.country_bbox(),
            Some(BoundingBox::CONTIGUOUS_US)
        );
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [median]
            snap_to_input_points = true
            mad_limit_km = 50.0

            [classification]
            country_filter = false
            "#,
        )
        .unwrap();
        assert!(config.median.snap_to_input_points);
        assert_eq!(config.median.mad_limit_km, 50.0);
        assert_eq!(config.median.min_points, 5);
        assert_eq!(config.classification.country_bbox(), None);
        assert_eq!(config.classification.id_property, "FIPS");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("localness.toml");
        fs::write(&path, "[output]\nemit_all_entities = false\n").unwrap();
        let config = Config::load_from_file(&path).unwrap();
        assert!(!config.output.emit_all_entities);
        assert_eq!(config.output.chunk_size, 4096);
    }
}
