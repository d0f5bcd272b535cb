//! Per-entity input and output records.

use serde::{Deserialize, Serialize};

use super::{GeoPoint, RegionId};

/// One geotagged contribution, as read from the points table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub entity_id: String,
    pub point: GeoPoint,
}

/// Median location for one entity; `None` when no reliable location exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMedian {
    pub entity_id: String,
    pub median: Option<GeoPoint>,
}

/// A point to classify, as read from a median or location table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointInput {
    pub entity_id: String,
    pub point: Option<GeoPoint>,
    /// Extra input column copied unchanged to the output row.
    pub passthrough: Option<String>,
}

impl From<EntityMedian> for PointInput {
    fn from(row: EntityMedian) -> Self {
        PointInput {
            entity_id: row.entity_id,
            point: row.median,
            passthrough: None,
        }
    }
}

/// Region containing an entity's point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRegion {
    pub entity_id: String,
    pub passthrough: Option<String>,
    pub region: Option<RegionId>,
}

/// Median and its region, produced by the combined pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityLocation {
    pub entity_id: String,
    pub median: Option<GeoPoint>,
    pub region: Option<RegionId>,
}

/// Number of distinct regions an entity's points fall in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRegionCount {
    pub entity_id: String,
    pub regions: usize,
}
