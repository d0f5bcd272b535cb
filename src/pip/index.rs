//! Two-level region index: group bounding boxes, then exact region polygons.

use geo::{Contains, MultiPolygon, Point};
use hashbrown::HashMap;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use super::{load_boundaries, RegionBoundary};
use crate::config::ClassificationConfig;
use crate::error::Result;
use crate::models::{BoundingBox, GeoPoint, RegionId};

/// A region polygon with its precomputed bounding box
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPolygon {
    pub id: RegionId,
    pub group: String,
    pub bbox: BoundingBox,
    geometry: MultiPolygon<f64>,
}

impl RegionPolygon {
    /// Exact containment; points on the boundary are outside.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.bbox.contains(point) && self.geometry.contains(&Point::from(*point))
    }
}

/// A coarse group (e.g. a state) and the regions it owns, sorted by id
#[derive(Debug, Clone)]
pub struct RegionGroup {
    pub key: String,
    pub bbox: BoundingBox,
    pub regions: Vec<RegionPolygon>,
}

/// Wrapper for R-tree indexing of group envelopes
#[derive(Debug, Clone)]
struct IndexedGroup {
    slot: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedGroup {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Read-only index for point-in-region classification.
///
/// Built once per run and shared by reference across workers.
pub struct RegionIndex {
    groups: Vec<RegionGroup>,
    tree: RTree<IndexedGroup>,
    by_id: HashMap<RegionId, (usize, usize)>,
    country_bbox: Option<BoundingBox>,
}

impl RegionIndex {
    /// Build the index from group and region boundaries.
    ///
    /// Each region joins the group named by the first `group_key_len`
    /// characters of its id. Regions with no matching group are dropped.
    pub fn build(
        group_boundaries: Vec<RegionBoundary>,
        region_boundaries: Vec<RegionBoundary>,
        config: &ClassificationConfig,
    ) -> Self {
        info!(
            "Building region index for {} groups and {} regions...",
            group_boundaries.len(),
            region_boundaries.len()
        );

        let mut groups: BTreeMap<String, RegionGroup> = BTreeMap::new();
        for boundary in group_boundaries {
            let Some(bbox) = boundary.bbox() else {
                warn!("Group {} has empty geometry, skipping", boundary.id);
                continue;
            };
            let key = group_key(&boundary.id, config.group_key_len).to_string();
            groups
                .entry(key.clone())
                .and_modify(|g| g.bbox = g.bbox.union(&bbox))
                .or_insert(RegionGroup {
                    key,
                    bbox,
                    regions: Vec::new(),
                });
        }

        let mut orphaned = 0usize;
        for boundary in region_boundaries {
            let key = group_key(&boundary.id, config.group_key_len);
            let Some(group) = groups.get_mut(key) else {
                warn!("Region {} has no group '{}', skipping", boundary.id, key);
                orphaned += 1;
                continue;
            };
            let Some(bbox) = boundary.bbox() else {
                warn!("Region {} has empty geometry, skipping", boundary.id);
                continue;
            };
            group.regions.push(RegionPolygon {
                group: group.key.clone(),
                id: boundary.id,
                bbox,
                geometry: boundary.geometry,
            });
        }

        let index = Self::from_groups(groups.into_values().collect(), config.country_bbox());
        info!(
            "Region index built with {} groups and {} regions ({} orphaned)",
            index.groups.len(),
            index.len(),
            orphaned
        );
        index
    }

    /// Build the index from regions alone, using the union of each group's
    /// region boxes as the group bounding box.
    pub fn build_from_regions(
        region_boundaries: Vec<RegionBoundary>,
        config: &ClassificationConfig,
    ) -> Self {
        let groups: Vec<RegionBoundary> = region_boundaries
            .iter()
            .filter_map(|b| {
                let bbox = b.bbox()?;
                Some(RegionBoundary::new(
                    group_key(&b.id, config.group_key_len),
                    MultiPolygon::new(vec![bbox.to_polygon()]),
                ))
            })
            .collect();
        Self::build(groups, region_boundaries, config)
    }

    /// Load boundary files and build the index. Without a group file, group
    /// boxes are derived from the regions.
    pub fn load(
        regions: &Path,
        groups: Option<&Path>,
        config: &ClassificationConfig,
    ) -> Result<Self> {
        let region_boundaries = load_boundaries(regions, &config.id_property)?;
        let index = match groups {
            Some(path) => {
                let group_boundaries = load_boundaries(path, &config.id_property)?;
                Self::build(group_boundaries, region_boundaries, config)
            }
            None => Self::build_from_regions(region_boundaries, config),
        };
        Ok(index)
    }

    fn from_groups(mut groups: Vec<RegionGroup>, country_bbox: Option<BoundingBox>) -> Self {
        let mut by_id = HashMap::new();
        for (g, group) in groups.iter_mut().enumerate() {
            group.regions.sort_by(|a, b| a.id.cmp(&b.id));
            for (r, region) in group.regions.iter().enumerate() {
                by_id.insert(region.id.clone(), (g, r));
            }
        }

        let indexed: Vec<IndexedGroup> = groups
            .iter()
            .enumerate()
            .map(|(slot, group)| IndexedGroup {
                slot,
                envelope: group.bbox.to_aabb(),
            })
            .collect();

        Self {
            groups,
            tree: RTree::bulk_load(indexed),
            by_id,
            country_bbox,
        }
    }

    /// Find the region containing a point
    pub fn classify(&self, point: GeoPoint) -> Option<RegionId> {
        self.classify_with_stats(point).0.map(|r| r.id.clone())
    }

    /// Find the region containing a point, also returning how many exact
    /// polygon tests were needed.
    pub fn classify_with_stats(&self, point: GeoPoint) -> (Option<&RegionPolygon>, usize) {
        if let Some(country) = &self.country_bbox {
            if !country.contains_interior(&point) {
                return (None, 0);
            }
        }

        // Groups are visited in key order so overlapping boxes resolve deterministically.
        let query_envelope = AABB::from_point([point.lon, point.lat]);
        let mut slots: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_envelope)
            .map(|ig| ig.slot)
            .collect();
        slots.sort_unstable();

        let mut tests = 0;
        for slot in slots {
            for region in &self.groups[slot].regions {
                if !region.bbox.contains(&point) {
                    continue;
                }
                tests += 1;
                if region.contains(&point) {
                    return (Some(region), tests);
                }
            }
        }
        (None, tests)
    }

    /// Whether the named region contains the point.
    pub fn region_contains(&self, id: &str, point: GeoPoint) -> bool {
        self.region(id).is_some_and(|r| r.contains(&point))
    }

    pub fn region(&self, id: &str) -> Option<&RegionPolygon> {
        let (g, r) = *self.by_id.get(id)?;
        Some(&self.groups[g].regions[r])
    }

    pub fn groups(&self) -> &[RegionGroup] {
        &self.groups
    }

    /// Get total number of indexed regions
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

fn group_key(id: &str, len: usize) -> &str {
    match id.char_indices().nth(len) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    pub(crate) fn square(min_lon: f64, min_lat: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: min_lon, y: min_lat),
            (x: min_lon + size, y: min_lat),
            (x: min_lon + size, y: min_lat + size),
            (x: min_lon, y: min_lat + size),
            (x: min_lon, y: min_lat),
        ]])
    }

    pub(crate) fn test_config() -> ClassificationConfig {
        ClassificationConfig {
            country_filter: false,
            ..ClassificationConfig::default()
        }
    }

    /// Two groups: "01" covering [0,2]x[0,1] split into two counties, "02" at [10,11]x[10,11].
    pub(crate) fn test_index() -> RegionIndex {
        let regions = vec![
            RegionBoundary::new("01001", square(0.0, 0.0, 1.0)),
            RegionBoundary::new("01003", square(1.0, 0.0, 1.0)),
            RegionBoundary::new("02001", square(10.0, 10.0, 1.0)),
        ];
        RegionIndex::build_from_regions(regions, &test_config())
    }

    #[test]
    fn test_point_in_unit_square() {
        let index = test_index();
        assert_eq!(index.classify(GeoPoint::new(0.5, 0.5)), Some("01001".to_string()));
        assert_eq!(index.classify(GeoPoint::new(0.5, 1.5)), Some("01003".to_string()));
        assert_eq!(index.classify(GeoPoint::new(10.5, 10.5)), Some("02001".to_string()));
    }

    #[test]
    fn test_point_outside_all_regions() {
        let index = test_index();
        assert_eq!(index.classify(GeoPoint::new(50.0, 50.0)), None);
        assert_eq!(index.classify(GeoPoint::new(5.0, 5.0)), None);
    }

    #[test]
    fn test_only_enclosing_group_is_searched() {
        let index = test_index();
        let (region, tests) = index.classify_with_stats(GeoPoint::new(10.5, 10.5));
        assert_eq!(region.map(|r| r.group.as_str()), Some("02"));
        assert_eq!(tests, 1);

        let (region, tests) = index.classify_with_stats(GeoPoint::new(50.0, 50.0));
        assert!(region.is_none());
        assert_eq!(tests, 0);
    }

    #[test]
    fn test_country_prefilter() {
        let config = ClassificationConfig {
            country_filter: true,
            country_bbox: BoundingBox::new(-1.0, -1.0, 5.0, 5.0),
            ..ClassificationConfig::default()
        };
        let regions = vec![
            RegionBoundary::new("01001", square(0.0, 0.0, 1.0)),
            RegionBoundary::new("02001", square(10.0, 10.0, 1.0)),
        ];
        let index = RegionIndex::build_from_regions(regions, &config);
        assert_eq!(index.classify(GeoPoint::new(0.5, 0.5)), Some("01001".to_string()));
        assert_eq!(index.classify_with_stats(GeoPoint::new(10.5, 10.5)), (None, 0));
    }

    #[test]
    fn test_country_edge_is_outside() {
        let config = ClassificationConfig {
            country_filter: true,
            country_bbox: BoundingBox::new(0.5, -1.0, 5.0, 5.0),
            ..ClassificationConfig::default()
        };
        let regions = vec![RegionBoundary::new("01001", square(0.0, 0.0, 1.0))];
        let index = RegionIndex::build_from_regions(regions, &config);
        assert_eq!(index.classify_with_stats(GeoPoint::new(0.5, 0.5)), (None, 0));
        assert_eq!(index.classify(GeoPoint::new(0.5, 0.6)), Some("01001".to_string()));
    }

    #[test]
    fn test_explicit_groups_and_orphans() {
        let groups = vec![RegionBoundary::new("01", square(0.0, 0.0, 2.0))];
        let regions = vec![
            RegionBoundary::new("01001", square(0.0, 0.0, 1.0)),
            RegionBoundary::new("99001", square(0.0, 0.0, 1.0)),
        ];
        let index = RegionIndex::build(groups, regions, &test_config());
        assert_eq!(index.len(), 1);
        assert_eq!(index.groups().len(), 1);
        assert!(index.region("99001").is_none());
    }

    #[test]
    fn test_region_contains() {
        let index = test_index();
        assert!(index.region_contains("01001", GeoPoint::new(0.5, 0.5)));
        assert!(!index.region_contains("01003", GeoPoint::new(0.5, 0.5)));
        assert!(!index.region_contains("missing", GeoPoint::new(0.5, 0.5)));
    }

    #[test]
    fn test_group_key() {
        assert_eq!(group_key("27053", 2), "27");
        assert_eq!(group_key("2", 2), "2");
        assert_eq!(group_key("27053", 0), "");
    }
}
