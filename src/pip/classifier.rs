//! Memoized point classification.

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info};

use super::{RegionIndex, RegionPolygon};
use crate::error::Result;
use crate::models::{GeoPoint, RegionId};

/// Point key → resolved region (or `None` for "not found").
///
/// Grows monotonically during a run; polygons are static so entries are never
/// invalidated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationCache {
    entries: HashMap<String, Option<RegionId>>,
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, point: &GeoPoint) -> Option<&Option<RegionId>> {
        self.entries.get(&point.cache_key())
    }

    pub fn insert(&mut self, point: &GeoPoint, region: Option<RegionId>) {
        self.entries.insert(point.cache_key(), region);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a cache written by [`ClassificationCache::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let cache: ClassificationCache = serde_json::from_reader(reader)?;
        info!("Loaded {} cached classifications from {}", cache.len(), path.display());
        Ok(cache)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        info!("Saved {} cached classifications to {}", self.len(), path.display());
        Ok(())
    }
}

/// Counters accumulated across classification calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationStats {
    pub total: usize,
    pub cache_hits: usize,
    pub resolved: usize,
    /// Exact polygon containment tests run on cache misses.
    pub polygon_tests: usize,
}

/// Classify `point`, consulting and filling `cache`.
pub fn classify(
    point: GeoPoint,
    index: &RegionIndex,
    cache: &mut ClassificationCache,
) -> Option<RegionId> {
    classify_counted(point, index, cache, &mut ClassificationStats::default())
}

/// Classify `point` and record the lookup in `stats`.
pub fn classify_counted(
    point: GeoPoint,
    index: &RegionIndex,
    cache: &mut ClassificationCache,
    stats: &mut ClassificationStats,
) -> Option<RegionId> {
    stats.total += 1;

    let region = if let Some(cached) = cache.get(&point) {
        stats.cache_hits += 1;
        cached.clone()
    } else {
        let (found, tests) = index.classify_with_stats(point);
        stats.polygon_tests += tests;
        let region = found.map(|r| r.id.clone());
        debug!(
            "Classified {} -> {:?} after {} polygon tests",
            point, region, tests
        );
        cache.insert(&point, region.clone());
        region
    };

    if region.is_some() {
        stats.resolved += 1;
    }
    region
}

/// Distinct regions containing any of `points`.
///
/// The region matched by the previous point is tried first, since consecutive
/// points from one entity usually share a region.
pub fn distinct_regions<'a>(points: &[GeoPoint], index: &'a RegionIndex) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    let mut previous: Option<&RegionPolygon> = None;

    for point in points {
        if let Some(region) = previous.filter(|r| r.contains(point)) {
            seen.insert(region.id.as_str());
            continue;
        }
        if let (Some(region), _) = index.classify_with_stats(*point) {
            seen.insert(region.id.as_str());
            previous = Some(region);
        }
    }

    seen
}

/// Classifier bundling a shared index with a run-local cache.
pub struct PointClassifier<'a> {
    index: &'a RegionIndex,
    cache: ClassificationCache,
    stats: ClassificationStats,
}

impl<'a> PointClassifier<'a> {
    pub fn new(index: &'a RegionIndex) -> Self {
        Self::with_cache(index, ClassificationCache::new())
    }

    pub fn with_cache(index: &'a RegionIndex, cache: ClassificationCache) -> Self {
        Self {
            index,
            cache,
            stats: ClassificationStats::default(),
        }
    }

    pub fn classify(&mut self, point: GeoPoint) -> Option<RegionId> {
        classify_counted(point, self.index, &mut self.cache, &mut self.stats)
    }

    pub fn stats(&self) -> ClassificationStats {
        self.stats
    }

    pub fn cache(&self) -> &ClassificationCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pip::index::tests::test_index;

    #[test]
    fn test_second_lookup_hits_cache() {
        let index = test_index();
        let mut classifier = PointClassifier::new(&index);
        let point = GeoPoint::new(0.5, 1.5);

        let first = classifier.classify(point);
        let after_first = classifier.stats();
        let second = classifier.classify(point);
        let after_second = classifier.stats();

        assert_eq!(first, Some("01003".to_string()));
        assert_eq!(first, second);
        assert_eq!(after_first.cache_hits, 0);
        assert_eq!(after_second.cache_hits, 1);
        assert_eq!(after_second.polygon_tests, after_first.polygon_tests);
        assert_eq!(after_second.resolved, 2);
        assert_eq!(classifier.cache().len(), 1);
    }

    #[test]
    fn test_misses_are_cached_too() {
        let index = test_index();
        let mut cache = ClassificationCache::new();
        assert_eq!(classify(GeoPoint::new(50.0, 50.0), &index, &mut cache), None);
        assert_eq!(cache.get(&GeoPoint::new(50.0, 50.0)), Some(&None));
    }

    #[test]
    fn test_nearby_points_share_key() {
        let index = test_index();
        let mut classifier = PointClassifier::new(&index);
        classifier.classify(GeoPoint::new(0.5, 0.5));
        classifier.classify(GeoPoint::new(0.5000001, 0.4999999));
        assert_eq!(classifier.stats().cache_hits, 1);
    }

    #[test]
    fn test_cache_round_trips_through_json() {
        let index = test_index();
        let mut cache = ClassificationCache::new();
        classify(GeoPoint::new(0.5, 0.5), &index, &mut cache);
        classify(GeoPoint::new(50.0, 50.0), &index, &mut cache);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        cache.save(&path).unwrap();

        let loaded = ClassificationCache::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded.get(&GeoPoint::new(0.5, 0.5)),
            Some(&Some("01001".to_string()))
        );
    }

    #[test]
    fn test_distinct_regions() {
        let index = test_index();
        let points = [
            GeoPoint::new(0.5, 0.5),
            GeoPoint::new(0.6, 0.4),
            GeoPoint::new(0.5, 1.5),
            GeoPoint::new(50.0, 50.0),
            GeoPoint::new(0.2, 0.2),
        ];
        let regions = distinct_regions(&points, &index);
        assert_eq!(regions.len(), 2);
        assert!(regions.contains("01001"));
        assert!(regions.contains("01003"));
        assert!(distinct_regions(&[], &index).is_empty());
    }
}
