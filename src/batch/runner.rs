//! Per-entity orchestration of median estimation and classification.

use hashbrown::HashSet;
use rayon::prelude::*;
use tracing::{info, warn};

use super::group::{chunked, try_group_contiguous};
use crate::config::Config;
use crate::error::{LocalnessError, Result};
use crate::median::{GeoMedianEstimator, MedianOutcome, Rejection};
use crate::models::{
    EntityLocation, EntityMedian, EntityRegion, EntityRegionCount, GeoPoint, PointInput,
    PointRecord,
};
use crate::pip::{distinct_regions, ClassificationStats, PointClassifier, RegionIndex};

/// Which entities produce an output row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitMode {
    /// Every entity, with empty values where nothing was resolved.
    All,
    /// Only entities with a resolved value.
    ResolvedOnly,
}

impl EmitMode {
    pub fn from_emit_all(emit_all: bool) -> Self {
        if emit_all {
            EmitMode::All
        } else {
            EmitMode::ResolvedOnly
        }
    }

    fn keeps(&self, resolved: bool) -> bool {
        resolved || *self == EmitMode::All
    }
}

/// Counts gathered over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub entities: usize,
    pub resolved: usize,
    pub insufficient: usize,
    pub dispersed: usize,
    pub non_converged: usize,
    /// Entities left out because an earlier run already produced them.
    pub skipped: usize,
    /// Input rows dropped for unparsable coordinates.
    pub malformed: usize,
    pub classification: ClassificationStats,
}

impl BatchSummary {
    fn record_median(&mut self, outcome: &MedianOutcome) {
        if !outcome.converged {
            self.non_converged += 1;
        }
        match outcome.rejection {
            None => self.resolved += 1,
            Some(Rejection::InsufficientPoints) => self.insufficient += 1,
            Some(Rejection::Dispersed) => self.dispersed += 1,
        }
    }

    pub fn log(&self) {
        info!(
            "{} entities: {} resolved, {} insufficient, {} dispersed, {} non-converged, {} skipped, {} malformed rows",
            self.entities,
            self.resolved,
            self.insufficient,
            self.dispersed,
            self.non_converged,
            self.skipped,
            self.malformed
        );
        if self.classification.total > 0 {
            info!(
                "{} lookups: {} in a region, {} cache hits, {} polygon tests",
                self.classification.total,
                self.classification.resolved,
                self.classification.cache_hits,
                self.classification.polygon_tests
            );
        }
    }
}

/// Drives estimation and classification over a key-sorted record stream.
///
/// Entities are estimated in parallel chunks; results are emitted in input order.
pub struct BatchRunner {
    estimator: GeoMedianEstimator,
    emit: EmitMode,
    skip: HashSet<String>,
    chunk_size: usize,
    progress_every: usize,
}

impl BatchRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            estimator: GeoMedianEstimator::new(config.median.clone()),
            emit: EmitMode::from_emit_all(config.output.emit_all_entities),
            skip: HashSet::new(),
            chunk_size: config.output.chunk_size,
            progress_every: config.output.progress_every,
        }
    }

    /// Leave out entities already computed by an earlier run.
    pub fn with_skip(mut self, skip: HashSet<String>) -> Self {
        self.skip = skip;
        self
    }

    /// Compute one median per entity.
    pub fn run_medians<I, F>(&self, records: I, mut emit: F) -> Result<BatchSummary>
    where
        I: IntoIterator<Item = Result<PointRecord>>,
        F: FnMut(EntityMedian) -> Result<()>,
    {
        let mut summary = BatchSummary::default();

        self.process_groups(
            records,
            &mut summary,
            |points| self.estimator.estimate(points),
            |summary, entity_id, outcome| {
                summary.record_median(&outcome);
                if !self.emit.keeps(outcome.median.is_some()) {
                    return Ok(());
                }
                emit(EntityMedian {
                    entity_id,
                    median: outcome.median,
                })
            },
        )?;

        summary.log();
        Ok(summary)
    }

    /// Classify each entity's point into a region.
    ///
    /// Accepts [`PointInput`] rows or anything convertible to them, such as
    /// the [`EntityMedian`] rows of an earlier run.
    pub fn run_classification<I, R, F>(
        &self,
        classifier: &mut PointClassifier<'_>,
        inputs: I,
        mut emit: F,
    ) -> Result<BatchSummary>
    where
        I: IntoIterator<Item = Result<R>>,
        R: Into<PointInput>,
        F: FnMut(EntityRegion) -> Result<()>,
    {
        let mut summary = BatchSummary::default();

        for input in inputs {
            let row: PointInput = match input {
                Ok(row) => row.into(),
                Err(LocalnessError::MalformedPoint(raw)) => {
                    warn!("Skipping malformed record: {}", raw);
                    summary.malformed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if self.skip.contains(&row.entity_id) {
                summary.skipped += 1;
                continue;
            }

            summary.entities += 1;
            self.report_progress(&summary);

            let region = row.point.and_then(|p| classifier.classify(p));
            if region.is_some() {
                summary.resolved += 1;
            }
            if self.emit.keeps(region.is_some()) {
                emit(EntityRegion {
                    entity_id: row.entity_id,
                    passthrough: row.passthrough,
                    region,
                })?;
            }
        }

        summary.classification = classifier.stats();
        summary.log();
        Ok(summary)
    }

    /// Compute medians and classify them in one pass.
    ///
    /// In resolved-only mode, entities without a median are dropped; a median
    /// outside every region is still written.
    pub fn run_pipeline<I, F>(
        &self,
        classifier: &mut PointClassifier<'_>,
        records: I,
        mut emit: F,
    ) -> Result<BatchSummary>
    where
        I: IntoIterator<Item = Result<PointRecord>>,
        F: FnMut(EntityLocation) -> Result<()>,
    {
        let mut summary = BatchSummary::default();

        self.process_groups(
            records,
            &mut summary,
            |points| self.estimator.estimate(points),
            |summary, entity_id, outcome| {
                summary.record_median(&outcome);
                if !self.emit.keeps(outcome.median.is_some()) {
                    return Ok(());
                }
                let region = outcome.median.and_then(|p| classifier.classify(p));
                emit(EntityLocation {
                    entity_id,
                    median: outcome.median,
                    region,
                })
            },
        )?;

        summary.classification = classifier.stats();
        summary.log();
        Ok(summary)
    }

    /// Count the distinct regions each entity's points fall in.
    pub fn run_region_counts<I, F>(
        &self,
        index: &RegionIndex,
        records: I,
        mut emit: F,
    ) -> Result<BatchSummary>
    where
        I: IntoIterator<Item = Result<PointRecord>>,
        F: FnMut(EntityRegionCount) -> Result<()>,
    {
        let mut summary = BatchSummary::default();

        self.process_groups(
            records,
            &mut summary,
            |points| distinct_regions(points, index).len(),
            |summary, entity_id, regions| {
                if regions > 0 {
                    summary.resolved += 1;
                }
                if !self.emit.keeps(regions > 0) {
                    return Ok(());
                }
                emit(EntityRegionCount { entity_id, regions })
            },
        )?;

        summary.log();
        Ok(summary)
    }

    /// Group records by entity, run `work` on each group in parallel chunks,
    /// and hand results to `on_result` in input order.
    ///
    /// Malformed rows are skipped; any other read error stops the run.
    fn process_groups<I, T, W, F>(
        &self,
        records: I,
        summary: &mut BatchSummary,
        work: W,
        mut on_result: F,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Result<PointRecord>>,
        T: Send,
        W: Fn(&[GeoPoint]) -> T + Sync,
        F: FnMut(&mut BatchSummary, String, T) -> Result<()>,
    {
        let mut fatal = None;
        let mut malformed = 0usize;
        let mut skipped = 0usize;

        let valid = records.into_iter().filter_map(|result| match result {
            Ok(record) => Some(Ok((record.entity_id, record.point))),
            Err(LocalnessError::MalformedPoint(raw)) => {
                warn!("Skipping malformed record: {}", raw);
                malformed += 1;
                None
            }
            Err(e) => Some(Err(e)),
        });

        // A read error drops the entity it interrupted; its point set is incomplete.
        let groups = try_group_contiguous(valid)
            .map_while(|group| match group {
                Ok(group) => Some(group),
                Err(e) => {
                    fatal = Some(e);
                    None
                }
            })
            .filter(|(entity_id, _)| {
                let skip = self.skip.contains(entity_id);
                if skip {
                    skipped += 1;
                }
                !skip
            });

        for chunk in chunked(groups, self.chunk_size) {
            let results: Vec<(String, T)> = chunk
                .into_par_iter()
                .map(|(entity_id, points)| {
                    let result = work(&points);
                    (entity_id, result)
                })
                .collect();

            for (entity_id, result) in results {
                summary.entities += 1;
                self.report_progress(summary);
                on_result(&mut *summary, entity_id, result)?;
            }
        }

        summary.malformed += malformed;
        summary.skipped += skipped;
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn report_progress(&self, summary: &BatchSummary) {
        if self.progress_every > 0 && summary.entities % self.progress_every == 0 {
            info!("Processed {} entities.", summary.entities);
        }
    }
}
