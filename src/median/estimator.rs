//! Weiszfeld geometric median over geodesic distance.

use tracing::{debug, warn};

use crate::config::MedianConfig;
use crate::geodesic::{distance, distance_meters};
use crate::models::{GeoPoint, COORD_DECIMALS};

/// `Some(point)` for a reliable median, `None` otherwise.
pub type MedianResult = Option<GeoPoint>;

/// Why no median was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Fewer than `min_points` inputs.
    InsufficientPoints,
    /// Median absolute deviation above `mad_limit_km`.
    Dispersed,
}

/// Estimation result with the diagnostics the batch summary accumulates.
#[derive(Debug, Clone, PartialEq)]
pub struct MedianOutcome {
    /// Rounded median, absent when rejected.
    pub median: MedianResult,
    /// Final unrounded candidate, kept even when the set was too dispersed.
    pub candidate: Option<GeoPoint>,
    pub iterations: usize,
    pub converged: bool,
    pub mad_km: Option<f64>,
    pub rejection: Option<Rejection>,
}

impl MedianOutcome {
    fn insufficient() -> Self {
        Self {
            median: None,
            candidate: None,
            iterations: 0,
            converged: true,
            mad_km: None,
            rejection: Some(Rejection::InsufficientPoints),
        }
    }
}

/// Geometric median estimator.
///
/// Starts from the arithmetic centroid and repeatedly moves to the
/// inverse-distance weighted average of the inputs until the step falls below
/// `convergence_meters`. The result is then checked against the median absolute
/// deviation limit; a point set spread over a wide area has no single
/// representative location.
#[derive(Debug, Clone, Default)]
pub struct GeoMedianEstimator {
    config: MedianConfig,
}

impl GeoMedianEstimator {
    pub fn new(config: MedianConfig) -> Self {
        Self { config }
    }

    pub fn estimate(&self, points: &[GeoPoint]) -> MedianOutcome {
        if points.len() < self.config.min_points || points.is_empty() {
            return MedianOutcome::insufficient();
        }

        let (candidate, iterations, converged) = if self.config.snap_to_input_points {
            (medoid(points), 0, true)
        } else {
            self.weiszfeld(points)
        };

        // MAD is checked against the final candidate, after any snapping.
        let mad_km = median_absolute_deviation(points, candidate);
        let rejection = (mad_km > self.config.mad_limit_km).then_some(Rejection::Dispersed);
        let median = match rejection {
            None => Some(candidate.rounded(COORD_DECIMALS)),
            Some(_) => {
                debug!(
                    "Median {} rejected: MAD {:.2} km over {} km limit",
                    candidate, mad_km, self.config.mad_limit_km
                );
                None
            }
        };

        MedianOutcome {
            median,
            candidate: Some(candidate),
            iterations,
            converged,
            mad_km: Some(mad_km),
            rejection,
        }
    }

    /// Returns the final candidate, the number of steps taken and whether it converged.
    fn weiszfeld(&self, points: &[GeoPoint]) -> (GeoPoint, usize, bool) {
        if points.windows(2).all(|w| w[0] == w[1]) {
            return (points[0], 0, true);
        }

        let mut candidate = centroid(points);

        let mut last_step = f64::INFINITY;
        for iteration in 1..=self.config.max_iterations {
            let Some(next) = weiszfeld_step(candidate, points) else {
                // every input coincides with the candidate
                return (candidate, iteration, true);
            };
            last_step = distance_meters(candidate, next);
            candidate = next;
            if last_step < self.config.convergence_meters {
                return (candidate, iteration, true);
            }
        }

        warn!(
            "Median failed to converge after {} iterations; last step was {:.3} meters",
            self.config.max_iterations, last_step
        );
        (candidate, self.config.max_iterations, false)
    }
}

/// Median of `points` with explicit solver limits and default rejection policy.
pub fn compute(points: &[GeoPoint], max_iterations: usize, convergence_meters: f64) -> MedianResult {
    GeoMedianEstimator::new(MedianConfig {
        max_iterations,
        convergence_meters,
        ..MedianConfig::default()
    })
    .estimate(points)
    .median
}

/// Planar mean of latitudes and longitudes; only used as a starting point.
pub fn centroid(points: &[GeoPoint]) -> GeoPoint {
    let n = points.len() as f64;
    let (lat, lon) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lon), p| (lat + p.lat, lon + p.lon));
    GeoPoint::new(lat / n, lon / n)
}

/// Sum of geodesic distances (km) from `candidate` to every point.
pub fn objective(candidate: GeoPoint, points: &[GeoPoint]) -> f64 {
    points.iter().map(|p| distance(candidate, *p)).sum()
}

/// Input point with the smallest objective; the first one wins ties.
pub fn medoid(points: &[GeoPoint]) -> GeoPoint {
    let mut best = points[0];
    let mut lowest = f64::INFINITY;
    for p in points {
        let total = objective(*p, points);
        if total < lowest {
            lowest = total;
            best = *p;
        }
    }
    best
}

/// One inverse-distance weighted step. Points at zero distance carry no weight.
fn weiszfeld_step(candidate: GeoPoint, points: &[GeoPoint]) -> Option<GeoPoint> {
    let mut weight_sum = 0.0;
    let mut lat_sum = 0.0;
    let mut lon_sum = 0.0;

    for p in points {
        let d = distance(candidate, *p);
        if d == 0.0 {
            continue;
        }
        let w = 1.0 / d;
        weight_sum += w;
        lat_sum += p.lat * w;
        lon_sum += p.lon * w;
    }

    if weight_sum == 0.0 {
        return None;
    }
    Some(GeoPoint::new(lat_sum / weight_sum, lon_sum / weight_sum))
}

/// Median of the geodesic distances (km) from `center` to every point.
pub fn median_absolute_deviation(points: &[GeoPoint], center: GeoPoint) -> f64 {
    let mut distances: Vec<f64> = points.iter().map(|p| distance(center, *p)).collect();
    median_of(&mut distances).unwrap_or(0.0)
}

/// Middle value, or mean of the two middle values for an even count.
fn median_of(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
