//! Geodesic distance on the WGS-84 ellipsoid.
//!
//! Distances are computed with Vincenty's inverse formula. Vincenty does not
//! converge for some nearly antipodal pairs; those fall back to a great-circle
//! (haversine) distance, which is less accurate over long distances but always
//! defined.

use geo::{Distance, Haversine};
use thiserror::Error;
use tracing::trace;

use crate::models::GeoPoint;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);

const MAX_VINCENTY_ITERATIONS: usize = 200;
const VINCENTY_TOLERANCE: f64 = 1e-12;

/// Vincenty's inverse solution did not settle on a longitude difference.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("Vincenty inverse failed to converge between {from} and {to}")]
pub struct FailedToConverge {
    pub from: GeoPoint,
    pub to: GeoPoint,
}

/// Ellipsoidal distance in meters, or an error for pairs where the iteration diverges.
pub fn vincenty_meters(from: GeoPoint, to: GeoPoint) -> Result<f64, FailedToConverge> {
    if from == to {
        return Ok(0.0);
    }

    let l = (to.lon - from.lon).to_radians();
    let u1 = ((1.0 - WGS84_F) * from.lat.to_radians().tan()).atan();
    let u2 = ((1.0 - WGS84_F) * to.lat.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    for _ in 0..MAX_VINCENTY_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            // coincident points
            return Ok(0.0);
        }
        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // equatorial line: cos_sq_alpha = 0
        let cos_2sigma_m = if cos_sq_alpha != 0.0 {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        } else {
            0.0
        };
        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));

        let lambda_prev = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))));

        if !lambda.is_finite() {
            break;
        }

        if (lambda - lambda_prev).abs() < VINCENTY_TOLERANCE {
            let u_sq = cos_sq_alpha * (WGS84_A.powi(2) - WGS84_B.powi(2)) / WGS84_B.powi(2);
            let big_a =
                1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
            let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
            let delta_sigma = big_b
                * sin_sigma
                * (cos_2sigma_m
                    + big_b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))
                            - big_b / 6.0
                                * cos_2sigma_m
                                * (-3.0 + 4.0 * sin_sigma.powi(2))
                                * (-3.0 + 4.0 * cos_2sigma_m.powi(2))));

            return Ok(WGS84_B * big_a * (sigma - delta_sigma));
        }
    }

    Err(FailedToConverge { from, to })
}

/// Great-circle distance in meters on the mean-radius sphere.
pub fn great_circle_meters(from: GeoPoint, to: GeoPoint) -> f64 {
    Haversine.distance(geo::Point::from(from), geo::Point::from(to))
}

/// Geodesic distance in meters. Never fails.
pub fn distance_meters(from: GeoPoint, to: GeoPoint) -> f64 {
    match vincenty_meters(from, to) {
        Ok(meters) => meters,
        Err(e) => {
            trace!("{}, using great-circle distance", e);
            great_circle_meters(from, to)
        }
    }
}

/// Geodesic distance in kilometers. Never fails.
pub fn distance(from: GeoPoint, to: GeoPoint) -> f64 {
    distance_meters(from, to) / 1000.0
}
