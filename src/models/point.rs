//! Coordinate value types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LocalnessError;

/// Decimal places kept on emitted coordinates and cache keys.
pub const COORD_DECIMALS: u32 = 6;

/// Geographic point (lat/lon) in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Round both coordinates to `decimals` places.
    pub fn rounded(&self, decimals: u32) -> Self {
        Self {
            lat: round_to(self.lat, decimals),
            lon: round_to(self.lon, decimals),
        }
    }

    /// Canonical string key for memoized lookups.
    ///
    /// Two points that agree to six decimals share a key; `-0.0` and `0.0` collapse.
    pub fn cache_key(&self) -> String {
        let p = self.rounded(COORD_DECIMALS);
        format!("{:.6},{:.6}", p.lat + 0.0, p.lon + 0.0)
    }

    /// Whether both coordinates are finite and within WGS-84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    // adding 0.0 turns a rounded -0.0 into 0.0
    (value * scale).round() / scale + 0.0
}

/// Writes the `(lat, lon)` form used in the median CSV files.
impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// Parses `(lat, lon)`, with or without the parentheses.
impl FromStr for GeoPoint {
    type Err = LocalnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || LocalnessError::MalformedPoint(s.to_string());

        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(trimmed);

        let (lat, lon) = inner.split_once(',').ok_or_else(malformed)?;
        let lat: f64 = lat.trim().parse().map_err(|_| malformed())?;
        let lon: f64 = lon.trim().parse().map_err(|_| malformed())?;

        let point = GeoPoint::new(lat, lon);
        if !point.is_valid() {
            return Err(malformed());
        }
        Ok(point)
    }
}

impl From<GeoPoint> for geo::Point<f64> {
    fn from(p: GeoPoint) -> Self {
        geo::Point::new(p.lon, p.lat)
    }
}

impl From<geo::Point<f64>> for GeoPoint {
    fn from(p: geo::Point<f64>) -> Self {
        GeoPoint::new(p.y(), p.x())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tuple_form() {
        let p: GeoPoint = "(44.977753, -93.265011)".parse().unwrap();
        assert_eq!(p, GeoPoint::new(44.977753, -93.265011));
    }

    #[test]
    fn test_parse_bare_pair() {
        let p: GeoPoint = " 10.5,-3 ".parse().unwrap();
        assert_eq!(p, GeoPoint::new(10.5, -3.0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<GeoPoint>().is_err());
        assert!("(abc, 1.0)".parse::<GeoPoint>().is_err());
        assert!("(91.0, 0.0)".parse::<GeoPoint>().is_err());
        assert!("(1.0 2.0)".parse::<GeoPoint>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let p = GeoPoint::new(40.642, -73.792);
        let text = p.to_string();
        assert_eq!(text, "(40.642, -73.792)");
        assert_eq!(text.parse::<GeoPoint>().unwrap(), p);
    }

    #[test]
    fn test_rounding_and_key() {
        let p = GeoPoint::new(1.23456789, -0.0000001);
        assert_eq!(p.rounded(6), GeoPoint::new(1.234568, 0.0));
        assert_eq!(p.cache_key(), "1.234568,0.000000");
        assert_eq!(
            GeoPoint::new(1.2345681, 2.0).cache_key(),
            GeoPoint::new(1.2345679, 2.0).cache_key()
        );
    }

    #[test]
    fn test_geo_point_axis_order() {
        let p: geo::Point<f64> = GeoPoint::new(45.0, -93.0).into();
        assert_eq!(p.x(), -93.0);
        assert_eq!(p.y(), 45.0);
    }
}
