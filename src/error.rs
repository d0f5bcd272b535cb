//! Error types shared by the library modules.

use thiserror::Error;

/// Errors surfaced by boundary loading, record I/O and configuration.
///
/// Numerical outcomes (insufficient points, dispersion, points outside every
/// region) are not errors; they are modeled as `None` results.
#[derive(Debug, Error)]
pub enum LocalnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("boundary data error: {0}")]
    Boundary(String),

    #[error("column '{0}' not found in header")]
    MissingColumn(String),

    #[error("malformed point '{0}'")]
    MalformedPoint(String),
}

pub type Result<T> = std::result::Result<T, LocalnessError>;
