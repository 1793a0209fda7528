//! Error types

use thiserror::Error;

/// A position report that cannot become a [`crate::Position`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("assetId must not be blank")]
    MissingAssetId,
    #[error("Latitude must be between -90 and 90, got: {0}")]
    Latitude(f64),
    #[error("Longitude must be between -180 and 180, got: {0}")]
    Longitude(f64),
    #[error("Heading must be between 0 and 360, got: {0}")]
    Heading(f64),
}

/// Geometry rejected at construction or registration time
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("A polygon requires at least 3 coordinates, got: {0}")]
    TooFewCoordinates(usize),
    #[error("Circle radius must be a positive number of metres, got: {0}")]
    InvalidRadius(f64),
}

/// Failure while ingesting a raw payload.
///
/// Unlike the discard paths this is always handed back to the caller, so the
/// transport can redeliver or dead-letter the message.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Malformed position payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Failure reading a replay source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed on read the source: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "csv")]
    #[error("Failed on read some row: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed on parse the GPX: {0}")]
    Gpx(#[from] gpx::errors::GpxError),
    #[error("{0} header not found")]
    MissingHeader(String),
    #[error("Invalid {field} in row {row}: {reason}")]
    Field {
        row: usize,
        field: &'static str,
        reason: String,
    },
}

/// Failure loading the YAML configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed on read the config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed on parse the config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Geofence `{0}` needs exactly one of polygon or circle")]
    Shape(String),
    #[error("Geofence `{name}` is invalid: {source}")]
    Geometry {
        name: String,
        #[source]
        source: GeometryError,
    },
}
