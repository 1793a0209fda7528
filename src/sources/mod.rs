//! Position replay sources
//!
//! Sources turn recorded data into raw position messages that are fed to
//! the pipeline exactly like live broker traffic. Nothing here validates
//! coordinates; that is the pipeline's job.

use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::pipeline::RawPositionMessage;

/// Position source
pub trait PositionsSource {
    /// Fetch the raw positions, in recorded order
    fn fetch(&mut self) -> Result<Vec<RawPositionMessage>, SourceError>;
}

/// Column names used by tabular sources
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldsConfiguration {
    pub asset_id: String,
    pub latitude: String,
    pub longitude: String,
    pub altitude: String,
    pub speed: String,
    pub heading: String,
    pub timestamp: String,
}

impl Default for FieldsConfiguration {
    fn default() -> Self {
        Self {
            asset_id: "asset_id".to_string(),
            latitude: "latitude".to_string(),
            longitude: "longitude".to_string(),
            altitude: "altitude".to_string(),
            speed: "speed".to_string(),
            heading: "heading".to_string(),
            timestamp: "timestamp".to_string(),
        }
    }
}

#[cfg(feature = "csv")]
mod csv_file;
mod gpx_file;

#[cfg(feature = "csv")]
pub use csv_file::CsvSource;
pub use gpx_file::GpxSource;
