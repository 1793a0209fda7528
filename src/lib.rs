//! geotrack - geofence event processing for live asset positions

pub mod config;
pub mod error;
pub mod geofence;
pub mod model;
pub mod monitor;
pub mod pipeline;
pub mod sources;
pub mod spatial;
pub mod validation;

pub use config::{Config, FenceDefinition, FenceType, PipelineSettings};
pub use error::{ConfigError, GeometryError, ProcessingError, SourceError, ValidationError};
pub use geofence::{Geofence, GeofenceEngine, GeofenceState, GeofenceTransition};
pub use model::{Position, PositionSource, TrackingEvent};
pub use monitor::OfflineMonitor;
pub use pipeline::publisher::{EventPublisher, EventSink, Topic};
pub use pipeline::{IngestOutcome, PositionPipeline, RawPositionMessage};
pub use sources::{FieldsConfiguration, PositionsSource};
