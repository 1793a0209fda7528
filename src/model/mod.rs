//! Position and event data model

pub mod event;
pub mod position;

pub use event::{
    AssetOffline, EventKind, GeofenceBreached, GeofenceExited, PositionUpdated,
    SpeedLimitExceeded, TrackingEvent,
};
pub use position::{Position, PositionBuilder, PositionSource};
