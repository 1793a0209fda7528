//! Exhaustive event dispatch
//!
//! The match in [`EventDispatcher::dispatch`] has no wildcard arm: adding a
//! [`TrackingEvent`] variant without a handler here does not compile.

use tracing::{info, warn};

use crate::model::{
    AssetOffline, GeofenceBreached, GeofenceExited, PositionUpdated, SpeedLimitExceeded,
    TrackingEvent,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct EventDispatcher;

impl EventDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Handle one event, returning a description of the action taken
    pub fn dispatch(&self, event: &TrackingEvent) -> String {
        match event {
            TrackingEvent::PositionUpdated(e) => self.position_updated(e),
            TrackingEvent::GeofenceBreached(e) => self.geofence_breached(e),
            TrackingEvent::GeofenceExited(e) => self.geofence_exited(e),
            TrackingEvent::AssetOffline(e) => self.asset_offline(e),
            TrackingEvent::SpeedLimitExceeded(e) => self.speed_limit_exceeded(e),
        }
    }

    fn position_updated(&self, e: &PositionUpdated) -> String {
        info!(
            asset_id = %e.asset_id,
            lat = e.position.latitude(),
            lon = e.position.longitude(),
            "Position updated"
        );
        format!("Position updated for {}", e.asset_id)
    }

    fn geofence_breached(&self, e: &GeofenceBreached) -> String {
        warn!(asset_id = %e.asset_id, geofence = %e.geofence_name, "ALERT: geofence breached");
        format!(
            "Geofence breach alert for {} in {}",
            e.asset_id, e.geofence_name
        )
    }

    fn geofence_exited(&self, e: &GeofenceExited) -> String {
        info!(asset_id = %e.asset_id, geofence = %e.geofence_name, "Geofence exited");
        format!("Geofence exit for {} from {}", e.asset_id, e.geofence_name)
    }

    fn asset_offline(&self, e: &AssetOffline) -> String {
        warn!(
            asset_id = %e.asset_id,
            last_seen = %e.last_seen_at,
            silence = %e.silence_duration,
            "Asset offline"
        );
        format!("Asset offline: {}", e.asset_id)
    }

    fn speed_limit_exceeded(&self, e: &SpeedLimitExceeded) -> String {
        warn!(
            asset_id = %e.asset_id,
            speed_kmh = e.current_speed_kmh,
            limit_kmh = e.limit_kmh,
            "Speed limit exceeded"
        );
        format!(
            "Speed limit exceeded by {}: {:.1} km/h (limit {:.1} km/h)",
            e.asset_id, e.current_speed_kmh, e.limit_kmh
        )
    }
}
