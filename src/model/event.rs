//! Tracking events
//!
//! The closed set of domain events derived from position reports. Each
//! variant struct serialises to the flat JSON object downstream consumers
//! expect, without a type tag; [`TrackingEvent`] is the sum type the
//! dispatcher matches on.

use serde::{Deserialize, Serialize, Serializer};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::position::Position;

/// An asset position was accepted and processed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdated {
    pub event_id: Uuid,
    pub asset_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
    pub position: Position,
    pub previous_position: Option<Position>,
}

impl PositionUpdated {
    pub fn create(current: Position, previous: Option<Position>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            asset_id: current.asset_id().to_string(),
            occurred_at: OffsetDateTime::now_utc(),
            position: current,
            previous_position: previous,
        }
    }
}

/// An asset entered a geofence
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceBreached {
    pub event_id: Uuid,
    pub asset_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
    pub geofence_id: Uuid,
    pub geofence_name: String,
    pub position: Position,
}

impl GeofenceBreached {
    pub fn create(geofence_id: Uuid, geofence_name: impl Into<String>, position: Position) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            asset_id: position.asset_id().to_string(),
            occurred_at: OffsetDateTime::now_utc(),
            geofence_id,
            geofence_name: geofence_name.into(),
            position,
        }
    }
}

/// An asset left a geofence
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceExited {
    pub event_id: Uuid,
    pub asset_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
    pub geofence_id: Uuid,
    pub geofence_name: String,
    pub position: Position,
}

impl GeofenceExited {
    pub fn create(geofence_id: Uuid, geofence_name: impl Into<String>, position: Position) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            asset_id: position.asset_id().to_string(),
            occurred_at: OffsetDateTime::now_utc(),
            geofence_id,
            geofence_name: geofence_name.into(),
            position,
        }
    }
}

/// An asset has not reported within the expected interval
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetOffline {
    pub event_id: Uuid,
    pub asset_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen_at: OffsetDateTime,
    /// Serialised as fractional seconds
    #[serde(serialize_with = "duration_seconds")]
    pub silence_duration: Duration,
}

impl AssetOffline {
    pub fn create(asset_id: impl Into<String>, last_seen_at: OffsetDateTime, now: OffsetDateTime) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            asset_id: asset_id.into(),
            occurred_at: now,
            last_seen_at,
            silence_duration: now - last_seen_at,
        }
    }
}

/// An asset reported a speed above its configured limit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedLimitExceeded {
    pub event_id: Uuid,
    pub asset_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
    pub current_speed_kmh: f64,
    pub limit_kmh: f64,
    pub position: Position,
}

impl SpeedLimitExceeded {
    pub fn create(limit_kmh: f64, position: Position) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            asset_id: position.asset_id().to_string(),
            occurred_at: OffsetDateTime::now_utc(),
            current_speed_kmh: position.speed(),
            limit_kmh,
            position,
        }
    }
}

fn duration_seconds<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_seconds_f64())
}

/// Discriminant of [`TrackingEvent`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    PositionUpdated,
    GeofenceBreached,
    GeofenceExited,
    AssetOffline,
    SpeedLimitExceeded,
}

/// Every event the engine can emit.
///
/// Consumers match on this exhaustively, so a new variant fails to compile
/// anywhere that does not handle it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TrackingEvent {
    PositionUpdated(PositionUpdated),
    GeofenceBreached(GeofenceBreached),
    GeofenceExited(GeofenceExited),
    AssetOffline(AssetOffline),
    SpeedLimitExceeded(SpeedLimitExceeded),
}

impl TrackingEvent {
    pub fn event_id(&self) -> Uuid {
        match self {
            Self::PositionUpdated(e) => e.event_id,
            Self::GeofenceBreached(e) => e.event_id,
            Self::GeofenceExited(e) => e.event_id,
            Self::AssetOffline(e) => e.event_id,
            Self::SpeedLimitExceeded(e) => e.event_id,
        }
    }

    pub fn asset_id(&self) -> &str {
        match self {
            Self::PositionUpdated(e) => &e.asset_id,
            Self::GeofenceBreached(e) => &e.asset_id,
            Self::GeofenceExited(e) => &e.asset_id,
            Self::AssetOffline(e) => &e.asset_id,
            Self::SpeedLimitExceeded(e) => &e.asset_id,
        }
    }

    pub fn occurred_at(&self) -> OffsetDateTime {
        match self {
            Self::PositionUpdated(e) => e.occurred_at,
            Self::GeofenceBreached(e) => e.occurred_at,
            Self::GeofenceExited(e) => e.occurred_at,
            Self::AssetOffline(e) => e.occurred_at,
            Self::SpeedLimitExceeded(e) => e.occurred_at,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::PositionUpdated(_) => EventKind::PositionUpdated,
            Self::GeofenceBreached(_) => EventKind::GeofenceBreached,
            Self::GeofenceExited(_) => EventKind::GeofenceExited,
            Self::AssetOffline(_) => EventKind::AssetOffline,
            Self::SpeedLimitExceeded(_) => EventKind::SpeedLimitExceeded,
        }
    }
}

impl From<PositionUpdated> for TrackingEvent {
    fn from(e: PositionUpdated) -> Self {
        Self::PositionUpdated(e)
    }
}

impl From<GeofenceBreached> for TrackingEvent {
    fn from(e: GeofenceBreached) -> Self {
        Self::GeofenceBreached(e)
    }
}

impl From<GeofenceExited> for TrackingEvent {
    fn from(e: GeofenceExited) -> Self {
        Self::GeofenceExited(e)
    }
}

impl From<AssetOffline> for TrackingEvent {
    fn from(e: AssetOffline) -> Self {
        Self::AssetOffline(e)
    }
}

impl From<SpeedLimitExceeded> for TrackingEvent {
    fn from(e: SpeedLimitExceeded) -> Self {
        Self::SpeedLimitExceeded(e)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn sample() -> Result<Position, String> {
        Position::basic("ASSET-001", 54.9783, -1.6178, datetime!(2024-03-01 12:00 UTC))
            .map_err(|e| e.to_string())
    }

    #[test]
    fn position_updated_json() -> Result<(), String> {
        let event = PositionUpdated::create(sample()?, None);
        let json = serde_json::to_value(&event).map_err(|e| e.to_string())?;

        assert_eq!("ASSET-001", json["assetId"]);
        assert!(json["previousPosition"].is_null());
        assert_eq!(54.9783, json["position"]["latitude"]);
        assert!(json["eventId"].is_string());
        assert!(json["occurredAt"].is_string());

        Ok(())
    }

    #[test]
    fn untagged_event_serialises_flat() -> Result<(), String> {
        let fence = Uuid::new_v4();
        let event: TrackingEvent = GeofenceExited::create(fence, "Safe Zone", sample()?).into();
        let json = serde_json::to_value(&event).map_err(|e| e.to_string())?;

        assert_eq!("Safe Zone", json["geofenceName"]);
        assert_eq!(fence.to_string(), json["geofenceId"]);
        assert_eq!(EventKind::GeofenceExited, event.kind());
        assert_eq!("ASSET-001", event.asset_id());

        Ok(())
    }

    #[test]
    fn offline_silence_in_seconds() -> Result<(), String> {
        let event = AssetOffline::create(
            "ASSET-001",
            datetime!(2024-03-01 11:00 UTC),
            datetime!(2024-03-01 12:00 UTC),
        );
        assert_eq!(Duration::hours(1), event.silence_duration);

        let json = serde_json::to_value(&event).map_err(|e| e.to_string())?;
        assert_eq!(3600.0, json["silenceDuration"]);
        assert_eq!("2024-03-01T11:00:00Z", json["lastSeenAt"]);

        Ok(())
    }

    #[test]
    fn speed_event_copies_position_speed() -> Result<(), String> {
        let p = Position::builder("CAR", 54.0, -1.0, datetime!(2024-03-01 12:00 UTC))
            .speed(131.0)
            .build()
            .map_err(|e| e.to_string())?;
        let event = SpeedLimitExceeded::create(110.0, p);

        assert_eq!(131.0, event.current_speed_kmh);
        assert_eq!(110.0, event.limit_kmh);
        assert_eq!("CAR", event.asset_id);

        Ok(())
    }
}
