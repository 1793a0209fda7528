//! Ingestion pipeline
//!
//! One raw position message in, zero or more tracking events out:
//!
//! 1. deserialise the payload (failures go back to the caller)
//! 2. drop out-of-range coordinates and null island, with a warning
//! 3. build the [`Position`], stamping `now` when the report has no time
//! 4. run the geofence check and turn entries/exits into alerts
//! 5. always emit one [`PositionUpdated`]
//! 6. publish every event, and dispatch it when a dispatcher is attached
//!
//! `PositionUpdated::previous_position` is never filled in here; the
//! pipeline keeps no per-asset position history.

pub mod dispatch;
pub mod envelope;
pub mod partition;
pub mod publisher;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::error::{ProcessingError, ValidationError};
use crate::geofence::{GeofenceEngine, GeofenceTransition};
use crate::model::{GeofenceBreached, GeofenceExited, Position, PositionUpdated, TrackingEvent};
use crate::monitor::{check_speed, OfflineMonitor};
use crate::validation::{is_null_island, is_valid_coordinate};
use dispatch::EventDispatcher;
use publisher::{EventPublisher, EventSink};

/// Inbound message as published by position ingestion
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPositionMessage {
    pub asset_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub heading: f64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

impl RawPositionMessage {
    pub fn basic(asset_id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            asset_id: asset_id.into(),
            latitude,
            longitude,
            altitude: 0.0,
            speed: 0.0,
            heading: 0.0,
            timestamp: None,
        }
    }
}

/// Why a report was dropped without producing events
#[derive(Clone, Debug, PartialEq)]
pub enum DiscardReason {
    InvalidCoordinates,
    NullIsland,
    Invalid(ValidationError),
}

#[derive(Clone, Debug, PartialEq)]
pub enum IngestOutcome {
    /// Events in publish order: geofence alerts, the position update, then
    /// any speed alert
    Processed(Vec<TrackingEvent>),
    Discarded(DiscardReason),
}

impl IngestOutcome {
    pub fn events(&self) -> &[TrackingEvent] {
        match self {
            IngestOutcome::Processed(events) => events,
            IngestOutcome::Discarded(_) => &[],
        }
    }
}

/// Decides whether a geofence transition is raised as an alert
pub type AlertFilter = Arc<dyn Fn(&GeofenceTransition) -> bool + Send + Sync>;

pub struct PositionPipeline<S: EventSink> {
    engine: Arc<GeofenceEngine>,
    publisher: EventPublisher<S>,
    dispatcher: Option<EventDispatcher>,
    alert_filter: Option<AlertFilter>,
    monitor: Option<Arc<OfflineMonitor>>,
    speed_limit_kmh: Option<f64>,
}

impl<S: EventSink> PositionPipeline<S> {
    pub fn new(engine: Arc<GeofenceEngine>, publisher: EventPublisher<S>) -> Self {
        Self {
            engine,
            publisher,
            dispatcher: None,
            alert_filter: None,
            monitor: None,
            speed_limit_kmh: None,
        }
    }

    /// Also hand every event to the dispatcher
    pub fn dispatcher(mut self, dispatcher: EventDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Only raise the transitions the filter accepts.
    ///
    /// Fence state is tracked either way.
    pub fn alert_filter(mut self, filter: AlertFilter) -> Self {
        self.alert_filter = Some(filter);
        self
    }

    /// Record accepted positions for silence sweeps
    pub fn offline_monitor(mut self, monitor: Arc<OfflineMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Emit speed alerts above this speed
    pub fn speed_limit(mut self, limit_kmh: f64) -> Self {
        self.speed_limit_kmh = Some(limit_kmh);
        self
    }

    pub fn engine(&self) -> &GeofenceEngine {
        &self.engine
    }

    pub fn publisher(&self) -> &EventPublisher<S> {
        &self.publisher
    }

    /// Deserialise and process one payload.
    ///
    /// A payload that is not a position message is an error for the
    /// transport to retry or dead-letter; bad coordinates are not.
    pub fn consume(&self, payload: &str) -> Result<IngestOutcome, ProcessingError> {
        let raw: RawPositionMessage = serde_json::from_str(payload).map_err(|e| {
            warn!(error = %e, payload, "Failed to process position event");
            ProcessingError::from(e)
        })?;

        Ok(self.process(raw))
    }

    pub fn process(&self, raw: RawPositionMessage) -> IngestOutcome {
        if !is_valid_coordinate(raw.latitude, raw.longitude) {
            warn!(
                asset_id = %raw.asset_id,
                lat = raw.latitude,
                lon = raw.longitude,
                "Invalid coordinates, discarding"
            );
            return IngestOutcome::Discarded(DiscardReason::InvalidCoordinates);
        }

        if is_null_island(raw.latitude, raw.longitude) {
            warn!(asset_id = %raw.asset_id, "Null Island position, discarding");
            return IngestOutcome::Discarded(DiscardReason::NullIsland);
        }

        let timestamp = raw.timestamp.unwrap_or_else(OffsetDateTime::now_utc);
        let position = match Position::builder(raw.asset_id, raw.latitude, raw.longitude, timestamp)
            .altitude(raw.altitude)
            .speed(raw.speed)
            .heading(raw.heading)
            .build()
        {
            Ok(position) => position,
            Err(e) => {
                warn!(error = %e, "Invalid position report, discarding");
                return IngestOutcome::Discarded(DiscardReason::Invalid(e));
            }
        };

        debug!(
            asset_id = position.asset_id(),
            lat = position.latitude(),
            lon = position.longitude(),
            "Processing position"
        );

        let mut events: Vec<TrackingEvent> = vec![];

        for transition in self.engine.check_position(&position) {
            if let Some(filter) = &self.alert_filter {
                if !filter(&transition) {
                    debug!(
                        asset_id = %transition.asset_id,
                        geofence = %transition.geofence_name,
                        "Transition filtered out"
                    );
                    continue;
                }
            }

            if transition.is_entry() {
                events.push(
                    GeofenceBreached::create(
                        transition.geofence_id,
                        transition.geofence_name,
                        position.clone(),
                    )
                    .into(),
                );
            } else if transition.is_exit() {
                events.push(
                    GeofenceExited::create(
                        transition.geofence_id,
                        transition.geofence_name,
                        position.clone(),
                    )
                    .into(),
                );
            }
        }

        if let Some(monitor) = &self.monitor {
            monitor.record(&position);
        }

        let speeding = self
            .speed_limit_kmh
            .and_then(|limit| check_speed(&position, limit));

        events.push(PositionUpdated::create(position, None).into());

        if let Some(alert) = speeding {
            events.push(alert.into());
        }

        self.emit(&events);

        IngestOutcome::Processed(events)
    }

    /// Sweep the offline monitor, publishing what it finds.
    ///
    /// Empty when no monitor is attached.
    pub fn sweep_offline(&self, now: OffsetDateTime, threshold: Duration) -> Vec<TrackingEvent> {
        let Some(monitor) = &self.monitor else {
            return vec![];
        };

        let events: Vec<TrackingEvent> = monitor
            .sweep(now, threshold)
            .into_iter()
            .map(TrackingEvent::from)
            .collect();
        self.emit(&events);

        events
    }

    fn emit(&self, events: &[TrackingEvent]) {
        for event in events {
            self.publisher.publish(event);
            if let Some(dispatcher) = &self.dispatcher {
                dispatcher.dispatch(event);
            }
        }
    }
}
