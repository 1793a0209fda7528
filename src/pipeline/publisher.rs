//! Outbound event publishing
//!
//! Events are serialised to JSON and handed to an [`EventSink`], the
//! transport collaborator (broker producer, socket, file...). Sinks are
//! fire-and-forget: nothing comes back to the engine.

use std::fmt;
use std::io::Write;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::envelope::Envelope;
use crate::model::TrackingEvent;

/// Outbound stream an event is routed to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every accepted position
    ProcessedPosition,
    /// Geofence entries and exits
    GeofenceAlert,
    /// Silence and speed alerts
    AssetAlert,
}

impl Topic {
    pub fn name(&self) -> &'static str {
        match self {
            Topic::ProcessedPosition => "position.processed",
            Topic::GeofenceAlert => "alert.geofence",
            Topic::AssetAlert => "alert.asset",
        }
    }

    pub fn for_event(event: &TrackingEvent) -> Self {
        match event {
            TrackingEvent::PositionUpdated(_) => Topic::ProcessedPosition,
            TrackingEvent::GeofenceBreached(_) | TrackingEvent::GeofenceExited(_) => {
                Topic::GeofenceAlert
            }
            TrackingEvent::AssetOffline(_) | TrackingEvent::SpeedLimitExceeded(_) => {
                Topic::AssetAlert
            }
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Message transport
pub trait EventSink: Send + Sync {
    /// Hand over one serialised message
    fn send(&self, topic: Topic, payload: String);
}

/// Serialises events and routes them to the right topic of a sink
pub struct EventPublisher<S: EventSink> {
    sink: S,
}

impl<S: EventSink> EventPublisher<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn publish(&self, event: &TrackingEvent) {
        let topic = Topic::for_event(event);

        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!(event_id = %event.event_id(), error = %e, "Failed to serialise event");
                return;
            }
        };

        self.sink.send(topic, json);

        match event {
            TrackingEvent::PositionUpdated(e) => {
                debug!(asset_id = %e.asset_id, "Published processed position")
            }
            TrackingEvent::GeofenceBreached(e) => warn!(
                asset_id = %e.asset_id,
                geofence = %e.geofence_name,
                "Published geofence BREACH alert"
            ),
            TrackingEvent::GeofenceExited(e) => info!(
                asset_id = %e.asset_id,
                geofence = %e.geofence_name,
                "Published geofence EXIT"
            ),
            TrackingEvent::AssetOffline(e) => {
                warn!(asset_id = %e.asset_id, "Published asset offline alert")
            }
            TrackingEvent::SpeedLimitExceeded(e) => {
                warn!(asset_id = %e.asset_id, "Published speed limit alert")
            }
        }
    }
}

/// Keeps every message in memory, in send order
#[derive(Default)]
pub struct MemorySink {
    messages: Mutex<Vec<(Topic, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(Topic, String)> {
        self.messages.lock().clone()
    }

    pub fn on(&self, topic: Topic) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|(t, _)| *t == topic)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl EventSink for MemorySink {
    fn send(&self, topic: Topic, payload: String) {
        self.messages.lock().push((topic, payload));
    }
}

/// Writes one line per message to any writer (stdout for the CLI)
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
    fanout: bool,
}

impl<W: Write + Send> WriterSink<W> {
    /// Lines of `<topic>\t<json>`
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            fanout: false,
        }
    }

    /// Lines of real-time fan-out envelopes, see [`Envelope`]
    pub fn fanout(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            fanout: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> EventSink for WriterSink<W> {
    fn send(&self, topic: Topic, payload: String) {
        let line = if self.fanout {
            match Envelope::wrap(topic, &payload) {
                Ok(Some(envelope)) => envelope,
                Ok(None) => return,
                Err(e) => {
                    error!(%topic, error = %e, "Failed to wrap message");
                    return;
                }
            }
        } else {
            format!("{}\t{}", topic, payload)
        };

        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{}", line) {
            error!(%topic, error = %e, "Failed to write message");
        }
    }
}
