//! Real-time fan-out envelope
//!
//! Map clients receive `{"type": ..., "payload": <event JSON>}`. Every
//! geofence alert, entry or exit, travels as `GEOFENCE_BREACHED`; clients
//! tell them apart from the payload. Asset alerts are not fanned out.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::publisher::Topic;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    PositionUpdated,
    GeofenceBreached,
}

impl MessageType {
    pub fn for_topic(topic: Topic) -> Option<Self> {
        match topic {
            Topic::ProcessedPosition => Some(MessageType::PositionUpdated),
            Topic::GeofenceAlert => Some(MessageType::GeofenceBreached),
            Topic::AssetAlert => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub payload: Value,
}

impl Envelope {
    /// Envelope for a message published on `topic`, if that topic is fanned out
    pub fn for_topic(topic: Topic, payload: &str) -> Result<Option<Self>, serde_json::Error> {
        let Some(kind) = MessageType::for_topic(topic) else {
            return Ok(None);
        };

        Ok(Some(Self {
            kind,
            payload: serde_json::from_str(payload)?,
        }))
    }

    /// Same as [`Envelope::for_topic`], serialised
    pub fn wrap(topic: Topic, payload: &str) -> Result<Option<String>, serde_json::Error> {
        Self::for_topic(topic, payload)?
            .map(|e| serde_json::to_string(&e))
            .transpose()
    }
}
