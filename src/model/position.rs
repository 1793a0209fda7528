//! Position definition

use geo::Point;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::validation::{is_valid_latitude, is_valid_longitude};

/// Where a position report came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSource {
    #[default]
    Gps,
    Glonass,
    Galileo,
    /// Automatic Identification System (maritime)
    Ais,
    /// Automatic Dependent Surveillance-Broadcast (aviation)
    AdsB,
    Manual,
    Simulated,
}

/// A validated geographic position of one asset.
///
/// The only way to get one is through [`PositionBuilder::build`] (or
/// deserialising, which goes through the same checks), so holding a
/// `Position` means its bounds have already been verified.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "PositionRecord")]
pub struct Position {
    id: Uuid,
    asset_id: String,
    latitude: f64,
    longitude: f64,
    /// Metres above sea level
    altitude: f64,
    /// km/h
    speed: f64,
    /// Degrees, 0 = north
    heading: f64,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    source: PositionSource,
}

impl Position {
    pub fn builder(
        asset_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
        timestamp: OffsetDateTime,
    ) -> PositionBuilder {
        PositionBuilder {
            id: None,
            asset_id: asset_id.into(),
            latitude,
            longitude,
            altitude: 0.0,
            speed: 0.0,
            heading: 0.0,
            timestamp,
            source: PositionSource::default(),
        }
    }

    /// Position with zero altitude/speed/heading from GPS
    pub fn basic(
        asset_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
        timestamp: OffsetDateTime,
    ) -> Result<Self, ValidationError> {
        Self::builder(asset_id, latitude, longitude, timestamp).build()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn heading(&self) -> f64 {
        self.heading
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn source(&self) -> PositionSource {
        self.source
    }

    /// As a (longitude, latitude) point
    pub fn point(&self) -> Point {
        Point::new(self.longitude, self.latitude)
    }
}

pub struct PositionBuilder {
    id: Option<Uuid>,
    asset_id: String,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    speed: f64,
    heading: f64,
    timestamp: OffsetDateTime,
    source: PositionSource,
}

impl PositionBuilder {
    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn altitude(mut self, altitude: f64) -> Self {
        self.altitude = altitude;
        self
    }

    pub fn speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn heading(mut self, heading: f64) -> Self {
        self.heading = heading;
        self
    }

    pub fn source(mut self, source: PositionSource) -> Self {
        self.source = source;
        self
    }

    pub fn build(self) -> Result<Position, ValidationError> {
        if self.asset_id.trim().is_empty() {
            return Err(ValidationError::MissingAssetId);
        }
        if !is_valid_latitude(self.latitude) {
            return Err(ValidationError::Latitude(self.latitude));
        }
        if !is_valid_longitude(self.longitude) {
            return Err(ValidationError::Longitude(self.longitude));
        }
        if !(0.0..=360.0).contains(&self.heading) {
            return Err(ValidationError::Heading(self.heading));
        }

        Ok(Position {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            asset_id: self.asset_id,
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            speed: self.speed,
            heading: self.heading,
            timestamp: self.timestamp,
            source: self.source,
        })
    }
}

/// Unchecked wire shape, only used to route deserialisation through the builder
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRecord {
    id: Uuid,
    asset_id: String,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    speed: f64,
    heading: f64,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    source: PositionSource,
}

impl TryFrom<PositionRecord> for Position {
    type Error = ValidationError;

    fn try_from(r: PositionRecord) -> Result<Self, Self::Error> {
        Position::builder(r.asset_id, r.latitude, r.longitude, r.timestamp)
            .id(r.id)
            .altitude(r.altitude)
            .speed(r.speed)
            .heading(r.heading)
            .source(r.source)
            .build()
    }
}
