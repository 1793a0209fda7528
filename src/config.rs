//! YAML configuration
//!
//! ```yaml
//! geofences:
//!   - name: Newcastle
//!     fence_type: inclusion
//!     polygon: [[-1.65, 54.96], [-1.58, 54.96], [-1.58, 55.0]]
//!   - name: Monument
//!     alert_on_exit: false
//!     circle: { longitude: -1.6131, latitude: 54.9738, radius_metres: 1000 }
//! pipeline:
//!   speed_limit_kmh: 120
//!   offline_after_secs: 300
//!   workers: 4
//! fields:
//!   asset_id: device
//! ```

use std::fs;
use std::path::Path;

use geo::Polygon;
use serde::{Deserialize, Serialize};
use time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::error::{ConfigError, GeometryError};
use crate::geofence::{GeofenceEngine, GeofenceTransition};
use crate::sources::FieldsConfiguration;
use crate::spatial;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub geofences: Vec<FenceDefinition>,
    pub pipeline: PipelineSettings,
    pub fields: FieldsConfiguration,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document is a valid, default configuration
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = fs::read_to_string(path)?;

        Self::from_yaml(&yaml)
    }

    /// Register every fence. Nothing is registered if any one is invalid.
    pub fn register_geofences(&self, engine: &GeofenceEngine) -> Result<usize, ConfigError> {
        let built = self
            .geofences
            .iter()
            .map(|f| f.geometry().map(|g| (f, g)))
            .collect::<Result<Vec<_>, _>>()?;

        for (fence, geometry) in built {
            engine.register_geofence(fence.id, &fence.name, geometry);
        }

        info!(geofences = self.geofences.len(), "Geofences loaded from config");

        Ok(self.geofences.len())
    }

    /// Whether a transition should be raised as an alert.
    ///
    /// Fences that are not part of this configuration always alert.
    pub fn wants_alert(&self, transition: &GeofenceTransition) -> bool {
        self.geofences
            .iter()
            .find(|f| f.id == transition.geofence_id)
            .map_or(true, |f| f.wants_alert(transition))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FenceType {
    /// Assets are expected inside
    #[default]
    Inclusion,
    /// Assets are expected to stay out
    Exclusion,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CircleDefinition {
    pub longitude: f64,
    pub latitude: f64,
    pub radius_metres: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FenceDefinition {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub fence_type: FenceType,
    #[serde(default = "enabled")]
    pub alert_on_enter: bool,
    #[serde(default = "enabled")]
    pub alert_on_exit: bool,
    /// `[longitude, latitude]` ring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon: Option<Vec<[f64; 2]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circle: Option<CircleDefinition>,
}

fn enabled() -> bool {
    true
}

impl FenceDefinition {
    /// Build the fence polygon, circles approximated
    pub fn geometry(&self) -> Result<Polygon, ConfigError> {
        let result = match (&self.polygon, &self.circle) {
            (Some(ring), None) => spatial::create_polygon(ring),
            (None, Some(c)) => spatial::create_circular_fence(c.longitude, c.latitude, c.radius_metres),
            _ => return Err(ConfigError::Shape(self.name.clone())),
        };

        result.map_err(|source: GeometryError| ConfigError::Geometry {
            name: self.name.clone(),
            source,
        })
    }

    /// Build the geometry and register it on the engine
    pub fn register(&self, engine: &GeofenceEngine) -> Result<(), ConfigError> {
        engine.register_geofence(self.id, &self.name, self.geometry()?);

        Ok(())
    }

    /// Apply the alert flags to a transition of this fence.
    ///
    /// A fence with both flags off alerts on both.
    pub fn wants_alert(&self, transition: &GeofenceTransition) -> bool {
        let (enter, exit) = match (self.alert_on_enter, self.alert_on_exit) {
            (false, false) => (true, true),
            flags => flags,
        };

        (enter && transition.is_entry()) || (exit && transition.is_exit())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub speed_limit_kmh: Option<f64>,
    pub offline_after_secs: u64,
    pub workers: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            speed_limit_kmh: None,
            offline_after_secs: 300,
            workers: 1,
        }
    }
}

impl PipelineSettings {
    pub fn offline_after(&self) -> Duration {
        Duration::seconds(self.offline_after_secs as i64)
    }
}
