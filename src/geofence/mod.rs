//! Geofence engine
//!
//! Checks positions against the registered fences and detects containment
//! transitions per (asset, fence) pair:
//!
//! ```text
//! UNKNOWN ──► INSIDE | OUTSIDE      first observation, silent
//! OUTSIDE ──► INSIDE                entry
//! INSIDE  ──► OUTSIDE               exit
//! X       ──► X                     steady, silent
//! ```
//!
//! # Thread Safety
//!
//! The engine is shared by reference between consumer workers. Fences sit
//! behind an `RwLock` (registration is rare, checks only read). The state map
//! is a `DashMap`; each read-modify-write goes through its entry API, which
//! holds the shard lock for that key, so two checks of the same pair cannot
//! lose an update while different pairs proceed in parallel.
//!
//! Reports are assumed to arrive in order per asset. There is no reordering
//! buffer: an out-of-order report is judged against whatever state the
//! previous arrival left behind.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use geo::Polygon;
use parking_lot::RwLock;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::GeometryError;
use crate::model::Position;
use crate::spatial;


/// Containment of one asset relative to one fence
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeofenceState {
    Inside,
    Outside,
    /// Never observed
    Unknown,
}

/// A monitored zone. Circles are stored as their polygon approximation.
#[derive(Clone, Debug, PartialEq)]
pub struct Geofence {
    pub id: Uuid,
    pub name: String,
    pub geometry: Polygon,
}

/// A detected change of containment, the result of one check
#[derive(Clone, Debug, PartialEq)]
pub struct GeofenceTransition {
    pub geofence_id: Uuid,
    pub geofence_name: String,
    pub asset_id: String,
    pub previous_state: GeofenceState,
    pub current_state: GeofenceState,
    pub detected_at: OffsetDateTime,
}

impl GeofenceTransition {
    pub fn is_entry(&self) -> bool {
        self.current_state == GeofenceState::Inside && self.previous_state != GeofenceState::Inside
    }

    pub fn is_exit(&self) -> bool {
        self.previous_state == GeofenceState::Inside && self.current_state == GeofenceState::Outside
    }
}

type StateKey = (String, Uuid);

#[derive(Default)]
pub struct GeofenceEngine {
    fences: RwLock<Vec<Geofence>>,
    states: DashMap<StateKey, GeofenceState>,
}

impl GeofenceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fence for monitoring.
    ///
    /// Append-only: the same id registered twice is checked twice.
    pub fn register_geofence(&self, id: Uuid, name: impl Into<String>, geometry: Polygon) {
        let name = name.into();
        info!(geofence = %name, %id, "Registered geofence");

        self.fences.write().push(Geofence { id, name, geometry });
    }

    /// Build a polygon from `[longitude, latitude]` pairs and register it.
    ///
    /// The registry is untouched when the coordinates are rejected.
    pub fn register_polygon_geofence(
        &self,
        id: Uuid,
        name: impl Into<String>,
        coordinates: &[[f64; 2]],
    ) -> Result<(), GeometryError> {
        let polygon = spatial::create_polygon(coordinates)?;
        self.register_geofence(id, name, polygon);

        Ok(())
    }

    pub fn register_circular_geofence(
        &self,
        id: Uuid,
        name: impl Into<String>,
        longitude: f64,
        latitude: f64,
        radius_metres: f64,
    ) -> Result<(), GeometryError> {
        let circle = spatial::create_circular_fence(longitude, latitude, radius_metres)?;
        self.register_geofence(id, name, circle);

        Ok(())
    }

    /// Check a position against every registered fence.
    ///
    /// Yields at most one transition per fence; fences are evaluated
    /// independently, so one report can enter one zone and leave another.
    pub fn check_position(&self, position: &Position) -> Vec<GeofenceTransition> {
        let point = position.point();
        let fences = self.fences.read();
        let mut transitions = vec![];

        for fence in fences.iter() {
            let current = if spatial::contains(&fence.geometry, &point) {
                GeofenceState::Inside
            } else {
                GeofenceState::Outside
            };

            let key = (position.asset_id().to_string(), fence.id);

            let previous = match self.states.entry(key) {
                Entry::Occupied(mut e) => e.insert(current),
                Entry::Vacant(e) => {
                    e.insert(current);
                    GeofenceState::Unknown
                }
            };

            // The first observation only sets the baseline
            if previous == GeofenceState::Unknown || previous == current {
                continue;
            }

            debug!(
                asset_id = position.asset_id(),
                geofence = %fence.name,
                ?previous,
                ?current,
                "Geofence transition"
            );

            transitions.push(GeofenceTransition {
                geofence_id: fence.id,
                geofence_name: fence.name.clone(),
                asset_id: position.asset_id().to_string(),
                previous_state: previous,
                current_state: current,
                detected_at: OffsetDateTime::now_utc(),
            });
        }

        transitions
    }

    /// Last observed state, `Unknown` if the pair was never checked
    pub fn get_state(&self, asset_id: &str, geofence_id: Uuid) -> GeofenceState {
        self.states
            .get(&(asset_id.to_string(), geofence_id))
            .map(|s| *s)
            .unwrap_or(GeofenceState::Unknown)
    }

    pub fn get_geofence_count(&self) -> usize {
        self.fences.read().len()
    }

    /// Drop all fences and all recorded state
    pub fn clear(&self) {
        let mut fences = self.fences.write();
        fences.clear();
        self.states.clear();
    }
}
