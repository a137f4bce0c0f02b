//! Geolocation deriver: markers for the whole (unfiltered) fleet plus a map
//! center that only moves when a new snapshot is installed.

use crate::models::{FleetSnapshot, GeoPoint, RobotRecord};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerClass {
    Neutral,
    Alert,
    Normal,
}

pub fn marker_class(robot: &RobotRecord, low_battery_threshold: f64) -> MarkerClass {
    if !robot.online {
        MarkerClass::Neutral
    } else if robot.is_low_battery(low_battery_threshold) {
        MarkerClass::Alert
    } else {
        MarkerClass::Normal
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub id: String,
    pub position: GeoPoint,
    pub class: MarkerClass,
    pub online: bool,
    pub display_battery: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub markers: Vec<Marker>,
    pub center: GeoPoint,
    pub revision: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct CachedCenter {
    revision: u64,
    center: GeoPoint,
}

pub struct MapDeriver {
    fallback_center: GeoPoint,
    low_battery_threshold: f64,
    center: Mutex<Option<CachedCenter>>,
}

impl MapDeriver {
    pub fn new(fallback_center: GeoPoint, low_battery_threshold: f64) -> Self {
        Self {
            fallback_center,
            low_battery_threshold,
            center: Mutex::new(None),
        }
    }

    pub fn derive(&self, snapshot: Option<&FleetSnapshot>) -> MapView {
        let Some(snapshot) = snapshot else {
            return MapView {
                markers: Vec::new(),
                center: self.fallback_center,
                revision: None,
            };
        };

        let markers = snapshot
            .robots()
            .iter()
            .filter_map(|robot| {
                robot.location.map(|position| Marker {
                    id: robot.id.clone(),
                    position,
                    class: marker_class(robot, self.low_battery_threshold),
                    online: robot.online,
                    display_battery: robot.display_battery(),
                })
            })
            .collect();

        MapView {
            markers,
            center: self.center_for(snapshot),
            revision: Some(snapshot.revision()),
        }
    }

    /// Center for `snapshot`, computed once per revision and cached until a
    /// different snapshot comes through.
    pub fn center_for(&self, snapshot: &FleetSnapshot) -> GeoPoint {
        let mut cached = self.center.lock();
        if let Some(hit) = *cached {
            if hit.revision == snapshot.revision() {
                return hit.center;
            }
        }

        let center = first_location(snapshot).unwrap_or(self.fallback_center);
        debug!(revision = snapshot.revision(), ?center, "map center recomputed");
        *cached = Some(CachedCenter {
            revision: snapshot.revision(),
            center,
        });
        center
    }
}

fn first_location(snapshot: &FleetSnapshot) -> Option<GeoPoint> {
    snapshot.robots().iter().find_map(|r| r.location)
}
