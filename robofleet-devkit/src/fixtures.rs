/*!
Fixture builders for robot records and fleet payloads

`RobotBuilder` produces typed records for store-level tests; `wire_payload`
renders records in the backend's JSON shape so decoding is exercised too.
*/

use robofleet_core::{FleetSnapshot, GeoPoint, RobotRecord, Timestamp};
use serde_json::{json, Value};

/// Fluent builder, defaults to a healthy online robot at the origin.
#[derive(Debug, Clone)]
pub struct RobotBuilder {
    record: RobotRecord,
}

impl RobotBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            record: RobotRecord {
                id: id.into(),
                online: true,
                battery_percent: 80.0,
                cpu_usage_percent: 20.0,
                ram_consumption_mb: 512.0,
                last_updated: Timestamp::now(),
                location: Some(GeoPoint::new(0.0, 0.0)),
            },
        }
    }

    pub fn online(mut self, online: bool) -> Self {
        self.record.online = online;
        self
    }

    pub fn offline(self) -> Self {
        self.online(false)
    }

    pub fn battery(mut self, percent: f64) -> Self {
        self.record.battery_percent = percent;
        self
    }

    pub fn cpu(mut self, percent: f64) -> Self {
        self.record.cpu_usage_percent = percent;
        self
    }

    pub fn ram(mut self, mb: f64) -> Self {
        self.record.ram_consumption_mb = mb;
        self
    }

    pub fn at(mut self, latitude: f64, longitude: f64) -> Self {
        self.record.location = Some(GeoPoint::new(latitude, longitude));
        self
    }

    pub fn unlocated(mut self) -> Self {
        self.record.location = None;
        self
    }

    pub fn updated_at(mut self, timestamp: Timestamp) -> Self {
        self.record.last_updated = timestamp;
        self
    }

    pub fn build(self) -> RobotRecord {
        self.record
    }
}

/// `n` healthy robots named `robot-01`, `robot-02`, ... in that order.
pub fn fleet(n: usize) -> Vec<RobotRecord> {
    (1..=n)
        .map(|i| RobotBuilder::new(format!("robot-{i:02}")).build())
        .collect()
}

/// Validated snapshot from records. Panics on duplicate or empty ids.
pub fn snapshot(robots: Vec<RobotRecord>) -> FleetSnapshot {
    match FleetSnapshot::new(robots) {
        Ok(snapshot) => snapshot,
        Err(e) => panic!("fixture snapshot rejected: {e}"),
    }
}

pub fn wire_robot(robot: &RobotRecord) -> Value {
    let mut value = json!({
        "Robot ID": robot.id,
        "Online/Offline": robot.online,
        "Battery Percentage": robot.battery_percent,
        "CPU Usage": robot.cpu_usage_percent,
        "RAM Consumption": robot.ram_consumption_mb,
        "Last Updated": robot.last_updated.to_rfc3339(),
    });
    if let Some(location) = robot.location {
        value["Location Coordinates"] = json!([location.latitude, location.longitude]);
    }
    value
}

/// JSON array payload as served by `GET /api/robots`.
pub fn wire_payload(robots: &[RobotRecord]) -> Vec<u8> {
    let items: Vec<Value> = robots.iter().map(wire_robot).collect();
    Value::Array(items).to_string().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use robofleet_core::decode_snapshot;

    #[test]
    fn test_builder_defaults_and_overrides() {
        let robot = RobotBuilder::new("r1").offline().battery(12.0).unlocated().build();
        assert_eq!(robot.id, "r1");
        assert!(!robot.online);
        assert_eq!(robot.battery_percent, 12.0);
        assert!(robot.location.is_none());
    }

    #[test]
    fn test_wire_payload_decodes() {
        let robots = vec![
            RobotBuilder::new("a").at(10.0, 20.0).build(),
            RobotBuilder::new("b").unlocated().build(),
        ];
        let decoded = decode_snapshot(&wire_payload(&robots)).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.robots()[0].location, Some(GeoPoint::new(10.0, 20.0)));
        assert_eq!(decoded.robots()[1].location, None);
    }
}
