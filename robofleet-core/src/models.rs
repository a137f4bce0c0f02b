/**
 * FLEET MODELS - robot records, snapshots and wire decoding
 *
 * ROLE:
 * Typed view of what the fleet backend publishes. A snapshot is decoded
 * as a whole: one bad record rejects the payload, nothing partial ever
 * reaches the store.
 *
 * WIRE FORMAT (GET /api/robots, push topic payloads):
 * [{ "Robot ID": "...", "Online/Offline": true, "Battery Percentage": 87,
 *    "CPU Usage": 12, "RAM Consumption": 512, "Last Updated": "2024-06-01 10:00:00",
 *    "Location Coordinates": [40.71, -74.0] }, ...]
 */

use crate::error::FleetError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl From<[f64; 2]> for GeoPoint {
    fn from([latitude, longitude]: [f64; 2]) -> Self {
        Self { latitude, longitude }
    }
}

/// Freshness timestamp of a record. Always orderable, serialised as RFC 3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(#[serde(with = "time::serde::rfc3339")] pub OffsetDateTime);

impl Timestamp {
    /// Accepts RFC 3339, or `YYYY-MM-DD HH:MM:SS` / `YYYY-MM-DDTHH:MM:SS` read as UTC.
    pub fn parse(text: &str) -> Result<Self, FleetError> {
        let text = text.trim();
        if let Ok(ts) = OffsetDateTime::parse(text, &Rfc3339) {
            return Ok(Self(ts));
        }
        let spaced = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        let iso = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
        PrimitiveDateTime::parse(text, spaced)
            .or_else(|_| PrimitiveDateTime::parse(text, iso))
            .map(|naive| Self(naive.assume_utc()))
            .map_err(|_| FleetError::malformed(format!("unorderable timestamp {text:?}")))
    }

    pub fn from_unix(seconds: i64) -> Result<Self, FleetError> {
        OffsetDateTime::from_unix_timestamp(seconds)
            .map(Self)
            .map_err(|e| FleetError::malformed(format!("epoch timestamp {seconds} out of range: {e}")))
    }

    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.format(&Rfc3339).unwrap_or_default()
    }
}

/// Out-of-domain values carried by an otherwise valid record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Degradation {
    BatteryOutOfRange(f64),
    CpuOutOfRange(f64),
    NegativeRam(f64),
    MissingLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotRecord {
    pub id: String,
    pub online: bool,
    pub battery_percent: f64,
    pub cpu_usage_percent: f64,
    pub ram_consumption_mb: f64,
    pub last_updated: Timestamp,
    pub location: Option<GeoPoint>,
}

impl RobotRecord {
    pub fn is_low_battery(&self, threshold: f64) -> bool {
        self.battery_percent < threshold
    }

    /// Battery clamped into [0, 100] for display; the record keeps the raw value.
    pub fn display_battery(&self) -> f64 {
        self.battery_percent.clamp(0.0, 100.0)
    }

    pub fn display_cpu(&self) -> f64 {
        self.cpu_usage_percent.clamp(0.0, 100.0)
    }

    pub fn display_ram(&self) -> f64 {
        self.ram_consumption_mb.max(0.0)
    }

    /// First 8 characters of the id, used for compact labels.
    pub fn short_id(&self) -> String {
        self.id.chars().take(8).collect()
    }

    pub fn degradations(&self) -> Vec<Degradation> {
        let mut found = Vec::new();
        if !(0.0..=100.0).contains(&self.battery_percent) {
            found.push(Degradation::BatteryOutOfRange(self.battery_percent));
        }
        if !(0.0..=100.0).contains(&self.cpu_usage_percent) {
            found.push(Degradation::CpuOutOfRange(self.cpu_usage_percent));
        }
        if self.ram_consumption_mb < 0.0 {
            found.push(Degradation::NegativeRam(self.ram_consumption_mb));
        }
        if self.location.is_none() {
            found.push(Degradation::MissingLocation);
        }
        found
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations().is_empty()
    }
}

/// One moment of fleet state. `revision` and `captured_at` are stamped by the
/// store when the snapshot is accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetSnapshot {
    revision: u64,
    #[serde(with = "time::serde::rfc3339")]
    captured_at: OffsetDateTime,
    robots: Vec<RobotRecord>,
}

impl FleetSnapshot {
    /// Validates identities: every id non-empty and unique.
    pub fn new(robots: Vec<RobotRecord>) -> Result<Self, FleetError> {
        let mut seen = HashSet::with_capacity(robots.len());
        for (index, robot) in robots.iter().enumerate() {
            if robot.id.trim().is_empty() {
                return Err(FleetError::malformed(format!("robot #{index} has an empty id")));
            }
            if !seen.insert(robot.id.as_str()) {
                return Err(FleetError::malformed(format!("duplicate robot id {:?}", robot.id)));
            }
        }
        Ok(Self {
            revision: 0,
            captured_at: OffsetDateTime::now_utc(),
            robots,
        })
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn captured_at(&self) -> OffsetDateTime {
        self.captured_at
    }

    pub fn robots(&self) -> &[RobotRecord] {
        &self.robots
    }

    pub fn len(&self) -> usize {
        self.robots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.robots.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RobotRecord> {
        self.robots.iter().find(|r| r.id == id)
    }

    pub(crate) fn stamp(&mut self, revision: u64, captured_at: OffsetDateTime) {
        self.revision = revision;
        self.captured_at = captured_at;
    }
}

#[derive(Debug, Deserialize)]
struct WireRobot {
    #[serde(rename = "Robot ID")]
    id: String,
    #[serde(rename = "Online/Offline")]
    online: bool,
    #[serde(rename = "Battery Percentage")]
    battery: f64,
    #[serde(rename = "CPU Usage")]
    cpu: f64,
    #[serde(rename = "RAM Consumption")]
    ram: f64,
    #[serde(rename = "Last Updated")]
    last_updated: WireTimestamp,
    #[serde(rename = "Location Coordinates", default)]
    location: Option<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Text(String),
    Epoch(i64),
}

impl WireRobot {
    fn into_record(self) -> Result<RobotRecord, FleetError> {
        let last_updated = match self.last_updated {
            WireTimestamp::Text(text) => Timestamp::parse(&text)?,
            WireTimestamp::Epoch(secs) => Timestamp::from_unix(secs)?,
        };
        Ok(RobotRecord {
            id: self.id,
            online: self.online,
            battery_percent: self.battery,
            cpu_usage_percent: self.cpu,
            ram_consumption_mb: self.ram,
            last_updated,
            location: self.location.map(GeoPoint::from),
        })
    }
}

/// Decodes a full payload into a snapshot, or fails the whole snapshot.
pub fn decode_snapshot(payload: &[u8]) -> Result<FleetSnapshot, FleetError> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| FleetError::malformed(format!("invalid JSON: {e}")))?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        other => {
            return Err(FleetError::malformed(format!(
                "expected a JSON array of robots, got {}",
                json_kind(&other)
            )))
        }
    };

    let robots = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<WireRobot>(item)
                .map_err(|e| FleetError::malformed(format!("robot #{index}: {e}")))
                .and_then(|wire| {
                    wire.into_record()
                        .map_err(|e| FleetError::malformed(format!("robot #{index}: {e}")))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    FleetSnapshot::new(robots)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
