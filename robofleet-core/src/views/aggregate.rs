//! Aggregate series for charting (battery / cpu / ram per robot).

use crate::models::FleetSnapshot;
use serde::Serialize;

/// One bar group of the statistics chart. Values are passed through as
/// received; labelling and truncation belong to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatePoint {
    pub id: String,
    pub battery: f64,
    pub cpu: f64,
    pub ram: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub low_battery: usize,
    pub located: usize,
    pub degraded: usize,
    pub mean_battery: Option<f64>,
    pub mean_cpu: Option<f64>,
    pub mean_ram: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateView {
    pub series: Vec<AggregatePoint>,
    pub summary: FleetSummary,
    pub revision: Option<u64>,
}

pub fn derive_aggregate(snapshot: Option<&FleetSnapshot>, low_battery_threshold: f64) -> AggregateView {
    let Some(snapshot) = snapshot else {
        return AggregateView {
            series: Vec::new(),
            summary: FleetSummary::default(),
            revision: None,
        };
    };

    let series = snapshot
        .robots()
        .iter()
        .map(|r| AggregatePoint {
            id: r.id.clone(),
            battery: r.battery_percent,
            cpu: r.cpu_usage_percent,
            ram: r.ram_consumption_mb,
        })
        .collect();

    AggregateView {
        series,
        summary: summarize(snapshot, low_battery_threshold),
        revision: Some(snapshot.revision()),
    }
}

fn summarize(snapshot: &FleetSnapshot, low_battery_threshold: f64) -> FleetSummary {
    let robots = snapshot.robots();
    let online = robots.iter().filter(|r| r.online).count();
    let mean = |values: &mut dyn Iterator<Item = f64>| {
        let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    };

    FleetSummary {
        total: robots.len(),
        online,
        offline: robots.len() - online,
        low_battery: robots
            .iter()
            .filter(|r| r.is_low_battery(low_battery_threshold))
            .count(),
        located: robots.iter().filter(|r| r.location.is_some()).count(),
        degraded: robots.iter().filter(|r| r.is_degraded()).count(),
        // means use display-clamped values so one bad reading can't skew the fleet figure
        mean_battery: mean(&mut robots.iter().map(|r| r.display_battery())),
        mean_cpu: mean(&mut robots.iter().map(|r| r.display_cpu())),
        mean_ram: mean(&mut robots.iter().map(|r| r.display_ram())),
    }
}
