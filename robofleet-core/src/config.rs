use crate::models::GeoPoint;
use serde::{Deserialize, Serialize};

/// Battery level (percent) under which a robot counts as low battery.
/// Shared by the `LowBattery` filter, row highlighting and map marker classes.
pub const LOW_BATTERY_THRESHOLD: f64 = 20.0;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Map center used when no robot in the snapshot reports a location.
pub const FALLBACK_CENTER: GeoPoint = GeoPoint {
    latitude: 40.7128,
    longitude: -74.006,
};

/// Tunables for the view derivers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivationConfig {
    pub page_size: usize,
    pub low_battery_threshold: f64,
    pub fallback_center: GeoPoint,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            low_battery_threshold: LOW_BATTERY_THRESHOLD,
            fallback_center: FALLBACK_CENTER,
        }
    }
}

impl DerivationConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_low_battery_threshold(mut self, threshold: f64) -> Self {
        self.low_battery_threshold = threshold;
        self
    }
}
