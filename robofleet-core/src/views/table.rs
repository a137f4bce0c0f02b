//! Filter + pagination deriver for the robot table.

use crate::models::{FleetSnapshot, RobotRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotFilter {
    #[default]
    All,
    Active,
    Offline,
    LowBattery,
}

impl RobotFilter {
    pub fn matches(&self, robot: &RobotRecord, low_battery_threshold: f64) -> bool {
        match self {
            RobotFilter::All => true,
            RobotFilter::Active => robot.online,
            RobotFilter::Offline => !robot.online,
            RobotFilter::LowBattery => robot.is_low_battery(low_battery_threshold),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RobotFilter::All => "all",
            RobotFilter::Active => "active",
            RobotFilter::Offline => "offline",
            RobotFilter::LowBattery => "low_battery",
        }
    }
}

impl fmt::Display for RobotFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RobotFilter {
    type Err = String;

    /// Accepts the snake_case names plus the labels of the original dropdown
    /// ("All", "Active", "Offline", "Low Battery").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "all" => Ok(RobotFilter::All),
            "active" | "online" => Ok(RobotFilter::Active),
            "offline" => Ok(RobotFilter::Offline),
            "lowbattery" => Ok(RobotFilter::LowBattery),
            _ => Err(format!("unknown filter {s:?}")),
        }
    }
}

/// View-local table state, owned by the presenting surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    filter: RobotFilter,
    page: usize,
    page_size: usize,
}

impl ViewState {
    pub fn new(page_size: usize) -> Self {
        Self {
            filter: RobotFilter::All,
            page: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn filter(&self) -> RobotFilter {
        self.filter
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Switching the filter always goes back to page 1.
    pub fn set_filter(&mut self, filter: RobotFilter) {
        self.filter = filter;
        self.page = 1;
    }

    /// Requests a page; values past the end are clamped to the last page when
    /// the table is derived.
    pub fn request_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    /// Pins a requested page to the last page of `snapshot`, so the state
    /// holds the page actually shown. Returns the effective page.
    pub fn clamp_to(&mut self, snapshot: Option<&FleetSnapshot>, low_battery_threshold: f64) -> usize {
        let matching = snapshot.map_or(0, |s| count_matching(s, self.filter, low_battery_threshold));
        self.page = self.page.clamp(1, total_pages(matching, self.page_size));
        self.page
    }

    /// Rechecks the carried-over page against a freshly installed snapshot.
    /// Returns `true` when the page was no longer valid and got reset to 1.
    pub fn revalidate(&mut self, snapshot: &FleetSnapshot, low_battery_threshold: f64) -> bool {
        let matching = count_matching(snapshot, self.filter, low_battery_threshold);
        if self.page > total_pages(matching, self.page_size) {
            self.page = 1;
            true
        } else {
            false
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_PAGE_SIZE)
    }
}

/// Visual emphasis of a table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowHighlight {
    Normal,
    Muted,
    Alert,
}

pub fn row_highlight(robot: &RobotRecord, low_battery_threshold: f64) -> RowHighlight {
    if robot.is_low_battery(low_battery_threshold) {
        RowHighlight::Alert
    } else if !robot.online {
        RowHighlight::Muted
    } else {
        RowHighlight::Normal
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    #[serde(flatten)]
    pub robot: RobotRecord,
    pub highlight: RowHighlight,
    pub display_battery: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub filter: RobotFilter,
    pub rows: Vec<TableRow>,
    pub total_filtered: usize,
    pub total_pages: usize,
    pub page: usize,
    pub page_size: usize,
    /// Revision of the snapshot the rows come from; `None` before the first snapshot.
    pub revision: Option<u64>,
}

impl TableView {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn robots(&self) -> impl Iterator<Item = &RobotRecord> {
        self.rows.iter().map(|row| &row.robot)
    }
}

/// `max(1, ceil(count / page_size))`
pub fn total_pages(count: usize, page_size: usize) -> usize {
    count.div_ceil(page_size.max(1)).max(1)
}

fn count_matching(snapshot: &FleetSnapshot, filter: RobotFilter, threshold: f64) -> usize {
    snapshot
        .robots()
        .iter()
        .filter(|r| filter.matches(r, threshold))
        .count()
}

/// Filters in snapshot order, clamps the requested page and slices it out.
pub fn derive_table(
    snapshot: Option<&FleetSnapshot>,
    state: &ViewState,
    low_battery_threshold: f64,
) -> TableView {
    let filtered: Vec<&RobotRecord> = snapshot
        .map(|s| {
            s.robots()
                .iter()
                .filter(|r| state.filter.matches(r, low_battery_threshold))
                .collect()
        })
        .unwrap_or_default();

    let total_filtered = filtered.len();
    let total_pages = total_pages(total_filtered, state.page_size);
    let page = state.page.clamp(1, total_pages);

    let rows = filtered
        .into_iter()
        .skip((page - 1) * state.page_size)
        .take(state.page_size)
        .map(|robot| TableRow {
            highlight: row_highlight(robot, low_battery_threshold),
            display_battery: robot.display_battery(),
            robot: robot.clone(),
        })
        .collect();

    TableView {
        filter: state.filter,
        rows,
        total_filtered,
        total_pages,
        page,
        page_size: state.page_size,
        revision: snapshot.map(FleetSnapshot::revision),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LOW_BATTERY_THRESHOLD;
    use crate::models::{GeoPoint, Timestamp};

    fn robot(n: usize, online: bool, battery: f64) -> RobotRecord {
        RobotRecord {
            id: format!("robot-{n:02}"),
            online,
            battery_percent: battery,
            cpu_usage_percent: 20.0,
            ram_consumption_mb: 300.0,
            last_updated: Timestamp::now(),
            location: Some(GeoPoint::new(0.0, 0.0)),
        }
    }

    fn fleet(n: usize) -> FleetSnapshot {
        FleetSnapshot::new((1..=n).map(|i| robot(i, i % 3 != 0, (i * 7 % 100) as f64)).collect())
            .unwrap()
    }

    fn ids(view: &TableView) -> Vec<String> {
        view.robots().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!("Low Battery".parse::<RobotFilter>(), Ok(RobotFilter::LowBattery));
        assert_eq!("low_battery".parse::<RobotFilter>(), Ok(RobotFilter::LowBattery));
        assert_eq!("ACTIVE".parse::<RobotFilter>(), Ok(RobotFilter::Active));
        assert_eq!("all".parse::<RobotFilter>(), Ok(RobotFilter::All));
        assert!("charging".parse::<RobotFilter>().is_err());
    }

    #[test]
    fn test_total_pages_minimum_one() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(25, 10), 3);
    }

    #[test]
    fn test_first_page_of_25() {
        let snapshot = fleet(25);
        let state = ViewState::new(10);
        let view = derive_table(Some(&snapshot), &state, LOW_BATTERY_THRESHOLD);

        assert_eq!(view.total_pages, 3);
        assert_eq!(view.total_filtered, 25);
        assert_eq!(view.page, 1);
        let expected: Vec<String> = (1..=10).map(|i| format!("robot-{i:02}")).collect();
        assert_eq!(ids(&view), expected);
    }

    #[test]
    fn test_page_past_end_clamps_to_last() {
        let snapshot = fleet(25);
        let mut state = ViewState::new(10);
        state.request_page(4);
        let view = derive_table(Some(&snapshot), &state, LOW_BATTERY_THRESHOLD);

        assert_eq!(view.page, 3);
        assert_eq!(view.rows.len(), 5);
        assert_eq!(ids(&view).first().map(String::as_str), Some("robot-21"));
    }

    #[test]
    fn test_filters_preserve_snapshot_order() {
        let snapshot = fleet(30);
        for filter in [
            RobotFilter::All,
            RobotFilter::Active,
            RobotFilter::Offline,
            RobotFilter::LowBattery,
        ] {
            let mut state = ViewState::new(100);
            state.set_filter(filter);
            let view = derive_table(Some(&snapshot), &state, LOW_BATTERY_THRESHOLD);
            let expected: Vec<String> = snapshot
                .robots()
                .iter()
                .filter(|r| filter.matches(r, LOW_BATTERY_THRESHOLD))
                .map(|r| r.id.clone())
                .collect();
            assert_eq!(ids(&view), expected, "filter {filter}");
        }
    }

    #[test]
    fn test_pages_cover_filtered_set_exactly_once() {
        let snapshot = fleet(47);
        for page_size in [1, 3, 7, 10, 47, 60] {
            let mut state = ViewState::new(page_size);
            state.set_filter(RobotFilter::Active);
            let first = derive_table(Some(&snapshot), &state, LOW_BATTERY_THRESHOLD);

            let mut collected = Vec::new();
            for page in 1..=first.total_pages {
                state.request_page(page);
                let view = derive_table(Some(&snapshot), &state, LOW_BATTERY_THRESHOLD);
                assert_eq!(view.page, page);
                collected.extend(ids(&view));
            }

            let expected: Vec<String> = snapshot
                .robots()
                .iter()
                .filter(|r| r.online)
                .map(|r| r.id.clone())
                .collect();
            assert_eq!(collected, expected, "page size {page_size}");
            assert_eq!(first.total_pages, total_pages(expected.len(), page_size));
        }
    }

    #[test]
    fn test_low_battery_filter_resets_page() {
        let snapshot = FleetSnapshot::new((1..=3).map(|i| robot(i, true, 15.0)).collect()).unwrap();
        let mut state = ViewState::new(10);
        state.request_page(2);
        state.set_filter(RobotFilter::LowBattery);
        assert_eq!(state.page(), 1);

        let view = derive_table(Some(&snapshot), &state, LOW_BATTERY_THRESHOLD);
        assert_eq!(view.total_filtered, 3);
        assert_eq!(view.total_pages, 1);
        assert_eq!(view.page, 1);
        assert!(view.rows.iter().all(|r| r.highlight == RowHighlight::Alert));
    }

    #[test]
    fn test_revalidate_keeps_valid_page_and_resets_invalid() {
        let mut state = ViewState::new(10);
        state.request_page(2);

        assert!(!state.revalidate(&fleet(25), LOW_BATTERY_THRESHOLD));
        assert_eq!(state.page(), 2);

        assert!(state.revalidate(&fleet(8), LOW_BATTERY_THRESHOLD));
        assert_eq!(state.page(), 1);
    }

    #[test]
    fn test_clamped_request_survives_identical_replacement() {
        let mut state = ViewState::new(10);
        state.request_page(4);
        assert_eq!(state.clamp_to(Some(&fleet(25)), LOW_BATTERY_THRESHOLD), 3);

        assert!(!state.revalidate(&fleet(25), LOW_BATTERY_THRESHOLD));
        assert_eq!(state.page(), 3);
        assert_eq!(state.clamp_to(None, LOW_BATTERY_THRESHOLD), 1);
    }

    #[test]
    fn test_no_match_is_valid_empty_view() {
        let snapshot = FleetSnapshot::new(vec![robot(1, true, 90.0)]).unwrap();
        let mut state = ViewState::new(10);
        state.set_filter(RobotFilter::Offline);
        let view = derive_table(Some(&snapshot), &state, LOW_BATTERY_THRESHOLD);
        assert!(view.is_empty());
        assert_eq!(view.total_pages, 1);
        assert_eq!(view.page, 1);
    }

    #[test]
    fn test_empty_state_before_first_snapshot() {
        let view = derive_table(None, &ViewState::new(10), LOW_BATTERY_THRESHOLD);
        assert!(view.is_empty());
        assert_eq!(view.total_pages, 1);
        assert_eq!(view.revision, None);
    }

    #[test]
    fn test_row_highlight() {
        assert_eq!(row_highlight(&robot(1, true, 50.0), 20.0), RowHighlight::Normal);
        assert_eq!(row_highlight(&robot(1, false, 50.0), 20.0), RowHighlight::Muted);
        assert_eq!(row_highlight(&robot(1, false, 5.0), 20.0), RowHighlight::Alert);
    }
}
