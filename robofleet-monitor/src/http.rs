/**
 * FLEET HTTP API - read-only JSON views for presentation surfaces
 *
 * ROUTES:
 * - GET /health : liveness, always "ok"
 * - GET /system/health : uptime, memory, source status, stale flag
 * - GET /fleet/table?filter=&page=&page_size= : filtered, paginated rows
 * - GET /fleet/map : markers + center
 * - GET /fleet/aggregate : per-robot series + fleet summary
 * - GET /fleet/robots/{id} : one record, 404 when unknown
 *
 * Before the first snapshot the fleet routes answer with empty views.
 * Table requests are stateless: each call carries its own filter and page.
 */

use crate::health::{HealthTracker, MonitorHealth};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use robofleet_core::{
    AggregateView, FleetViews, MapView, RobotFilter, RobotRecord, TableView, ViewState,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct AppState {
    pub views: Arc<FleetViews>,
    pub health_tracker: HealthTracker,
}

#[derive(Debug, Default, Deserialize)]
pub struct TableParams {
    filter: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    error: String,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/fleet/table", get(get_table))
        .route("/fleet/map", get(get_map))
        .route("/fleet/aggregate", get(get_aggregate))
        .route("/fleet/robots/{id}", get(get_robot))
        .with_state(app_state)
}

fn view_state(params: &TableParams, default_page_size: usize) -> Result<ViewState, String> {
    let mut state = ViewState::new(params.page_size.unwrap_or(default_page_size));
    if let Some(filter) = params.filter.as_deref() {
        state.set_filter(filter.parse::<RobotFilter>()?);
    }
    if let Some(page) = params.page {
        state.request_page(page);
    }
    Ok(state)
}

// GET /fleet/table
async fn get_table(
    State(app): State<AppState>,
    Query(params): Query<TableParams>,
) -> Result<Json<TableView>, (StatusCode, Json<ApiError>)> {
    let state = view_state(&params, app.views.config().page_size)
        .map_err(|error| (StatusCode::BAD_REQUEST, Json(ApiError { error })))?;
    let view = app.views.table_view(&state);
    debug!(filter = %view.filter, page = view.page, rows = view.rows.len(), "table view served");
    Ok(Json(view))
}

// GET /fleet/map
async fn get_map(State(app): State<AppState>) -> Json<MapView> {
    Json(app.views.map_view())
}

// GET /fleet/aggregate
async fn get_aggregate(State(app): State<AppState>) -> Json<AggregateView> {
    Json(app.views.aggregate_view())
}

// GET /fleet/robots/{id}
async fn get_robot(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RobotRecord>, StatusCode> {
    app.views.robot(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<MonitorHealth> {
    Json(app.health_tracker.get_health(app.views.store()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceMode;
    use robofleet_core::{
        DerivationConfig, FleetSnapshot, GeoPoint, SnapshotStore, SourceHealth, Timestamp,
    };

    fn app() -> AppState {
        let views = Arc::new(FleetViews::new(
            Arc::new(SnapshotStore::new()),
            DerivationConfig::default(),
        ));
        AppState {
            views,
            health_tracker: HealthTracker::new(SourceMode::Poll, SourceHealth::new("test"), 3),
        }
    }

    fn fleet(n: usize) -> FleetSnapshot {
        FleetSnapshot::new(
            (1..=n)
                .map(|i| RobotRecord {
                    id: format!("robot-{i:02}"),
                    online: i % 2 == 0,
                    battery_percent: if i % 5 == 0 { 10.0 } else { 70.0 },
                    cpu_usage_percent: 15.0,
                    ram_consumption_mb: 400.0,
                    last_updated: Timestamp::now(),
                    location: Some(GeoPoint::new(40.0 + i as f64, -74.0)),
                })
                .collect(),
        )
        .unwrap()
    }

    fn params(filter: Option<&str>, page: Option<usize>) -> Query<TableParams> {
        Query(TableParams {
            filter: filter.map(str::to_string),
            page,
            page_size: None,
        })
    }

    #[tokio::test]
    async fn test_table_empty_before_first_snapshot() {
        let Json(view) = get_table(State(app()), params(None, None)).await.unwrap();
        assert!(view.is_empty());
        assert_eq!(view.total_pages, 1);
    }

    #[tokio::test]
    async fn test_table_page_clamped() {
        let app = app();
        app.views.store().replace(fleet(25));
        let Json(view) = get_table(State(app), params(Some("all"), Some(4))).await.unwrap();
        assert_eq!(view.page, 3);
        assert_eq!(view.rows.len(), 5);
    }

    #[tokio::test]
    async fn test_table_filter_label() {
        let app = app();
        app.views.store().replace(fleet(25));
        let Json(view) = get_table(State(app), params(Some("Low Battery"), None)).await.unwrap();
        assert_eq!(view.filter, RobotFilter::LowBattery);
        assert_eq!(view.total_filtered, 5);
    }

    #[tokio::test]
    async fn test_table_unknown_filter_is_bad_request() {
        let err = get_table(State(app()), params(Some("charging"), None))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_robot_lookup() {
        let app = app();
        app.views.store().replace(fleet(3));
        let Json(robot) = get_robot(State(app.clone()), Path("robot-02".to_string()))
            .await
            .unwrap();
        assert!(robot.online);

        let missing = get_robot(State(app), Path("nope".to_string())).await;
        assert_eq!(missing.unwrap_err(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_map_and_health() {
        let app = app();
        app.views.store().replace(fleet(4));
        let Json(map) = get_map(State(app.clone())).await;
        assert_eq!(map.markers.len(), 4);
        assert_eq!(map.center, GeoPoint::new(41.0, -74.0));

        let Json(health) = get_system_health(State(app)).await;
        assert_eq!(health.snapshot_revision, 1);
        assert_eq!(health.robots_tracked, 4);
    }
}
