/**
 * ROBOFLEET MONITOR - fleet snapshot host process
 *
 * ROLE: wires config, snapshot store, sync driver (HTTP poll or MQTT push),
 * view derivers and the read-only HTTP API, then runs until Ctrl-C.
 *
 * SHUTDOWN: HTTP stops accepting, the sync driver is stopped (an in-flight
 * fetch is dropped), the MQTT task is aborted and subscribers are cleared.
 */

mod config;
mod health;
mod http;
mod mqtt;
mod poll;

use crate::config::{MonitorConfig, SourceMode};
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::poll::HttpSnapshotSource;

use anyhow::{Context, Result};
use robofleet_core::sync::{spawn_feed, spawn_poller};
use robofleet_core::{FleetViews, SnapshotStore, SourceHealth};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("robofleet_monitor=info,robofleet_core=info")),
        )
        .init();

    let cfg = MonitorConfig::from_env();
    info!(
        mode = %cfg.mode,
        page_size = cfg.derivation.page_size,
        low_battery_threshold = cfg.derivation.low_battery_threshold,
        "robofleet monitor starting"
    );

    let store = Arc::new(SnapshotStore::new());
    let views = Arc::new(FleetViews::new(store.clone(), cfg.derivation));

    let source_name = match cfg.mode {
        SourceMode::Poll => "http-poll",
        SourceMode::Push => "mqtt-push",
    };
    let source_health = SourceHealth::new(source_name);
    let health_tracker = HealthTracker::new(cfg.mode, source_health.clone(), cfg.stale_after);

    let _degraded_log = store.subscribe(|snapshot| {
        let degraded = snapshot.robots().iter().filter(|r| r.is_degraded()).count();
        if degraded > 0 {
            warn!(revision = snapshot.revision(), degraded, "snapshot carries degraded records");
        }
    });

    let (sync, mqtt_task) = match cfg.mode {
        SourceMode::Poll => {
            let source = HttpSnapshotSource::new(&cfg.source_url, cfg.poll.fetch_timeout)?;
            info!(
                url = source.url(),
                interval_ms = cfg.poll.interval.as_millis() as u64,
                "polling fleet endpoint"
            );
            let handle = spawn_poller(source, store.clone(), source_health.clone(), cfg.poll);
            (handle, None)
        }
        SourceMode::Push => {
            let (feed, task) = mqtt::spawn_mqtt_feed(&cfg.mqtt, health_tracker.clone());
            let handle = spawn_feed(feed, store.clone(), source_health.clone());
            (handle, Some(task))
        }
    };

    let app = http::build_router(AppState {
        views,
        health_tracker,
    });

    let listener = TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind))?;
    info!("listening on http://{}", cfg.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    info!("shutting down");
    sync.stop().await;
    if let Some(task) = mqtt_task {
        task.abort();
    }
    store.clear_subscribers();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
