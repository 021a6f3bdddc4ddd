mod auth;
mod config;
mod dto;
mod error;
mod routes;
mod state;

use anyhow::Result;
use config::Config;
use dashmap::DashMap;
use envconfig::Envconfig;
use labtasker_core::clock::SystemClock;
use labtasker_core::{Engine, EventBus};
use labtasker_store_postgres::PgStore;
use metrics_exporter_prometheus::PrometheusBuilder;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

async fn reaper_loop(engine: Arc<Engine>, period_secs: u64, scan_limit: usize) {
    let mut interval = tokio::time::interval(Duration::from_secs(period_secs));
    loop {
        interval.tick().await;
        match engine.run_reaper_once(scan_limit).await {
            Ok(report) => {
                if report.terminated > 0 || report.requeued > 0 {
                    info!(
                        scanned = report.scanned,
                        requeued = report.requeued,
                        terminated = report.terminated,
                        workers_crashed = report.workers_crashed,
                        "reaper swept stale leases"
                    );
                }
            }
            Err(e) => error!("reaper sweep failed: {e}"),
        }
    }
}

async fn listen(app: axum::Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("listening on {bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let store = PgStore::connect(&config.pool_config())
        .await
        .expect("failed to connect to postgres");
    store
        .run_migrations()
        .await
        .expect("failed to run database migrations");

    let bus = Arc::new(EventBus::new(config.event_buffer_size));
    let clock: labtasker_core::SharedClock = Arc::new(SystemClock);
    let store: Arc<dyn labtasker_core::StoreAdapter> = Arc::new(store);
    let engine = Arc::new(Engine::new(store, bus, clock));

    let state = AppState {
        engine: engine.clone(),
        subscriptions: Arc::new(DashMap::new()),
    };

    let mut app = routes::app(state).layer(TraceLayer::new_for_http());
    let prometheus_handle = config.metrics_enabled.then(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install prometheus recorder")
    });
    if let Some(handle) = prometheus_handle {
        app = app.route(
            "/metrics",
            axum::routing::get(move || std::future::ready(handle.render())),
        );
    }

    let reaper = tokio::spawn(reaper_loop(
        engine,
        config.heartbeat_reaper_period_secs,
        config.reaper_scan_limit,
    ));
    let server = tokio::spawn(listen(app, config.bind_addr()));

    tokio::select! {
        res = reaper => {
            error!("reaper loop exited");
            if let Err(e) = res {
                error!("reaper task panicked: {e}");
            }
        }
        res = server => {
            error!("http server exited");
            if let Err(e) = res {
                error!("http server task panicked: {e}");
            }
        }
    }

    info!("exiting");
    Ok(())
}
