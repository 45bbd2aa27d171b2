// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use axum::{routing::{delete, get, post}, Router};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::acquisition::run_acquisition;
use crate::application::adapter_service::AdapterService;
use crate::application::bench::Bench;
use crate::application::repositories::{CalibrationRepository, RecordRepository};
use crate::application::ripple_service::RippleSequencer;
use crate::application::sequencer::TesterService;
use crate::application::settings_service::SettingsService;
use crate::infrastructure::config::{load_app_config, startup_settings, TomlSettingsStore};
use crate::infrastructure::profile_store::{JsonCalibrationStore, JsonProfileStore};
use crate::infrastructure::record_store::JsonRecordStore;
use crate::infrastructure::simulated_hardware::SimulatedHardware;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_app_config()?;
    let storage = &config.storage;

    // Stores (infrastructure layer)
    let records: Arc<dyn RecordRepository> = Arc::new(JsonRecordStore::new(storage.records_dir()));
    let profiles = Arc::new(JsonProfileStore::new(storage.adapters_file()));
    let calibration_store: Arc<dyn CalibrationRepository> =
        Arc::new(JsonCalibrationStore::new(storage.calibration_file()));
    let settings_store = Arc::new(TomlSettingsStore::new(storage.settings_file()));

    let test_settings = startup_settings(settings_store.as_ref(), config.test).await;
    let hardware = Arc::new(SimulatedHardware::new(config.simulator.clone()));
    let bench = Arc::new(Bench::new(hardware, test_settings.sample_interval()));

    // Services (application layer)
    let adapters = Arc::new(AdapterService::new(profiles));
    match adapters.load().await {
        Ok(count) => tracing::info!("{} adapter profiles available", count),
        Err(e) => tracing::warn!("could not load adapter profiles: {}", e),
    }

    let settings = Arc::new(SettingsService::new(settings_store, bench.clone(), test_settings));
    settings.apply()?;

    let table = match calibration_store.load().await {
        Ok(table) => table,
        Err(e) => {
            tracing::warn!("could not load calibration: {}", e);
            Default::default()
        }
    };
    if table.is_empty() {
        bench.feed().warn("Load is not calibrated, run a calibration before testing");
    }

    let tester = Arc::new(TesterService::new(
        bench.clone(),
        adapters.clone(),
        settings.clone(),
        records.clone(),
        calibration_store,
        table,
    ));
    let ripple = Arc::new(RippleSequencer::new(bench.clone(), records));

    let acquisition = tokio::spawn(run_acquisition(bench.clone()));
    let ripple_clock = tokio::spawn(tick_ripple(ripple.clone()));

    let state = Arc::new(AppState {
        bench,
        tester: tester.clone(),
        ripple: ripple.clone(),
        adapters,
        settings,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(handlers::health_check))
        .route("/status", get(handlers::status))
        .route("/test/start", post(handlers::start_test))
        .route("/test/stop", post(handlers::stop_test))
        .route("/test/constant-load", post(handlers::constant_load))
        .route("/calibration", post(handlers::calibrate))
        .route("/messages", get(handlers::messages))
        .route("/messages/stream", get(handlers::stream_messages))
        .route("/adapters", get(handlers::list_adapters).post(handlers::add_adapter))
        .route("/adapters/:index", delete(handlers::delete_adapter))
        .route("/adapters/:index/select", post(handlers::select_adapter))
        .route("/settings", get(handlers::get_settings).put(handlers::put_settings))
        .route("/tests", get(handlers::list_tests))
        .route("/tests/:id", get(handlers::get_test).delete(handlers::delete_test))
        .route("/ripple", get(handlers::ripple_status).delete(handlers::delete_ripple))
        .route("/ripple/start", post(handlers::start_ripple))
        .route("/ripple/unselect", post(handlers::unselect_ripple))
        .route("/ripple/records", get(handlers::list_ripples))
        .route("/ripple/records/:id/load", post(handlers::load_ripple))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!("Starting adapter-tester service on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("could not listen for ctrl-c: {}", e);
            }
            tracing::info!("shutting down");
            if let Err(e) = ripple.unselect() {
                tracing::debug!("ripple: {}", e);
            }
            tester.shutdown().await;
        })
        .await?;

    ripple_clock.abort();
    match acquisition.await {
        Ok(Err(fault)) => tracing::error!("acquisition stopped on fault: {}", fault),
        Err(e) => tracing::error!("acquisition task failed: {}", e),
        Ok(Ok(())) => {}
    }
    Ok(())
}

/// Drives the ripple capture clock once per second.
async fn tick_ripple(ripple: Arc<RippleSequencer>) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(e) = ripple.tick().await {
            tracing::warn!("ripple test: {}", e);
        }
    }
}
