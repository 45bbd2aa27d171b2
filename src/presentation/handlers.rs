// HTTP request handlers
use crate::application::messages::Message;
use crate::application::ripple_service::RippleStatus;
use crate::application::sequencer::{StatusReport, StopResponse};
use crate::domain::adapter::AdapterProfile;
use crate::domain::record::{RecordEntry, RippleRecord, TestRecord};
use crate::domain::settings::TestSettings;
use crate::infrastructure::chunked_json::{chunked_json_stream, feed_stream};
use crate::infrastructure::http_response::ApiError;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Deserialize)]
pub struct ConstantLoadRequest {
    pub amps: f64,
}

#[derive(Deserialize)]
pub struct RippleRequest {
    pub expected_voltage: f64,
    pub tolerance_percent: f64,
    pub duration_secs: u32,
}

#[derive(Serialize)]
pub struct StopBody {
    pub response: StopResponse,
}

#[derive(Serialize)]
pub struct AdapterList {
    pub profiles: Vec<AdapterProfile>,
    pub selected: Option<AdapterProfile>,
}

#[derive(Serialize)]
pub struct Deleted {
    pub deleted: String,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusReport> {
    Json(state.tester.status())
}

pub async fn start_test(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    state.tester.start()?;
    Ok((StatusCode::ACCEPTED, Json(state.tester.status())).into_response())
}

pub async fn stop_test(State(state): State<Arc<AppState>>) -> Json<StopBody> {
    Json(StopBody {
        response: state.tester.stop(),
    })
}

pub async fn constant_load(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConstantLoadRequest>,
) -> Result<Response, ApiError> {
    state.tester.start_constant_load(request.amps)?;
    Ok((StatusCode::ACCEPTED, Json(state.tester.status())).into_response())
}

pub async fn calibrate(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    state.tester.calibrate()?;
    Ok((StatusCode::ACCEPTED, Json(state.tester.status())).into_response())
}

pub async fn messages(State(state): State<Arc<AppState>>) -> Json<Vec<Message>> {
    Json(state.bench.feed().recent())
}

/// Newline-delimited JSON: recent history, then live entries.
pub async fn stream_messages(State(state): State<Arc<AppState>>) -> Response {
    let feed = state.bench.feed();
    // subscribe first: an entry may repeat but none is lost
    let rx = feed.subscribe();
    let history = feed.recent();
    match chunked_json_stream(feed_stream(history, rx)) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

pub async fn list_adapters(State(state): State<Arc<AppState>>) -> Json<AdapterList> {
    Json(AdapterList {
        profiles: state.adapters.list(),
        selected: state.adapters.selected().map(|p| p.as_ref().clone()),
    })
}

pub async fn add_adapter(
    State(state): State<Arc<AppState>>,
    Json(profile): Json<AdapterProfile>,
) -> Result<Response, ApiError> {
    state.adapters.add(profile).await?;
    Ok((StatusCode::CREATED, Json(state.adapters.list())).into_response())
}

pub async fn delete_adapter(
    Path(index): Path<usize>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<AdapterProfile> {
    Ok(Json(state.adapters.delete(index).await?))
}

pub async fn select_adapter(
    Path(index): Path<usize>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<AdapterProfile> {
    let profile = state.adapters.select(index)?;
    Ok(Json(profile.as_ref().clone()))
}

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<TestSettings> {
    Json(state.settings.current())
}

pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<TestSettings>,
) -> ApiResult<TestSettings> {
    Ok(Json(state.settings.update(settings).await?))
}

pub async fn list_tests(State(state): State<Arc<AppState>>) -> ApiResult<Vec<RecordEntry>> {
    Ok(Json(state.tester.list_records().await?))
}

pub async fn get_test(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<TestRecord> {
    Ok(Json(state.tester.load_record(&id).await?))
}

pub async fn delete_test(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Deleted> {
    state.tester.delete_record(&id).await?;
    Ok(Json(Deleted { deleted: id }))
}

pub async fn ripple_status(State(state): State<Arc<AppState>>) -> Json<RippleStatus> {
    Json(state.ripple.status())
}

pub async fn start_ripple(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RippleRequest>,
) -> Result<Response, ApiError> {
    state.ripple.start(
        request.expected_voltage,
        request.tolerance_percent,
        request.duration_secs,
    )?;
    Ok((StatusCode::ACCEPTED, Json(state.ripple.status())).into_response())
}

pub async fn unselect_ripple(State(state): State<Arc<AppState>>) -> ApiResult<RippleStatus> {
    state.ripple.unselect()?;
    Ok(Json(state.ripple.status()))
}

pub async fn delete_ripple(State(state): State<Arc<AppState>>) -> ApiResult<Deleted> {
    let deleted = state.ripple.delete().await?;
    Ok(Json(Deleted { deleted }))
}

pub async fn list_ripples(State(state): State<Arc<AppState>>) -> ApiResult<Vec<RecordEntry>> {
    Ok(Json(state.ripple.list().await?))
}

pub async fn load_ripple(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<RippleRecord> {
    Ok(Json(state.ripple.load(&id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::adapter_service::AdapterService;
    use crate::application::bench::Bench;
    use crate::application::ripple_service::RippleSequencer;
    use crate::application::sequencer::TesterService;
    use crate::application::settings_service::SettingsService;
    use crate::domain::calibration::CalibrationTable;
    use crate::infrastructure::config::TomlSettingsStore;
    use crate::infrastructure::profile_store::{JsonCalibrationStore, JsonProfileStore};
    use crate::infrastructure::record_store::JsonRecordStore;
    use crate::infrastructure::simulated_hardware::SimulatedHardware;
    use std::time::Duration;

    fn state(dir: &tempfile::TempDir) -> Arc<AppState> {
        let bench = Arc::new(Bench::new(
            Arc::new(SimulatedHardware::default()),
            Duration::from_millis(100),
        ));
        let records = Arc::new(JsonRecordStore::new(dir.path().join("records")));
        let adapters = Arc::new(AdapterService::new(Arc::new(JsonProfileStore::new(
            dir.path().join("adapters.json"),
        ))));
        let settings = Arc::new(SettingsService::new(
            Arc::new(TomlSettingsStore::new(dir.path().join("settings.toml"))),
            bench.clone(),
            TestSettings::default(),
        ));
        let tester = Arc::new(TesterService::new(
            bench.clone(),
            adapters.clone(),
            settings.clone(),
            records.clone(),
            Arc::new(JsonCalibrationStore::new(dir.path().join("calibration.json"))),
            CalibrationTable::default(),
        ));
        let ripple = Arc::new(RippleSequencer::new(bench.clone(), records));
        Arc::new(AppState {
            bench,
            tester,
            ripple,
            adapters,
            settings,
        })
    }

    #[tokio::test]
    async fn test_start_without_adapter_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        state.bench.set_connected(true);

        let Err(err) = start_test(State(state)).await else {
            panic!("start should be refused");
        };
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_bad_ripple_voltage_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let request = RippleRequest {
            expected_voltage: 20.0,
            tolerance_percent: 10.0,
            duration_secs: 30,
        };

        let Err(err) = start_ripple(State(state(&dir)), Json(request)).await else {
            panic!("a 20 V expectation should be refused");
        };
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = get_test(Path("ACME-20260101-001-AAAA".to_string()), State(state(&dir)))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stop_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        let body = stop_test(State(state(&dir))).await;
        assert_eq!(body.response, StopResponse::Idle);
    }
}
