// HTTP response utilities - JSON error bodies and status mapping
use crate::application::adapter_service::AdapterError;
use crate::application::ripple_service::RippleError;
use crate::application::sequencer::StartError;
use crate::application::settings_service::SettingsError;
use crate::domain::error::{HardwareFault, PersistenceFailure, ValidationError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Error returned by every handler, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl ToString) -> Self {
        Self::new(StatusCode::CONFLICT, message.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{} {}", self.status, self.message);
        } else {
            tracing::debug!("{} {}", self.status, self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    }
}

impl From<HardwareFault> for ApiError {
    fn from(e: HardwareFault) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

impl From<PersistenceFailure> for ApiError {
    fn from(e: PersistenceFailure) -> Self {
        let status = match e {
            PersistenceFailure::NotFound(_) => StatusCode::NOT_FOUND,
            PersistenceFailure::IndexOutOfBounds { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<StartError> for ApiError {
    fn from(e: StartError) -> Self {
        match e {
            StartError::Validation(e) => e.into(),
            StartError::Faulted(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            StartError::NotConnected
            | StartError::NoAdapterSelected
            | StartError::NotCalibrated
            | StartError::Busy(_) => Self::conflict(e),
        }
    }
}

impl From<RippleError> for ApiError {
    fn from(e: RippleError) -> Self {
        match e {
            RippleError::Validation(e) => e.into(),
            RippleError::Persistence(e) => e.into(),
            RippleError::NothingSelected => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            RippleError::Busy(_)
            | RippleError::NotConnected
            | RippleError::InProgress(_)
            | RippleError::EmptyCapture => Self::conflict(e),
        }
    }
}

impl From<AdapterError> for ApiError {
    fn from(e: AdapterError) -> Self {
        match e {
            AdapterError::Validation(e) => e.into(),
            AdapterError::Persistence(e) => e.into(),
            AdapterError::UnknownIndex { .. } => Self::new(StatusCode::NOT_FOUND, e.to_string()),
        }
    }
}

impl From<SettingsError> for ApiError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Validation(e) => e.into(),
            SettingsError::Busy(_) => Self::conflict(e),
            SettingsError::Hardware(e) => e.into(),
            SettingsError::Persistence(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::bench::{BenchBusy, BenchUser};

    #[test]
    fn test_status_mapping() {
        let validation: ApiError =
            ValidationError::out_of_range("duration", "between 10 and 120 s", 5.0).into();
        assert_eq!(validation.status, StatusCode::UNPROCESSABLE_ENTITY);

        let busy: ApiError = StartError::Busy(BenchBusy(BenchUser::Ripple)).into();
        assert_eq!(busy.status, StatusCode::CONFLICT);

        let missing: ApiError = PersistenceFailure::NotFound("x".into()).into();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let fault: ApiError = HardwareFault::Sensor("bus".into()).into();
        assert_eq!(fault.status, StatusCode::INTERNAL_SERVER_ERROR);

        let nested: ApiError = RippleError::Validation(ValidationError::Empty { field: "name" }).into();
        assert_eq!(nested.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_error_body_is_json() {
        let response = ApiError::conflict("bench is in use").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "bench is in use");
    }
}
