use crate::recording::{AudioUnavailableReason, StoreError};
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Errors surfaced by the management API
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request (bad id, etc.)
    BadRequest(String),
    /// No route matched
    RouteNotFound,
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            ApiError::Store(err) => match err {
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::AudioUnavailable { reason, .. } => match reason {
                    AudioUnavailableReason::NotReady(_) => StatusCode::CONFLICT,
                    AudioUnavailableReason::Missing => StatusCode::NOT_FOUND,
                },
                StoreError::InvalidTransition { .. } | StoreError::Conflict(_) => {
                    StatusCode::CONFLICT
                }
                StoreError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
                StoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                StoreError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::RouteNotFound => "Not found".to_string(),
            ApiError::Store(StoreError::NotFound(_)) => "Recording not found".to_string(),
            ApiError::Store(StoreError::AudioUnavailable { reason, .. }) => match reason {
                AudioUnavailableReason::NotReady(status) => {
                    format!("Audio not available: recording is {}", status)
                }
                AudioUnavailableReason::Missing => "Audio file not found".to_string(),
            },
            ApiError::Store(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let ApiError::Store(err) = &self {
            if err.is_integrity_fault() || status.is_server_error() {
                error!("Request failed with {}: {}", status, err);
            }
        }

        let body = Json(ErrorResponse {
            error: self.message(),
        });

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return (status, [(header::RETRY_AFTER, "1")], body).into_response();
        }

        (status, body).into_response()
    }
}
