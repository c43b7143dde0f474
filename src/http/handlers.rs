use super::error::ApiError;
use super::state::AppState;
use crate::recording::{Recording, RecordingId};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::info;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

fn parse_id(raw: &str) -> Result<RecordingId, ApiError> {
    raw.parse::<RecordingId>()
        .map_err(|_| ApiError::BadRequest("Invalid recording ID".to_string()))
}

/// `inline` disposition naming the file, without anything that cannot sit in a quoted header value
fn content_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();

    if safe.trim().is_empty() {
        "inline".to_string()
    } else {
        format!("inline; filename=\"{}\"", safe)
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/recordings
pub async fn list_recordings(State(state): State<AppState>) -> Json<Vec<Recording>> {
    Json(state.store.list().await)
}

/// GET /api/recordings/:id
pub async fn get_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Recording>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.store.get(id).await?))
}

/// DELETE /api/recordings/:id
pub async fn delete_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id)?;

    info!("Deleting recording {}", id);
    state.store.delete(id).await?;

    Ok(Json(MessageResponse {
        message: "Recording deleted".to_string(),
    }))
}

/// GET /api/recordings/:id/audio
/// Stream the finished WAV file
pub async fn stream_audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let location = state.store.audio_location(id).await?;

    let disposition = content_disposition(&location.recording.filename);
    let body = Body::from_stream(ReaderStream::new(location.stream.reader));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (header::CONTENT_LENGTH, location.stream.size_bytes.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// GET /api/health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Fallback for unknown routes
pub async fn not_found() -> impl IntoResponse {
    ApiError::RouteNotFound
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_content_disposition_strips_unsafe_characters() {
        assert_eq!(
            content_disposition("session.wav"),
            "inline; filename=\"session.wav\""
        );
        assert_eq!(
            content_disposition("evil\r\nSet-Cookie: x=1\".wav"),
            "inline; filename=\"evilSet-Cookie: x=1.wav\""
        );
        assert_eq!(content_disposition("\u{7}\t\n"), "inline");

        for name in ["a\u{0}b.wav", "tab\there.wav", "Séance №3.wav", "\\\"\r"] {
            assert!(HeaderValue::try_from(content_disposition(name)).is_ok(), "{:?}", name);
        }
    }
}
