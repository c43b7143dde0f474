use crate::recording::{RecordingId, TranscriptionStatus};
use serde::{Deserialize, Serialize};

/// Subject the capture process publishes session lifecycle events on
pub const CAPTURE_SUBJECT: &str = "recordings.capture";

/// Subject the transcription worker publishes status changes on
pub const TRANSCRIPTION_SUBJECT: &str = "recordings.transcription";

/// Subject the annotator publishes note edits on
pub const NOTES_SUBJECT: &str = "recordings.notes";

/// Capture lifecycle event, addressed by the capture process's own `file_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CaptureEvent {
    Started {
        file_id: String,
        filename: String,
        file_path: String,
    },
    /// Missing duration or size are read from the WAV file
    Completed {
        file_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_size_bytes: Option<u64>,
    },
    Failed {
        file_id: String,
    },
}

impl CaptureEvent {
    pub fn file_id(&self) -> &str {
        match self {
            CaptureEvent::Started { file_id, .. }
            | CaptureEvent::Completed { file_id, .. }
            | CaptureEvent::Failed { file_id } => file_id,
        }
    }
}

/// Transcription status report from the transcription worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionStatusMessage {
    pub recording_id: RecordingId,
    pub status: TranscriptionStatus,
}

/// Annotation edit; absent `notes` clears the annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotesMessage {
    pub recording_id: RecordingId,
    #[serde(default)]
    pub notes: Option<String>,
}
