use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Process-unique recording identifier
pub type RecordingId = i64;

/// Capture lifecycle of a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    #[default]
    Recording,
    Completed,
    Failed,
}

impl CaptureStatus {
    /// Whether the capture state machine allows `self -> next`
    pub fn can_transition_to(self, next: CaptureStatus) -> bool {
        matches!(
            (self, next),
            (CaptureStatus::Recording, CaptureStatus::Completed)
                | (CaptureStatus::Recording, CaptureStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, CaptureStatus::Recording)
    }
}

impl Display for CaptureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            CaptureStatus::Recording => "recording",
            CaptureStatus::Completed => "completed",
            CaptureStatus::Failed => "failed",
        };
        write!(f, "{}", status)
    }
}

impl FromStr for CaptureStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recording" => Ok(CaptureStatus::Recording),
            "completed" => Ok(CaptureStatus::Completed),
            "failed" => Ok(CaptureStatus::Failed),
            other => Err(format!("unknown capture status: {}", other)),
        }
    }
}

/// Lifecycle of the transcript derived from a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TranscriptionStatus {
    /// Whether the transcription state machine allows `self -> next`
    ///
    /// Only `pending -> processing -> {completed, failed}` is accepted.
    pub fn can_transition_to(self, next: TranscriptionStatus) -> bool {
        matches!(
            (self, next),
            (TranscriptionStatus::Pending, TranscriptionStatus::Processing)
                | (TranscriptionStatus::Processing, TranscriptionStatus::Completed)
                | (TranscriptionStatus::Processing, TranscriptionStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TranscriptionStatus::Completed | TranscriptionStatus::Failed
        )
    }
}

impl Display for TranscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            TranscriptionStatus::Pending => "pending",
            TranscriptionStatus::Processing => "processing",
            TranscriptionStatus::Completed => "completed",
            TranscriptionStatus::Failed => "failed",
        };
        write!(f, "{}", status)
    }
}

impl FromStr for TranscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TranscriptionStatus::Pending),
            "processing" => Ok(TranscriptionStatus::Processing),
            "completed" => Ok(TranscriptionStatus::Completed),
            "failed" => Ok(TranscriptionStatus::Failed),
            other => Err(format!("unknown transcription status: {}", other)),
        }
    }
}

/// Metadata for one captured audio session
///
/// Values handed out by the store are snapshots; editing them has no effect on stored state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: RecordingId,

    /// Opaque key chosen by the capture process
    pub file_id: String,

    pub filename: String,

    /// Location of the backing audio file
    pub file_path: String,

    /// 0 until the capture completes
    pub duration_seconds: f64,

    /// 0 until the capture completes
    pub file_size_bytes: u64,

    pub status: CaptureStatus,

    pub created_at: DateTime<Utc>,

    /// Set when the capture reaches `completed` or `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Written only by the transcription tracker
    pub transcription_status: TranscriptionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Parameters the capture process supplies when a session starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecording {
    pub file_id: String,
    pub filename: String,
    pub file_path: String,
}

impl NewRecording {
    pub fn new(
        file_id: impl Into<String>,
        filename: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            filename: filename.into(),
            file_path: file_path.into(),
        }
    }

    /// Same as [`NewRecording::new`] with a freshly minted UUID as `file_id`
    pub fn generated(filename: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), filename, file_path)
    }
}

/// How a capture session ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureOutcome {
    Completed {
        duration_seconds: f64,
        file_size_bytes: u64,
    },
    Failed,
}

impl CaptureOutcome {
    pub fn status(&self) -> CaptureStatus {
        match self {
            CaptureOutcome::Completed { .. } => CaptureStatus::Completed,
            CaptureOutcome::Failed => CaptureStatus::Failed,
        }
    }
}
