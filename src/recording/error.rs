use super::model::{CaptureStatus, RecordingId};
use std::fmt::Display;
use thiserror::Error;

/// Why the audio of an existing recording cannot be served
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioUnavailableReason {
    /// Capture has not produced a finished file
    NotReady(CaptureStatus),
    /// Capture completed but the file is gone from storage
    Missing,
}

impl Display for AudioUnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioUnavailableReason::NotReady(status) => {
                write!(f, "recording is {}, no finished audio yet", status)
            }
            AudioUnavailableReason::Missing => write!(f, "audio file is missing from storage"),
        }
    }
}

/// Errors raised by the recording store and transcription tracker
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Recording {0} not found")]
    NotFound(String),

    #[error("Invalid {machine} transition from {from} to {to}")]
    InvalidTransition {
        machine: &'static str,
        from: String,
        to: String,
    },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Audio unavailable for recording {id}: {reason}")]
    AudioUnavailable {
        id: RecordingId,
        reason: AudioUnavailableReason,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StoreError {
    pub fn not_found(id: RecordingId) -> Self {
        StoreError::NotFound(id.to_string())
    }

    pub fn capture_transition(from: CaptureStatus, to: CaptureStatus) -> Self {
        StoreError::InvalidTransition {
            machine: "capture",
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Only transient failures are safe to retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    /// A completed recording whose file vanished; needs operator attention
    pub fn is_integrity_fault(&self) -> bool {
        matches!(
            self,
            StoreError::AudioUnavailable {
                reason: AudioUnavailableReason::Missing,
                ..
            }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
