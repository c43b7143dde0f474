pub mod audio;
pub mod config;
pub mod http;
pub mod nats;
pub mod recording;
pub mod transcription;

pub use audio::{AudioFile, AudioStorage, AudioStream, LocalDiskStorage};
pub use config::Config;
pub use http::{create_router, AppState};
pub use nats::{CaptureEvent, NatsClient, NotesMessage, TranscriptionStatusMessage};
pub use recording::{
    AudioLocation, AudioUnavailableReason, CaptureOutcome, CaptureStatus, NewRecording, Recording,
    RecordingDb, RecordingId, RecordingStore, StoreError, StoreResult, TranscriptionStatus,
};
pub use transcription::TranscriptionTracker;
