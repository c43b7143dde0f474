//! Channel through which the capture process, transcription worker and annotator report state

pub mod client;
pub mod dispatch;
pub mod messages;

pub use client::NatsClient;
pub use dispatch::{apply_capture_event, apply_notes, apply_transcription_status};
pub use messages::{CaptureEvent, NotesMessage, TranscriptionStatusMessage};
