//! Recording metadata and its capture lifecycle
//!
//! - `model`: `Recording` plus the two status enums and their transition tables
//! - `store`: `RecordingStore`, the per-recording locked datastore
//! - `db`: `RecordingDb`, the SQLite table the store writes through to
//! - `error`: `StoreError`, shared with the transcription tracker

mod db;
mod error;
mod model;
mod store;

pub use db::RecordingDb;
pub use error::{AudioUnavailableReason, StoreError, StoreResult};
pub use model::{
    CaptureOutcome, CaptureStatus, NewRecording, Recording, RecordingId, TranscriptionStatus,
};
pub use store::{AudioLocation, RecordingStore, DEFAULT_STORAGE_TIMEOUT};
