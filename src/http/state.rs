use crate::recording::RecordingStore;
use crate::transcription::TranscriptionTracker;

/// Shared application state for HTTP handlers
///
/// Built once at startup and handed to the router; handlers never reach for globals.
#[derive(Clone)]
pub struct AppState {
    pub store: RecordingStore,
    pub tracker: TranscriptionTracker,
}

impl AppState {
    pub fn new(store: RecordingStore) -> Self {
        let tracker = TranscriptionTracker::new(store.clone());
        Self { store, tracker }
    }
}
