use super::messages::{CaptureEvent, NotesMessage, TranscriptionStatusMessage};
use crate::recording::{
    CaptureOutcome, NewRecording, Recording, RecordingStore, StoreResult,
};
use crate::transcription::TranscriptionTracker;

/// Apply one capture event to the store
pub async fn apply_capture_event(
    store: &RecordingStore,
    event: CaptureEvent,
) -> StoreResult<Recording> {
    match event {
        CaptureEvent::Started {
            file_id,
            filename,
            file_path,
        } => {
            store
                .create(NewRecording::new(file_id, filename, file_path))
                .await
        }
        CaptureEvent::Completed {
            file_id,
            duration_seconds,
            file_size_bytes,
        } => {
            let recording = store.get_by_file_id(&file_id).await?;
            match (duration_seconds, file_size_bytes) {
                (Some(duration_seconds), Some(file_size_bytes)) => {
                    store
                        .finalize(
                            recording.id,
                            CaptureOutcome::Completed {
                                duration_seconds,
                                file_size_bytes,
                            },
                        )
                        .await
                }
                _ => store.complete_from_file(recording.id).await,
            }
        }
        CaptureEvent::Failed { file_id } => {
            let recording = store.get_by_file_id(&file_id).await?;
            store.fail(recording.id).await
        }
    }
}

pub async fn apply_transcription_status(
    tracker: &TranscriptionTracker,
    msg: TranscriptionStatusMessage,
) -> StoreResult<()> {
    tracker.set_status(msg.recording_id, msg.status).await
}

pub async fn apply_notes(store: &RecordingStore, msg: NotesMessage) -> StoreResult<Recording> {
    store.set_notes(msg.recording_id, msg.notes).await
}
