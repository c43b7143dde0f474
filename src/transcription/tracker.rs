use crate::recording::{
    CaptureStatus, RecordingId, RecordingStore, StoreError, StoreResult, TranscriptionStatus,
};
use tracing::info;

/// Sole writer of `Recording::transcription_status`
///
/// Updates take the same per-recording lock as capture finalization and deletion, so the
/// capture precondition and the transition check see the state they are applied to.
#[derive(Clone)]
pub struct TranscriptionTracker {
    store: RecordingStore,
}

impl TranscriptionTracker {
    pub fn new(store: RecordingStore) -> Self {
        Self { store }
    }

    /// Advance the transcription state of a recording
    ///
    /// Checks, in order: the recording exists, its capture is `completed`, and the
    /// transcription transition is in the table.
    pub async fn set_status(&self, id: RecordingId, status: TranscriptionStatus) -> StoreResult<()> {
        let previous = self
            .store
            .mutate(id, move |recording| {
                if recording.status != CaptureStatus::Completed {
                    return Err(StoreError::PreconditionFailed(format!(
                        "recording {} capture is {}, transcription needs a completed capture",
                        recording.id, recording.status
                    )));
                }

                let current = recording.transcription_status;
                if !current.can_transition_to(status) {
                    return Err(StoreError::InvalidTransition {
                        machine: "transcription",
                        from: current.to_string(),
                        to: status.to_string(),
                    });
                }

                recording.transcription_status = status;
                Ok(current)
            })
            .await?;

        info!(
            "Recording {} transcription {} -> {}",
            id, previous, status
        );
        Ok(())
    }

    pub async fn get_status(&self, id: RecordingId) -> StoreResult<TranscriptionStatus> {
        Ok(self.store.get(id).await?.transcription_status)
    }
}
