use super::dispatch::{apply_capture_event, apply_notes, apply_transcription_status};
use super::messages::{
    CaptureEvent, NotesMessage, TranscriptionStatusMessage, CAPTURE_SUBJECT, NOTES_SUBJECT,
    TRANSCRIPTION_SUBJECT,
};
use crate::recording::RecordingStore;
use crate::transcription::TranscriptionTracker;
use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use futures::stream::StreamExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    async fn subscribe(&self, subject: &'static str) -> Result<Subscriber> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .with_context(|| format!("Failed to subscribe to {}", subject))?;

        info!("Subscribed to {}", subject);
        Ok(subscriber)
    }

    /// Spawn one listener task per collaborator subject
    ///
    /// Malformed payloads and rejected updates are logged and skipped; listeners run until the
    /// subscription closes.
    pub async fn spawn_listeners(
        &self,
        store: RecordingStore,
        tracker: TranscriptionTracker,
    ) -> Result<Vec<JoinHandle<()>>> {
        let mut capture_sub = self.subscribe(CAPTURE_SUBJECT).await?;
        let mut transcription_sub = self.subscribe(TRANSCRIPTION_SUBJECT).await?;
        let mut notes_sub = self.subscribe(NOTES_SUBJECT).await?;

        let capture_store = store.clone();
        let capture_task = tokio::spawn(async move {
            while let Some(msg) = capture_sub.next().await {
                match serde_json::from_slice::<CaptureEvent>(&msg.payload) {
                    Ok(event) => {
                        let file_id = event.file_id().to_string();
                        if let Err(e) = apply_capture_event(&capture_store, event).await {
                            warn!("Capture event for {} rejected: {}", file_id, e);
                        }
                    }
                    Err(e) => error!("Failed to parse capture event: {}", e),
                }
            }
            info!("Capture listener stopped");
        });

        let transcription_task = tokio::spawn(async move {
            while let Some(msg) = transcription_sub.next().await {
                match serde_json::from_slice::<TranscriptionStatusMessage>(&msg.payload) {
                    Ok(update) => {
                        let id = update.recording_id;
                        if let Err(e) = apply_transcription_status(&tracker, update).await {
                            warn!("Transcription update for recording {} rejected: {}", id, e);
                        }
                    }
                    Err(e) => error!("Failed to parse transcription status: {}", e),
                }
            }
            info!("Transcription listener stopped");
        });

        let notes_task = tokio::spawn(async move {
            while let Some(msg) = notes_sub.next().await {
                match serde_json::from_slice::<NotesMessage>(&msg.payload) {
                    Ok(update) => {
                        let id = update.recording_id;
                        if let Err(e) = apply_notes(&store, update).await {
                            warn!("Notes update for recording {} rejected: {}", id, e);
                        }
                    }
                    Err(e) => error!("Failed to parse notes message: {}", e),
                }
            }
            info!("Notes listener stopped");
        });

        Ok(vec![capture_task, transcription_task, notes_task])
    }
}
