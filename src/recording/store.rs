use super::db::RecordingDb;
use super::error::{AudioUnavailableReason, StoreError, StoreResult};
use super::model::{CaptureOutcome, CaptureStatus, NewRecording, Recording, RecordingId};
use crate::audio::{AudioFile, AudioStorage, AudioStream, LocalDiskStorage};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Default bound on storage calls made while serving a request
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-recording cell. `None` marks a recording deleted while someone still held the cell.
type Slot = Arc<RwLock<Option<Recording>>>;

struct Index {
    by_id: HashMap<RecordingId, Slot>,

    /// Never pruned, so a file_id is never handed to two recordings
    by_file_id: HashMap<String, RecordingId>,

    next_id: RecordingId,

    last_created_at: Option<DateTime<Utc>>,
}

impl Index {
    fn insert(&mut self, recording: Recording) {
        self.next_id = self.next_id.max(recording.id + 1);
        if self.last_created_at.map_or(true, |last| recording.created_at > last) {
            self.last_created_at = Some(recording.created_at);
        }
        self.by_file_id
            .insert(recording.file_id.clone(), recording.id);
        self.by_id
            .insert(recording.id, Arc::new(RwLock::new(Some(recording))));
    }
}

struct StoreInner {
    index: RwLock<Index>,
    storage: Arc<dyn AudioStorage>,
    storage_timeout: Duration,

    /// Write-through persistence; `None` keeps recordings in memory only
    db: Option<RecordingDb>,
}

/// An opened audio file together with the recording it belongs to
#[derive(Debug)]
pub struct AudioLocation {
    pub recording: Recording,
    pub stream: AudioStream,
}

/// Datastore for recordings
///
/// Recordings are served from memory and, when a database is attached, written through to it
/// before a change becomes visible. Every mutation of a recording runs under that recording's
/// own lock inside a spawned task, so mutations on one id are serialized, mutations on
/// different ids only share the index lock for a map lookup, and a caller that goes away
/// mid-request cannot leave half an update behind.
#[derive(Clone)]
pub struct RecordingStore {
    inner: Arc<StoreInner>,
}

impl RecordingStore {
    /// Store without a database; recordings last as long as the process
    pub fn new(storage: Arc<dyn AudioStorage>, storage_timeout: Duration) -> Self {
        Self::build(storage, storage_timeout, None)
    }

    /// Store backed by the local filesystem under `root`
    pub fn with_local_disk(root: impl Into<PathBuf>, storage_timeout: Duration) -> Self {
        Self::new(Arc::new(LocalDiskStorage::new(root)), storage_timeout)
    }

    /// Store persisted in `db`, loaded with every recording it holds
    ///
    /// Deletes that were interrupted by a crash are finished before this returns.
    pub async fn open(
        db: RecordingDb,
        storage: Arc<dyn AudioStorage>,
        storage_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let snapshot = {
            let db = db.clone();
            tokio::task::spawn_blocking(move || db.load()).await??
        };

        let store = Self::build(storage, storage_timeout, Some(db));
        let interrupted: Vec<RecordingId> = snapshot
            .interrupted_deletes
            .iter()
            .map(|r| r.id)
            .collect();
        {
            let mut index = store.inner.index.write().await;
            for (file_id, id) in snapshot.retired {
                index.next_id = index.next_id.max(id + 1);
                index.by_file_id.insert(file_id, id);
            }
            for recording in snapshot
                .recordings
                .into_iter()
                .chain(snapshot.interrupted_deletes)
            {
                index.insert(recording);
            }
            info!("Loaded {} recordings from database", index.by_id.len());
        }

        for id in interrupted {
            match store.delete(id).await {
                Ok(()) => info!("Finished interrupted delete of recording {}", id),
                Err(e) => warn!("Could not finish delete of recording {}: {}", id, e),
            }
        }

        Ok(store)
    }

    fn build(
        storage: Arc<dyn AudioStorage>,
        storage_timeout: Duration,
        db: Option<RecordingDb>,
    ) -> Self {
        info!(
            "Recording store initialized (storage: {}, timeout: {:?}, persistent: {})",
            storage.name(),
            storage_timeout,
            db.is_some()
        );

        Self {
            inner: Arc::new(StoreInner {
                index: RwLock::new(Index {
                    by_id: HashMap::new(),
                    by_file_id: HashMap::new(),
                    next_id: 1,
                    last_created_at: None,
                }),
                storage,
                storage_timeout,
                db,
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// All recordings, most recent first
    pub async fn list(&self) -> Vec<Recording> {
        let slots: Vec<Slot> = {
            let index = self.inner.index.read().await;
            index.by_id.values().cloned().collect()
        };

        let mut recordings = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(recording) = slot.read().await.as_ref() {
                recordings.push(recording.clone());
            }
        }

        recordings.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        recordings
    }

    pub async fn get(&self, id: RecordingId) -> StoreResult<Recording> {
        let slot = self.slot(id).await?;
        let guard = slot.read().await;
        guard.clone().ok_or_else(|| StoreError::not_found(id))
    }

    pub async fn get_by_file_id(&self, file_id: &str) -> StoreResult<Recording> {
        let id = {
            let index = self.inner.index.read().await;
            index.by_file_id.get(file_id).copied()
        };

        match id {
            Some(id) => self
                .get(id)
                .await
                .map_err(|_| StoreError::NotFound(file_id.to_string())),
            None => Err(StoreError::NotFound(file_id.to_string())),
        }
    }

    /// Open the finished audio file of a recording
    ///
    /// Holds the recording's read lock while opening, so a concurrent delete either happens
    /// entirely before (NotFound) or entirely after the file is opened.
    pub async fn audio_location(&self, id: RecordingId) -> StoreResult<AudioLocation> {
        let slot = self.slot(id).await?;
        let guard = slot.read().await;
        let recording = guard.as_ref().ok_or_else(|| StoreError::not_found(id))?;

        if recording.status != CaptureStatus::Completed {
            warn!(
                "Audio requested for recording {} which is still {}",
                id, recording.status
            );
            return Err(StoreError::AudioUnavailable {
                id,
                reason: AudioUnavailableReason::NotReady(recording.status),
            });
        }

        let path = PathBuf::from(&recording.file_path);
        let opened =
            tokio::time::timeout(self.inner.storage_timeout, self.inner.storage.open(&path)).await;

        match opened {
            Ok(Ok(stream)) => {
                debug!(
                    "Opened audio for recording {} ({} bytes)",
                    id, stream.size_bytes
                );
                Ok(AudioLocation {
                    recording: recording.clone(),
                    stream,
                })
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                error!(
                    "Integrity fault: recording {} is completed but its audio file {} is missing",
                    id,
                    path.display()
                );
                Err(StoreError::AudioUnavailable {
                    id,
                    reason: AudioUnavailableReason::Missing,
                })
            }
            Ok(Err(e)) => {
                error!("Failed to open audio for recording {}: {}", id, e);
                Err(StoreError::Transient(format!(
                    "failed to open audio file: {}",
                    e
                )))
            }
            Err(_) => {
                warn!(
                    "Timed out after {:?} opening audio for recording {}",
                    self.inner.storage_timeout, id
                );
                Err(StoreError::Transient(
                    "timed out opening audio file".to_string(),
                ))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Capture-side operations
    // ------------------------------------------------------------------------

    /// Register a capture that just started
    ///
    /// `file_path` must lie inside the audio storage; it is stored in resolved form.
    pub async fn create(&self, params: NewRecording) -> StoreResult<Recording> {
        if params.file_id.trim().is_empty() {
            return Err(StoreError::InvalidInput("file_id must not be empty".into()));
        }
        if params.file_path.trim().is_empty() {
            return Err(StoreError::InvalidInput("file_path must not be empty".into()));
        }
        let file_path = self
            .inner
            .storage
            .resolve(Path::new(&params.file_path))
            .ok_or_else(|| {
                warn!(
                    "Rejected recording {}: {} is outside {} storage",
                    params.file_id,
                    params.file_path,
                    self.inner.storage.name()
                );
                StoreError::InvalidInput(format!(
                    "file_path {} is outside the recordings directory",
                    params.file_path
                ))
            })?;

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let mut index = inner.index.write().await;

            if let Some(existing) = index.by_file_id.get(&params.file_id) {
                return Err(StoreError::Conflict(format!(
                    "file_id {} already belongs to recording {}",
                    params.file_id, existing
                )));
            }

            // Keep creation times strictly increasing so list order is total
            let mut created_at = Utc::now();
            if let Some(last) = index.last_created_at {
                if created_at <= last {
                    created_at = last + chrono::Duration::microseconds(1);
                }
            }

            let recording = Recording {
                id: index.next_id,
                file_id: params.file_id,
                filename: params.filename,
                file_path: file_path.to_string_lossy().into_owned(),
                duration_seconds: 0.0,
                file_size_bytes: 0,
                status: CaptureStatus::Recording,
                created_at,
                completed_at: None,
                transcription_status: Default::default(),
                notes: None,
            };

            let row = recording.clone();
            persist(&inner, move |db| db.insert(&row)).await?;
            index.insert(recording.clone());

            info!(
                "Created recording {} (file_id={}, path={})",
                recording.id, recording.file_id, recording.file_path
            );
            Ok::<Recording, StoreError>(recording)
        });

        task.await
            .map_err(|e| StoreError::Transient(format!("create task failed: {}", e)))?
    }

    /// Move a capture into its terminal state
    pub async fn finalize(
        &self,
        id: RecordingId,
        outcome: CaptureOutcome,
    ) -> StoreResult<Recording> {
        if let CaptureOutcome::Completed {
            duration_seconds, ..
        } = outcome
        {
            if !duration_seconds.is_finite() || duration_seconds < 0.0 {
                return Err(StoreError::InvalidInput(format!(
                    "duration_seconds must be a non-negative number, got {}",
                    duration_seconds
                )));
            }
        }

        let recording = self
            .mutate(id, move |recording| {
                let next = outcome.status();
                if !recording.status.can_transition_to(next) {
                    return Err(StoreError::capture_transition(recording.status, next));
                }

                recording.status = next;
                recording.completed_at = Some(completion_time(recording.created_at));
                if let CaptureOutcome::Completed {
                    duration_seconds,
                    file_size_bytes,
                } = outcome
                {
                    recording.duration_seconds = duration_seconds;
                    recording.file_size_bytes = file_size_bytes;
                }

                Ok(recording.clone())
            })
            .await?;

        info!(
            "Recording {} finalized as {} ({:.1}s, {} bytes)",
            id, recording.status, recording.duration_seconds, recording.file_size_bytes
        );

        Ok(recording)
    }

    pub async fn complete(
        &self,
        id: RecordingId,
        duration_seconds: f64,
        file_size_bytes: u64,
    ) -> StoreResult<Recording> {
        self.finalize(
            id,
            CaptureOutcome::Completed {
                duration_seconds,
                file_size_bytes,
            },
        )
        .await
    }

    pub async fn fail(&self, id: RecordingId) -> StoreResult<Recording> {
        self.finalize(id, CaptureOutcome::Failed).await
    }

    /// Complete a recording with duration and size read from its WAV file
    pub async fn complete_from_file(&self, id: RecordingId) -> StoreResult<Recording> {
        let recording = self.get(id).await?;
        if recording.status.is_terminal() {
            return Err(StoreError::capture_transition(
                recording.status,
                CaptureStatus::Completed,
            ));
        }

        let path = recording.file_path.clone();
        let header = tokio::task::spawn_blocking(move || AudioFile::inspect(&path))
            .await
            .map_err(|e| StoreError::Transient(format!("audio inspection task failed: {}", e)))?
            .map_err(|e| {
                StoreError::PreconditionFailed(format!(
                    "audio file of recording {} could not be read: {:#}",
                    id, e
                ))
            })?;

        self.complete(id, header.duration_seconds, header.file_size_bytes)
            .await
    }

    /// Replace the free-text annotation; allowed in any state
    pub async fn set_notes(&self, id: RecordingId, notes: Option<String>) -> StoreResult<Recording> {
        let recording = self
            .mutate(id, move |recording| {
                recording.notes = notes;
                Ok(recording.clone())
            })
            .await?;

        debug!("Updated notes on recording {}", id);
        Ok(recording)
    }

    // ------------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------------

    /// Remove a recording and its audio file
    ///
    /// The file goes first and the removal always runs to completion under the recording's
    /// lock, so the metadata disappears exactly when the file does. If storage refuses, the
    /// metadata stays and the error is transient. A file that is already gone counts as
    /// removed, so a retried delete converges. When the caller's wait runs out the delete
    /// carries on and `Transient` is returned; a later read shows how it ended.
    pub async fn delete(&self, id: RecordingId) -> StoreResult<()> {
        let slot = self.slot(id).await?;
        let inner = Arc::clone(&self.inner);

        let mut task = tokio::spawn(async move {
            let mut guard = slot.write().await;
            let recording = guard.clone().ok_or_else(|| StoreError::not_found(id))?;

            persist(&inner, move |db| db.set_deleting(id, true)).await?;

            if let Err(e) = remove_audio(&inner, id, Path::new(&recording.file_path)).await {
                if let Err(undo) = persist(&inner, move |db| db.set_deleting(id, false)).await {
                    warn!(
                        "Recording {} stays marked for deletion until restart: {}",
                        id, undo
                    );
                }
                return Err(e);
            }

            // The file is gone, so the metadata goes too; a stale row is dropped at next start
            let file_id = recording.file_id.clone();
            if let Err(e) = persist(&inner, move |db| db.remove(id, &file_id)).await {
                error!(
                    "Recording {} removed but its row stays until restart: {}",
                    id, e
                );
            }

            // Tombstone first so readers already holding the slot see NotFound
            guard.take();
            inner.index.write().await.by_id.remove(&id);

            info!("Deleted recording {}", id);
            Ok::<(), StoreError>(())
        });

        match tokio::time::timeout(self.inner.storage_timeout, &mut task).await {
            Ok(joined) => {
                joined.map_err(|e| StoreError::Transient(format!("delete task failed: {}", e)))?
            }
            Err(_) => {
                warn!(
                    "Delete of recording {} still running after {:?}",
                    id, self.inner.storage_timeout
                );
                Err(StoreError::Transient(
                    "delete still in progress".to_string(),
                ))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn slot(&self, id: RecordingId) -> StoreResult<Slot> {
        let index = self.inner.index.read().await;
        index
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id))
    }

    /// Apply `f` to one recording under its write lock
    ///
    /// `f` edits a copy that is only written back (and persisted) when it returns `Ok`. The work runs in its own
    /// task, so dropping the returned future never interrupts it halfway.
    pub(crate) async fn mutate<T, F>(&self, id: RecordingId, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Recording) -> StoreResult<T> + Send + 'static,
    {
        let slot = self.slot(id).await?;
        let inner = Arc::clone(&self.inner);

        let task = tokio::spawn(async move {
            let mut guard = slot.write().await;
            let current = guard.as_mut().ok_or_else(|| StoreError::not_found(id))?;

            let mut updated = current.clone();
            let out = f(&mut updated)?;

            let row = updated.clone();
            persist(&inner, move |db| db.update(&row)).await?;

            *current = updated;
            Ok::<T, StoreError>(out)
        });

        task.await
            .map_err(|e| StoreError::Transient(format!("update task failed: {}", e)))?
    }
}

/// Never earlier than `created_at`, which may have been nudged past the clock
fn completion_time(created_at: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(created_at)
}

/// Run a database write on the blocking pool; a store without a database skips it
async fn persist<F>(inner: &StoreInner, write: F) -> StoreResult<()>
where
    F: FnOnce(&RecordingDb) -> anyhow::Result<()> + Send + 'static,
{
    let Some(db) = inner.db.clone() else {
        return Ok(());
    };

    tokio::task::spawn_blocking(move || write(&db))
        .await
        .map_err(|e| StoreError::Transient(format!("database task failed: {}", e)))?
        .map_err(|e| {
            error!("Database write failed: {:#}", e);
            StoreError::Transient(format!("database write failed: {:#}", e))
        })
}

/// Remove the audio file, waiting for storage to answer
async fn remove_audio(inner: &StoreInner, id: RecordingId, path: &Path) -> StoreResult<()> {
    match inner.storage.remove(path).await {
        Ok(()) => {
            debug!("Removed audio file {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(
                "Recording {} had no audio file at {}, removing metadata only",
                id,
                path.display()
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to remove audio file {}: {}", path.display(), e);
            Err(StoreError::Transient(format!(
                "failed to remove audio file: {}",
                e
            )))
        }
    }
}
