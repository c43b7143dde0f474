// Integration tests for the recording store
//
// Covers the capture state machine, deletion semantics, audio lookup failures and the
// per-recording concurrency guarantees.

use anyhow::Result;
use recordings_api::audio::{AudioStorage, AudioStream};
use recordings_api::{
    AudioUnavailableReason, CaptureStatus, LocalDiskStorage, NewRecording, RecordingDb,
    RecordingStore, StoreError, TranscriptionStatus, TranscriptionTracker,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

/// In-memory storage with optional artificial latency and a switch to refuse deletes
#[derive(Default)]
struct MemoryStorage {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    delay: Duration,
    refuse_remove: bool,
    /// Extra wait after a removal has already taken effect
    remove_ack_delay: Duration,
}

impl MemoryStorage {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn put(&self, path: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), bytes.to_vec());
    }

    fn contains(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(Path::new(path))
    }
}

#[async_trait::async_trait]
impl AudioStorage for MemoryStorage {
    async fn open(&self, path: &Path) -> io::Result<AudioStream> {
        tokio::time::sleep(self.delay).await;
        let bytes = self
            .files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;

        Ok(AudioStream {
            size_bytes: bytes.len() as u64,
            reader: Box::new(io::Cursor::new(bytes)),
        })
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        tokio::time::sleep(self.delay).await;
        if self.refuse_remove {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        let removed = self.files.lock().unwrap().remove(path);
        tokio::time::sleep(self.remove_ack_delay).await;
        removed
            .map(|_| ())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn memory_store(storage: MemoryStorage) -> (RecordingStore, Arc<MemoryStorage>) {
    let storage = Arc::new(storage);
    let store = RecordingStore::new(storage.clone(), Duration::from_millis(200));
    (store, storage)
}

fn session(n: u32) -> NewRecording {
    NewRecording::new(
        format!("file-{}", n),
        format!("recording_{}.wav", n),
        format!("/recordings/recording_{}.wav", n),
    )
}

#[tokio::test]
async fn test_create_starts_in_recording_state() -> Result<()> {
    let (store, _) = memory_store(MemoryStorage::default());

    let rec = store.create(session(1)).await?;

    assert_eq!(rec.id, 1);
    assert_eq!(rec.file_id, "file-1");
    assert_eq!(rec.status, CaptureStatus::Recording);
    assert_eq!(rec.transcription_status, TranscriptionStatus::Pending);
    assert_eq!(rec.duration_seconds, 0.0);
    assert_eq!(rec.file_size_bytes, 0);
    assert!(rec.completed_at.is_none());
    assert!(rec.notes.is_none());

    let second = store.create(session(2)).await?;
    assert_eq!(second.id, 2);

    Ok(())
}

#[tokio::test]
async fn test_create_rejects_duplicate_file_id_even_after_delete() -> Result<()> {
    let (store, _) = memory_store(MemoryStorage::default());

    let rec = store.create(session(1)).await?;
    assert!(matches!(
        store.create(session(1)).await,
        Err(StoreError::Conflict(_))
    ));

    store.delete(rec.id).await?;
    assert!(matches!(
        store.create(session(1)).await,
        Err(StoreError::Conflict(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_create_rejects_empty_file_id() {
    let (store, _) = memory_store(MemoryStorage::default());

    let result = store
        .create(NewRecording::new(" ", "a.wav", "/recordings/a.wav"))
        .await;

    assert!(matches!(result, Err(StoreError::InvalidInput(_))));
}

#[tokio::test]
async fn test_list_is_newest_first_and_matches_get() -> Result<()> {
    let (store, _) = memory_store(MemoryStorage::default());

    assert!(store.list().await.is_empty());

    for n in 1..=5 {
        store.create(session(n)).await?;
    }
    store.complete(3, 4.0, 1024).await?;

    let listed = store.list().await;
    let ids: Vec<i64> = listed.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![5, 4, 3, 2, 1]);

    for pair in listed.windows(2) {
        assert!(pair[0].created_at > pair[1].created_at);
    }
    for rec in &listed {
        assert_eq!(&store.get(rec.id).await?, rec);
    }

    Ok(())
}

#[tokio::test]
async fn test_complete_finalizes_fields() -> Result<()> {
    let (store, _) = memory_store(MemoryStorage::default());
    let rec = store.create(session(1)).await?;

    let done = store.complete(rec.id, 12.5, 204_800).await?;

    assert_eq!(done.status, CaptureStatus::Completed);
    assert_eq!(done.duration_seconds, 12.5);
    assert_eq!(done.file_size_bytes, 204_800);
    assert!(done.completed_at.is_some());
    assert_eq!(store.get(rec.id).await?, done);

    Ok(())
}

#[tokio::test]
async fn test_fail_sets_completed_at_without_size() -> Result<()> {
    let (store, _) = memory_store(MemoryStorage::default());
    let rec = store.create(session(1)).await?;

    let failed = store.fail(rec.id).await?;

    assert_eq!(failed.status, CaptureStatus::Failed);
    assert!(failed.completed_at.is_some());
    assert_eq!(failed.duration_seconds, 0.0);
    assert_eq!(failed.file_size_bytes, 0);

    Ok(())
}

#[tokio::test]
async fn test_terminal_capture_states_reject_transitions() -> Result<()> {
    let (store, _) = memory_store(MemoryStorage::default());
    let completed = store.create(session(1)).await?;
    let failed = store.create(session(2)).await?;

    let first = store.complete(completed.id, 1.0, 10).await?;
    store.fail(failed.id).await?;

    assert!(matches!(
        store.complete(completed.id, 2.0, 20).await,
        Err(StoreError::InvalidTransition { .. })
    ));
    assert!(matches!(
        store.fail(completed.id).await,
        Err(StoreError::InvalidTransition { .. })
    ));
    assert!(matches!(
        store.complete(failed.id, 1.0, 10).await,
        Err(StoreError::InvalidTransition { .. })
    ));

    // Rejected transitions leave the record untouched
    assert_eq!(store.get(completed.id).await?, first);

    Ok(())
}

#[tokio::test]
async fn test_complete_rejects_negative_duration() -> Result<()> {
    let (store, _) = memory_store(MemoryStorage::default());
    let rec = store.create(session(1)).await?;

    assert!(matches!(
        store.complete(rec.id, -1.0, 10).await,
        Err(StoreError::InvalidInput(_))
    ));
    assert!(matches!(
        store.complete(rec.id, f64::NAN, 10).await,
        Err(StoreError::InvalidInput(_))
    ));
    assert_eq!(store.get(rec.id).await?.status, CaptureStatus::Recording);

    Ok(())
}

#[tokio::test]
async fn test_finalize_unknown_recording() {
    let (store, _) = memory_store(MemoryStorage::default());
    assert!(matches!(
        store.complete(42, 1.0, 1).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_notes_can_change_in_any_state() -> Result<()> {
    let (store, _) = memory_store(MemoryStorage::default());
    let rec = store.create(session(1)).await?;

    let annotated = store
        .set_notes(rec.id, Some("Session 12: the goblin ambush".to_string()))
        .await?;
    assert_eq!(annotated.notes.as_deref(), Some("Session 12: the goblin ambush"));

    store.complete(rec.id, 3.0, 300).await?;
    let cleared = store.set_notes(rec.id, None).await?;
    assert!(cleared.notes.is_none());
    assert_eq!(cleared.status, CaptureStatus::Completed);

    Ok(())
}

#[tokio::test]
async fn test_get_by_file_id() -> Result<()> {
    let (store, _) = memory_store(MemoryStorage::default());
    let rec = store.create(session(7)).await?;

    assert_eq!(store.get_by_file_id("file-7").await?.id, rec.id);
    assert!(matches!(
        store.get_by_file_id("file-8").await,
        Err(StoreError::NotFound(_))
    ));

    store.delete(rec.id).await?;
    assert!(matches!(
        store.get_by_file_id("file-7").await,
        Err(StoreError::NotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_delete_removes_metadata_and_file() -> Result<()> {
    let (store, storage) = memory_store(MemoryStorage::default());
    let rec = store.create(session(1)).await?;
    storage.put(&rec.file_path, b"RIFF....WAVE");
    store.complete(rec.id, 1.0, 12).await?;

    store.delete(rec.id).await?;

    assert!(!storage.contains(&rec.file_path));
    assert!(matches!(store.get(rec.id).await, Err(StoreError::NotFound(_))));
    assert!(matches!(
        store.audio_location(rec.id).await,
        Err(StoreError::NotFound(_))
    ));
    assert!(store.list().await.is_empty());

    // Second delete fails
    assert!(matches!(
        store.delete(rec.id).await,
        Err(StoreError::NotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_delete_never_existed() {
    let (store, _) = memory_store(MemoryStorage::default());
    assert!(matches!(store.delete(99).await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_without_backing_file() -> Result<()> {
    let (store, _) = memory_store(MemoryStorage::default());
    let rec = store.create(session(1)).await?;

    store.delete(rec.id).await?;
    assert!(matches!(store.get(rec.id).await, Err(StoreError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_delete_keeps_metadata_when_storage_refuses() -> Result<()> {
    let (store, storage) = memory_store(MemoryStorage {
        refuse_remove: true,
        ..Default::default()
    });
    let rec = store.create(session(1)).await?;
    storage.put(&rec.file_path, b"data");

    let err = store.delete(rec.id).await.unwrap_err();

    assert!(matches!(err, StoreError::Transient(_)));
    assert!(err.is_retryable());
    assert_eq!(store.get(rec.id).await?.id, rec.id);
    assert!(storage.contains(&rec.file_path));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deletes_exactly_one_succeeds() -> Result<()> {
    let (store, storage) = memory_store(MemoryStorage::with_delay(Duration::from_millis(20)));
    let rec = store.create(session(1)).await?;
    storage.put(&rec.file_path, b"data");

    let a = tokio::spawn({
        let store = store.clone();
        async move { store.delete(rec.id).await }
    });
    let b = tokio::spawn({
        let store = store.clone();
        async move { store.delete(rec.id).await }
    });

    let results = [a.await?, b.await?];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let not_found = results
        .iter()
        .filter(|r| matches!(r, Err(StoreError::NotFound(_))))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(not_found, 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_get_during_delete_sees_full_record_or_not_found() -> Result<()> {
    let (store, storage) = memory_store(MemoryStorage::with_delay(Duration::from_millis(30)));
    let rec = store.create(session(1)).await?;
    storage.put(&rec.file_path, b"data");
    let expected = store.complete(rec.id, 2.0, 4).await?;

    let deleter = tokio::spawn({
        let store = store.clone();
        async move { store.delete(rec.id).await }
    });

    for _ in 0..20 {
        match store.get(rec.id).await {
            Ok(seen) => assert_eq!(seen, expected),
            Err(StoreError::NotFound(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    deleter.await??;
    assert!(matches!(store.get(rec.id).await, Err(StoreError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_cancelled_delete_still_completes() -> Result<()> {
    let (store, storage) = memory_store(MemoryStorage::with_delay(Duration::from_millis(50)));
    let rec = store.create(session(1)).await?;
    storage.put(&rec.file_path, b"data");

    // Caller gives up before the delete is acknowledged
    let abandoned = tokio::time::timeout(Duration::from_millis(5), store.delete(rec.id)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(150)).await;

    // The delete ran to completion: no metadata, no file
    assert!(matches!(store.get(rec.id).await, Err(StoreError::NotFound(_))));
    assert!(!storage.contains(&rec.file_path));

    Ok(())
}

#[tokio::test]
async fn test_delete_outlasting_timeout_never_strands_metadata() -> Result<()> {
    let storage = Arc::new(MemoryStorage {
        remove_ack_delay: Duration::from_millis(500),
        ..Default::default()
    });
    let store = RecordingStore::new(storage.clone(), Duration::from_millis(50));
    let rec = store.create(session(1)).await?;
    storage.put(&rec.file_path, b"data");
    store.complete(rec.id, 1.0, 4).await?;

    // The file is removed at once but storage acknowledges long after the store gives up
    let err = store.delete(rec.id).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(!storage.contains(&rec.file_path));

    // Readers never see a completed recording whose file is gone
    match store.audio_location(rec.id).await {
        Err(StoreError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {:?}", other.map(|l| l.recording)),
    }
    assert!(matches!(store.get(rec.id).await, Err(StoreError::NotFound(_))));
    assert!(store.list().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_audio_location_while_recording_is_not_ready() -> Result<()> {
    let (store, _) = memory_store(MemoryStorage::default());
    let rec = store.create(session(1)).await?;

    let err = store.audio_location(rec.id).await.unwrap_err();

    match &err {
        StoreError::AudioUnavailable { id, reason } => {
            assert_eq!(*id, rec.id);
            assert_eq!(*reason, AudioUnavailableReason::NotReady(CaptureStatus::Recording));
        }
        other => panic!("expected AudioUnavailable, got {:?}", other),
    }
    assert!(!err.is_integrity_fault());

    Ok(())
}

#[tokio::test]
async fn test_audio_location_for_failed_capture_is_not_ready() -> Result<()> {
    let (store, _) = memory_store(MemoryStorage::default());
    let rec = store.create(session(1)).await?;
    store.fail(rec.id).await?;

    assert!(matches!(
        store.audio_location(rec.id).await,
        Err(StoreError::AudioUnavailable {
            reason: AudioUnavailableReason::NotReady(CaptureStatus::Failed),
            ..
        })
    ));

    Ok(())
}

#[tokio::test]
async fn test_audio_location_missing_file_is_integrity_fault() -> Result<()> {
    let (store, _) = memory_store(MemoryStorage::default());
    let rec = store.create(session(1)).await?;
    store.complete(rec.id, 1.0, 10).await?;

    let err = store.audio_location(rec.id).await.unwrap_err();

    assert!(err.is_integrity_fault());
    assert!(!err.is_retryable());

    Ok(())
}

#[tokio::test]
async fn test_audio_location_unknown_recording() {
    let (store, _) = memory_store(MemoryStorage::default());
    assert!(matches!(
        store.audio_location(5).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_audio_location_opens_completed_file() -> Result<()> {
    let (store, storage) = memory_store(MemoryStorage::default());
    let rec = store.create(session(1)).await?;
    storage.put(&rec.file_path, b"RIFF-audio-bytes");
    store.complete(rec.id, 1.0, 16).await?;

    let mut location = store.audio_location(rec.id).await?;
    let mut bytes = Vec::new();
    location.stream.reader.read_to_end(&mut bytes).await?;

    assert_eq!(location.recording.id, rec.id);
    assert_eq!(location.stream.size_bytes, 16);
    assert_eq!(bytes, b"RIFF-audio-bytes");

    Ok(())
}

#[tokio::test]
async fn test_audio_location_times_out_as_transient() -> Result<()> {
    let storage = Arc::new(MemoryStorage::with_delay(Duration::from_millis(500)));
    let store = RecordingStore::new(storage.clone(), Duration::from_millis(20));
    let rec = store.create(session(1)).await?;
    storage.put(&rec.file_path, b"data");
    store.complete(rec.id, 1.0, 4).await?;

    let err = store.audio_location(rec.id).await.unwrap_err();

    assert!(matches!(err, StoreError::Transient(_)));
    assert!(err.is_retryable());

    Ok(())
}

#[tokio::test]
async fn test_complete_from_file_reads_wav() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("session.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for _ in 0..(16000 * 3 / 2) {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;

    let store = RecordingStore::with_local_disk(temp_dir.path(), Duration::from_secs(1));
    let rec = store
        .create(NewRecording::generated(
            "session.wav",
            path.to_string_lossy().to_string(),
        ))
        .await?;

    let done = store.complete_from_file(rec.id).await?;

    assert_eq!(done.status, CaptureStatus::Completed);
    assert!((done.duration_seconds - 1.5).abs() < 1e-9);
    assert_eq!(done.file_size_bytes, std::fs::metadata(&path)?.len());

    Ok(())
}

#[tokio::test]
async fn test_complete_from_file_without_file_keeps_recording() -> Result<()> {
    let store = RecordingStore::with_local_disk("/nonexistent", Duration::from_secs(1));
    let rec = store
        .create(NewRecording::generated("gone.wav", "/nonexistent/gone.wav"))
        .await?;

    assert!(matches!(
        store.complete_from_file(rec.id).await,
        Err(StoreError::PreconditionFailed(_))
    ));
    assert_eq!(store.get(rec.id).await?.status, CaptureStatus::Recording);

    Ok(())
}

#[tokio::test]
async fn test_local_disk_delete_removes_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("local.wav");
    std::fs::write(&path, b"audio")?;

    let store = RecordingStore::with_local_disk(temp_dir.path(), Duration::from_secs(1));
    let rec = store
        .create(NewRecording::generated(
            "local.wav",
            path.to_string_lossy().to_string(),
        ))
        .await?;

    store.delete(rec.id).await?;

    assert!(!path.exists());
    assert!(matches!(store.get(rec.id).await, Err(StoreError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_create_rejects_paths_outside_recordings_dir() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = RecordingStore::with_local_disk(temp_dir.path(), Duration::from_secs(1));

    let outside = temp_dir.path().join("../elsewhere.wav");
    for path in ["/etc/passwd".to_string(), outside.to_string_lossy().to_string()] {
        assert!(matches!(
            store.create(NewRecording::generated("x.wav", path)).await,
            Err(StoreError::InvalidInput(_))
        ));
    }
    assert!(store.list().await.is_empty());

    // Relative paths land inside the directory
    let rec = store
        .create(NewRecording::generated("inside.wav", "inside.wav"))
        .await?;
    assert_eq!(Path::new(&rec.file_path), temp_dir.path().join("inside.wav"));

    Ok(())
}

#[tokio::test]
async fn test_completed_at_never_precedes_created_at() -> Result<()> {
    let (store, _) = memory_store(MemoryStorage::default());

    for n in 0..200 {
        let rec = store.create(session(n)).await?;
        let done = if n % 2 == 0 {
            store.complete(rec.id, 1.0, 1).await?
        } else {
            store.fail(rec.id).await?
        };
        assert!(done.completed_at.unwrap() >= done.created_at);
    }

    Ok(())
}

// ----------------------------------------------------------------------------
// Persistence
// ----------------------------------------------------------------------------

async fn open_store(dir: &TempDir) -> Result<RecordingStore> {
    let db = RecordingDb::open(&dir.path().join("db").join("recordings.db"))?;
    let storage = Arc::new(LocalDiskStorage::new(dir.path()));
    RecordingStore::open(db, storage, Duration::from_secs(1)).await
}

fn audio_path(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().to_string()
}

#[tokio::test]
async fn test_recordings_survive_reopen() -> Result<()> {
    let dir = TempDir::new()?;

    let (first, second) = {
        let store = open_store(&dir).await?;
        let tracker = TranscriptionTracker::new(store.clone());

        let first = store
            .create(NewRecording::new("file-1", "one.wav", audio_path(&dir, "one.wav")))
            .await?;
        store.complete(first.id, 30.0, 960_044).await?;
        tracker
            .set_status(first.id, TranscriptionStatus::Processing)
            .await?;
        store
            .set_notes(first.id, Some("Session one".to_string()))
            .await?;

        let second = store
            .create(NewRecording::new("file-2", "two.wav", audio_path(&dir, "two.wav")))
            .await?;
        (store.get(first.id).await?, second)
    };

    let store = open_store(&dir).await?;

    assert_eq!(store.get(first.id).await?, first);
    assert_eq!(store.get(second.id).await?, second);
    let ids: Vec<i64> = store.list().await.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    // Ids and creation order continue where they left off
    let third = store
        .create(NewRecording::new("file-3", "three.wav", audio_path(&dir, "three.wav")))
        .await?;
    assert_eq!(third.id, second.id + 1);
    assert!(third.created_at > second.created_at);

    Ok(())
}

#[tokio::test]
async fn test_deleted_recordings_stay_deleted_after_reopen() -> Result<()> {
    let dir = TempDir::new()?;
    let path = audio_path(&dir, "gone.wav");
    std::fs::write(&path, b"audio")?;

    let id = {
        let store = open_store(&dir).await?;
        let rec = store
            .create(NewRecording::new("file-gone", "gone.wav", path.clone()))
            .await?;
        store.delete(rec.id).await?;
        rec.id
    };

    let store = open_store(&dir).await?;

    assert!(matches!(store.get(id).await, Err(StoreError::NotFound(_))));
    assert!(matches!(
        store
            .create(NewRecording::new("file-gone", "again.wav", audio_path(&dir, "again.wav")))
            .await,
        Err(StoreError::Conflict(_))
    ));
    let next = store
        .create(NewRecording::new("file-new", "new.wav", audio_path(&dir, "new.wav")))
        .await?;
    assert!(next.id > id);

    Ok(())
}

#[tokio::test]
async fn test_interrupted_delete_is_finished_on_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = audio_path(&dir, "half.wav");
    std::fs::write(&path, b"audio")?;

    let id = {
        let store = open_store(&dir).await?;
        store
            .create(NewRecording::new("file-half", "half.wav", path.clone()))
            .await?
            .id
    };

    // Crash after the delete was journaled but before anything else happened
    let conn = rusqlite::Connection::open(dir.path().join("db").join("recordings.db"))?;
    conn.execute("UPDATE recordings SET deleting = 1 WHERE id = ?1", [id])?;
    drop(conn);

    let store = open_store(&dir).await?;

    assert!(matches!(store.get(id).await, Err(StoreError::NotFound(_))));
    assert!(!Path::new(&path).exists());

    let store = open_store(&dir).await?;
    assert!(store.list().await.is_empty());

    Ok(())
}
