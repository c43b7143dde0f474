use super::model::{Recording, RecordingId};
use anyhow::{anyhow, Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS recordings (
    id INTEGER PRIMARY KEY,
    file_id TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    file_path TEXT NOT NULL,
    duration_seconds REAL NOT NULL DEFAULT 0,
    file_size_bytes INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    transcription_status TEXT NOT NULL,
    notes TEXT,
    deleting INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS retired_file_ids (
    file_id TEXT PRIMARY KEY,
    recording_id INTEGER NOT NULL
);
";

const COLUMNS: &str = "id, file_id, filename, file_path, duration_seconds, file_size_bytes, \
                       status, created_at, completed_at, transcription_status, notes";

/// Everything needed to rebuild the in-memory index
#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    pub recordings: Vec<Recording>,

    /// Rows journaled for deletion whose delete never finished
    pub interrupted_deletes: Vec<Recording>,

    /// file_ids of deleted recordings, with the id they belonged to
    pub retired: Vec<(String, RecordingId)>,
}

/// SQLite table behind `RecordingStore`
///
/// Calls block; the store runs them on the blocking pool.
#[derive(Clone)]
pub struct RecordingDb {
    conn: Arc<Mutex<Connection>>,
}

impl RecordingDb {
    /// Open (or create) the database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::with_connection(conn)
    }

    /// Database that lives as long as the returned value
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize recordings schema")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow!("Failed to acquire database lock: {}", e))
    }

    pub(crate) fn load(&self) -> Result<Snapshot> {
        let conn = self.conn()?;
        let mut snapshot = Snapshot::default();

        let mut stmt = conn.prepare(&format!(
            "SELECT {}, deleting FROM recordings ORDER BY id",
            COLUMNS
        ))?;
        let rows = stmt.query_map([], |row| Ok((recording_from_row(row)?, row.get::<_, bool>(11)?)))?;
        for row in rows {
            let (recording, deleting) = row.context("Failed to read recording row")?;
            if deleting {
                snapshot.interrupted_deletes.push(recording);
            } else {
                snapshot.recordings.push(recording);
            }
        }

        let mut stmt = conn.prepare("SELECT file_id, recording_id FROM retired_file_ids")?;
        snapshot.retired = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read retired file ids")?;

        Ok(snapshot)
    }

    pub(crate) fn insert(&self, recording: &Recording) -> Result<()> {
        self.conn()?
            .execute(
                &format!(
                    "INSERT INTO recordings ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    COLUMNS
                ),
                params![
                    recording.id,
                    recording.file_id,
                    recording.filename,
                    recording.file_path,
                    recording.duration_seconds,
                    recording.file_size_bytes as i64,
                    recording.status.to_string(),
                    recording.created_at,
                    recording.completed_at,
                    recording.transcription_status.to_string(),
                    recording.notes,
                ],
            )
            .with_context(|| format!("Failed to insert recording {}", recording.id))?;
        Ok(())
    }

    /// Write back every mutable column of an existing row
    pub(crate) fn update(&self, recording: &Recording) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE recordings SET duration_seconds = ?2, file_size_bytes = ?3, status = ?4, \
                 completed_at = ?5, transcription_status = ?6, notes = ?7 WHERE id = ?1",
                params![
                    recording.id,
                    recording.duration_seconds,
                    recording.file_size_bytes as i64,
                    recording.status.to_string(),
                    recording.completed_at,
                    recording.transcription_status.to_string(),
                    recording.notes,
                ],
            )
            .with_context(|| format!("Failed to update recording {}", recording.id))?;

        if changed == 0 {
            return Err(anyhow!("Recording {} has no row", recording.id));
        }
        Ok(())
    }

    /// Journal (or un-journal) a delete so a crash mid-delete is finished at the next start
    pub(crate) fn set_deleting(&self, id: RecordingId, deleting: bool) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE recordings SET deleting = ?2 WHERE id = ?1",
                params![id, deleting],
            )
            .with_context(|| format!("Failed to mark recording {} for deletion", id))?;
        Ok(())
    }

    /// Drop the row and retire its file_id in one transaction
    pub(crate) fn remove(&self, id: RecordingId, file_id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM recordings WHERE id = ?1", params![id])?;
        tx.execute(
            "INSERT OR REPLACE INTO retired_file_ids (file_id, recording_id) VALUES (?1, ?2)",
            params![file_id, id],
        )?;
        tx.commit()
            .with_context(|| format!("Failed to delete recording {}", id))?;
        Ok(())
    }
}

fn recording_from_row(row: &Row<'_>) -> rusqlite::Result<Recording> {
    let status: String = row.get(6)?;
    let transcription_status: String = row.get(9)?;

    Ok(Recording {
        id: row.get(0)?,
        file_id: row.get(1)?,
        filename: row.get(2)?,
        file_path: row.get(3)?,
        duration_seconds: row.get(4)?,
        file_size_bytes: row.get::<_, i64>(5)? as u64,
        status: status
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, e.into()))?,
        created_at: row.get(7)?,
        completed_at: row.get(8)?,
        transcription_status: transcription_status
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, e.into()))?,
        notes: row.get(10)?,
    })
}
