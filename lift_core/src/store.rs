//! Workout log persistence.
//!
//! Logs are keyed by `(user_id, date_key)`; saving the same key again
//! replaces the earlier record. History comes back newest first.

use crate::{Error, Result, WorkoutLog};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;

/// Durable storage for completed workout logs
pub trait WorkoutLogStore: Send + Sync {
    /// Insert or replace the log stored under `(user_id, date_key)`
    fn save(&self, user_id: &str, date_key: &str, log: &WorkoutLog) -> Result<()>;

    /// Up to `limit` logs for `user_id`, most recent first
    fn fetch_history(&self, user_id: &str, limit: usize) -> Result<Vec<WorkoutLog>>;
}

/// One stored record
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredLog {
    user_id: String,
    date_key: String,
    log: WorkoutLog,
}

impl StoredLog {
    fn matches(&self, user_id: &str, date_key: &str) -> bool {
        self.user_id == user_id && self.date_key == date_key
    }
}

fn upsert(records: &mut Vec<StoredLog>, user_id: &str, date_key: &str, log: &WorkoutLog) {
    let record = StoredLog {
        user_id: user_id.to_string(),
        date_key: date_key.to_string(),
        log: log.clone(),
    };
    match records.iter_mut().find(|r| r.matches(user_id, date_key)) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

fn history_for(records: &[StoredLog], user_id: &str, limit: usize) -> Vec<WorkoutLog> {
    let mut logs: Vec<WorkoutLog> = records
        .iter()
        .filter(|r| r.user_id == user_id)
        .map(|r| r.log.clone())
        .collect();
    logs.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
    logs.truncate(limit);
    logs
}

// ============================================================================
// JSON Lines store
// ============================================================================

/// Parsed file plus the raw lines that did not parse
#[derive(Default)]
struct FileContents {
    records: Vec<StoredLog>,
    unreadable: Vec<String>,
}

/// JSONL-backed store with file locking and atomic rewrites
///
/// Writers take an exclusive lock on a sidecar `.lock` file, rewrite the
/// whole log set to a temp file, sync it, and rename it into place. Readers
/// take a shared lock on the same sidecar. Lines that fail to parse are
/// left out of history but written back verbatim, so a rewrite never
/// destroys them.
pub struct JsonlLogStore {
    path: PathBuf,
}

impl JsonlLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn open_lock(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        Ok(file)
    }

    fn read_contents(&self) -> Result<FileContents> {
        let mut contents = FileContents::default();
        if !self.path.exists() {
            return Ok(contents);
        }

        let reader = BufReader::new(File::open(&self.path)?);

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<StoredLog>(&line) {
                Ok(record) => contents.records.push(record),
                Err(e) => {
                    tracing::warn!("Skipping unreadable log at line {}: {}", line_num + 1, e);
                    contents.unreadable.push(line);
                }
            }
        }

        Ok(contents)
    }

    fn write_contents(&self, contents: &FileContents) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::Persistence(format!("{:?} has no parent", self.path)))?;
        let temp = NamedTempFile::new_in(dir)?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            for line in &contents.unreadable {
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
            }
            for record in &contents.records {
                serde_json::to_writer(&mut writer, record)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

impl WorkoutLogStore for JsonlLogStore {
    fn save(&self, user_id: &str, date_key: &str, log: &WorkoutLog) -> Result<()> {
        let lock = self.open_lock()?;
        lock.lock_exclusive()?;

        let result = self.read_contents().and_then(|mut contents| {
            upsert(&mut contents.records, user_id, date_key, log);
            self.write_contents(&contents)
        });

        lock.unlock()?;
        result?;

        tracing::debug!("Saved workout log {} for {} on {}", log.id, user_id, date_key);
        Ok(())
    }

    fn fetch_history(&self, user_id: &str, limit: usize) -> Result<Vec<WorkoutLog>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let lock = self.open_lock()?;
        lock.lock_shared()?;
        let contents = self.read_contents();
        lock.unlock()?;

        let logs = history_for(&contents?.records, user_id, limit);
        tracing::debug!("Read {} workout logs for {}", logs.len(), user_id);
        Ok(logs)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store, for tests and embedding without a filesystem
#[derive(Default)]
pub struct MemoryLogStore {
    records: Mutex<Vec<StoredLog>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored logs across all users
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WorkoutLogStore for MemoryLogStore {
    fn save(&self, user_id: &str, date_key: &str, log: &WorkoutLog) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        upsert(&mut records, user_id, date_key, log);
        Ok(())
    }

    fn fetch_history(&self, user_id: &str, limit: usize) -> Result<Vec<WorkoutLog>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(history_for(&records, user_id, limit))
    }
}
