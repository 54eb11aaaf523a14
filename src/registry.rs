//! Local evaluation registry.
//!
//! Keeps a bounded, most-recent-first list of evaluations launched from this
//! device, stored as a single JSON array under one key of a
//! [`KeyValueStore`].

use crate::error::{OrchestratorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Key of the registry entry in the store.
pub const REGISTRY_KEY: &str = "saved_evaluations";

/// Number of records kept after each save.
pub const MAX_SAVED_EVALUATIONS: usize = 50;

/// Local lifecycle of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleStatus::Created => "created",
            LifecycleStatus::Running => "running",
            LifecycleStatus::Completed => "completed",
            LifecycleStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Which kind of dataset an evaluation was launched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetSourceKind {
    Existing,
    Upload,
}

/// Configuration fields frozen at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub model_name: String,
    pub judge_model: String,
    pub dataset_source: DatasetSourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_dataset: Option<String>,
    pub similarity_threshold: u8,
}

/// A persisted lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedEvaluation {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub status: LifecycleStatus,
    pub config: ConfigSnapshot,
}

/// Minimal string key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Stores each key as `<key>.json` inside a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| OrchestratorError::io(path, e))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|e| OrchestratorError::io(&self.dir, e))?;
        }
        let path = self.path_for(key);
        fs::write(&path, value).map_err(|e| OrchestratorError::io(path, e))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OrchestratorError::io(path, e)),
        }
    }
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Bounded, most-recent-first registry of saved evaluations.
pub struct EvaluationRegistry {
    store: Box<dyn KeyValueStore>,
    // Serializes read-modify-write sequences.
    write_lock: Mutex<()>,
}

impl EvaluationRegistry {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            write_lock: Mutex::new(()),
        }
    }

    /// Registry backed by files in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self::new(FileStore::new(dir))
    }

    /// Registry that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Unreadable or corrupt data reads as an empty registry.
    fn read_all(&self) -> Vec<SavedEvaluation> {
        let raw = match self.store.read(REGISTRY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read saved evaluations");
                return Vec::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "saved evaluations are corrupt, starting empty");
            Vec::new()
        })
    }

    fn write_all(&self, evaluations: &[SavedEvaluation]) -> Result<()> {
        let json = serde_json::to_string(evaluations)?;
        self.store.write(REGISTRY_KEY, &json)
    }

    /// Insert or replace by id, moving the record to the front.
    pub fn save(&self, evaluation: SavedEvaluation) -> Result<()> {
        let _guard = self.lock();
        let mut evaluations = self.read_all();
        evaluations.retain(|e| e.id != evaluation.id);
        evaluations.insert(0, evaluation);
        evaluations.truncate(MAX_SAVED_EVALUATIONS);
        self.write_all(&evaluations)
    }

    pub fn get(&self, id: &str) -> Option<SavedEvaluation> {
        self.read_all().into_iter().find(|e| e.id == id)
    }

    /// All records, most recent first.
    pub fn list_all(&self) -> Vec<SavedEvaluation> {
        self.read_all()
    }

    /// Change the status of a record in place. Missing ids are ignored.
    pub fn update_status(&self, id: &str, status: LifecycleStatus) -> Result<()> {
        let _guard = self.lock();
        let mut evaluations = self.read_all();
        match evaluations.iter_mut().find(|e| e.id == id) {
            Some(evaluation) => {
                evaluation.status = status;
                self.write_all(&evaluations)
            }
            None => Ok(()),
        }
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.lock();
        let mut evaluations = self.read_all();
        let before = evaluations.len();
        evaluations.retain(|e| e.id != id);
        if evaluations.len() == before {
            return Ok(());
        }
        self.write_all(&evaluations)
    }

    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock();
        self.store.remove(REGISTRY_KEY)
    }
}
