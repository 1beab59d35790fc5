//! Durable key/value storage for session snapshots.
//!
//! [`FileStorage`] keeps one `<key>.json` file per storage key.
//! [`MemoryStorage`] is an in-process map used by tests and dry runs.
//! Both support an optional byte quota: a write larger than the quota fails
//! with [`StorageError::QuotaExceeded`] and leaves the previous value intact.
//!
//! Narration audio never goes into a snapshot.  It is kept beside it, one
//! entry per variant (`<dir>/<key>.audio/<configId>.uri` for files), and is
//! not subject to the quota.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage quota exceeded ({size} bytes > {quota} bytes)")]
    QuotaExceeded { size: usize, quota: usize },
}

/// Storage keyed by a fixed string.
pub trait SnapshotStorage: Send + Sync {
    /// Returns `Ok(None)` when nothing was stored under `key`.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn write(&self, key: &str, data: &str) -> Result<(), StorageError>;

    /// Audio data URI stored for the variant `config_id` of session `key`.
    fn read_audio(&self, key: &str, config_id: &str) -> Result<Option<String>, StorageError>;

    /// Store the audio of `config_id`; `None` removes it.
    fn write_audio(
        &self,
        key: &str,
        config_id: &str,
        data: Option<&str>,
    ) -> Result<(), StorageError>;
}

fn check_quota(quota: Option<usize>, data: &str) -> Result<(), StorageError> {
    match quota {
        Some(quota) if data.len() > quota => Err(StorageError::QuotaExceeded {
            size: data.len(),
            quota,
        }),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// FileStorage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    quota: Option<usize>,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quota: None,
        }
    }

    pub fn with_quota(mut self, quota: Option<usize>) -> Self {
        self.quota = quota;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn audio_path_for(&self, key: &str, config_id: &str) -> PathBuf {
        let name: String = config_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{key}.audio")).join(format!("{name}.uri"))
    }
}

fn write_atomically(path: &Path, data: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Write-then-rename so a crash never leaves a truncated file.
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl SnapshotStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn write(&self, key: &str, data: &str) -> Result<(), StorageError> {
        check_quota(self.quota, data)?;
        write_atomically(&self.path_for(key), data)
    }

    fn read_audio(&self, key: &str, config_id: &str) -> Result<Option<String>, StorageError> {
        let path = self.audio_path_for(key, config_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn write_audio(
        &self,
        key: &str,
        config_id: &str,
        data: Option<&str>,
    ) -> Result<(), StorageError> {
        let path = self.audio_path_for(key, config_id);
        match data {
            Some(data) => write_atomically(&path, data),
            None if path.exists() => Ok(std::fs::remove_file(path)?),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStorage
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    audio: Mutex<HashMap<(String, String), String>>,
    quota: Option<usize>,
    writes: Mutex<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::default()
        }
    }

    /// Seed `key` with `data`, bypassing the quota.
    pub fn seeded(key: &str, data: &str) -> Self {
        let storage = Self::default();
        storage
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), data.to_string());
        storage
    }

    /// Seed the audio of `config_id` under `key`.
    pub fn with_audio(self, key: &str, config_id: &str, data: &str) -> Self {
        self.audio
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((key.to_string(), config_id.to_string()), data.to_string());
        self
    }

    /// Number of successful snapshot writes so far.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SnapshotStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, data: &str) -> Result<(), StorageError> {
        check_quota(self.quota, data)?;
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), data.to_string());
        *self.writes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    fn read_audio(&self, key: &str, config_id: &str) -> Result<Option<String>, StorageError> {
        let audio = self.audio.lock().unwrap_or_else(|e| e.into_inner());
        Ok(audio.get(&(key.to_string(), config_id.to_string())).cloned())
    }

    fn write_audio(
        &self,
        key: &str,
        config_id: &str,
        data: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut audio = self.audio.lock().unwrap_or_else(|e| e.into_inner());
        let entry = (key.to_string(), config_id.to_string());
        match data {
            Some(data) => audio.insert(entry, data.to_string()),
            None => audio.remove(&entry),
        };
        Ok(())
    }
}

// Lets tests keep a handle on the storage they hand to a store.
impl<S: SnapshotStorage + ?Sized> SnapshotStorage for std::sync::Arc<S> {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, data: &str) -> Result<(), StorageError> {
        (**self).write(key, data)
    }

    fn read_audio(&self, key: &str, config_id: &str) -> Result<Option<String>, StorageError> {
        (**self).read_audio(key, config_id)
    }

    fn write_audio(
        &self,
        key: &str,
        config_id: &str,
        data: Option<&str>,
    ) -> Result<(), StorageError> {
        (**self).write_audio(key, config_id, data)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_storage_missing_key_is_none() {
        let dir = tempdir().expect("temp dir");
        let storage = FileStorage::new(dir.path());
        assert!(storage.read("nothing").unwrap().is_none());
    }

    #[test]
    fn file_storage_round_trip_creates_dir() {
        let dir = tempdir().expect("temp dir");
        let storage = FileStorage::new(dir.path().join("nested").join("sessions"));
        storage.write("k", "{\"a\":1}").unwrap();
        assert_eq!(storage.read("k").unwrap().as_deref(), Some("{\"a\":1}"));
        assert!(storage.dir().join("k.json").exists());
    }

    #[test]
    fn file_storage_quota_keeps_previous_value() {
        let dir = tempdir().expect("temp dir");
        let storage = FileStorage::new(dir.path()).with_quota(Some(8));
        storage.write("k", "small").unwrap();

        let err = storage.write("k", "this is far too large").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { quota: 8, .. }));
        assert_eq!(storage.read("k").unwrap().as_deref(), Some("small"));
    }

    #[test]
    fn file_storage_audio_lives_beside_snapshot() {
        let dir = tempdir().expect("temp dir");
        let storage = FileStorage::new(dir.path()).with_quota(Some(8));
        let audio = "data:audio/mpeg;base64,SUQzBAAAAAAA";

        // larger than the quota, which only applies to snapshots
        storage.write_audio("k", "zh/lv1", Some(audio)).unwrap();
        assert_eq!(storage.read_audio("k", "zh/lv1").unwrap().as_deref(), Some(audio));
        assert!(dir.path().join("k.audio").join("zh_lv1.uri").exists());
        assert!(storage.read("k").unwrap().is_none());

        storage.write_audio("k", "zh/lv1", None).unwrap();
        assert!(storage.read_audio("k", "zh/lv1").unwrap().is_none());
        storage.write_audio("k", "never-written", None).unwrap();
    }

    #[test]
    fn memory_storage_counts_writes_and_enforces_quota() {
        let storage = MemoryStorage::with_quota(4);
        storage.write("k", "abc").unwrap();
        assert!(storage.write("k", "abcdef").is_err());
        assert_eq!(storage.write_count(), 1);
        assert_eq!(storage.read("k").unwrap().as_deref(), Some("abc"));
    }
}
