//! Client-local key/value storage for the session.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::config::SessionConfig;

use super::SessionError;

/// Durable string storage keyed by fixed names.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError>;

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;

    fn remove(&self, key: &str) -> Result<(), SessionError>;

    /// Remove every key.
    fn clear(&self) -> Result<(), SessionError>;
}

/// Storage backed by a JSON object in a file.
///
/// A missing file reads as empty.
#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Storage at the `[session] path` of the configuration.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(&config.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> Result<BTreeMap<String, String>, SessionError> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, values: &BTreeMap<String, String>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(values)?)?;
        Ok(())
    }
}

impl SessionStorage for FileSessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        let _guard = self.guard();
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let _guard = self.guard();
        let mut values = self.read()?;
        values.insert(key.to_string(), value.to_string());
        self.write(&values)
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let _guard = self.guard();
        let mut values = self.read()?;
        if values.remove(key).is_some() {
            self.write(&values)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        let _guard = self.guard();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory storage (useful for testing).
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.values().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        self.values().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_storage_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let storage = FileSessionStorage::new(dir.path().join("session.json"));
        assert_eq!(storage.get("userFolder").unwrap(), None);
    }

    #[test]
    fn test_file_storage_from_config_uses_session_path() {
        let dir = TempDir::new().unwrap();
        let config = SessionConfig {
            path: dir.path().join("state").join("session.json"),
        };

        let storage = FileSessionStorage::from_config(&config);
        assert_eq!(storage.path(), config.path.as_path());
        storage.set("userFolder", "folder-1").unwrap();
        assert!(config.path.exists());
    }

    #[test]
    fn test_file_storage_set_get_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");

        FileSessionStorage::new(&path)
            .set("userFolder", "folder-1")
            .unwrap();
        let reopened = FileSessionStorage::new(&path);
        assert_eq!(
            reopened.get("userFolder").unwrap().as_deref(),
            Some("folder-1")
        );
    }

    #[test]
    fn test_file_storage_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let storage = FileSessionStorage::new(dir.path().join("session.json"));
        storage.set("topic", "A").unwrap();
        storage.set("userName", "ada").unwrap();

        storage.remove("topic").unwrap();
        assert_eq!(storage.get("topic").unwrap(), None);
        assert_eq!(storage.get("userName").unwrap().as_deref(), Some("ada"));

        storage.clear().unwrap();
        assert!(!storage.path().exists());
        assert_eq!(storage.get("userName").unwrap(), None);
        // Clearing twice is fine
        storage.clear().unwrap();
    }

    #[test]
    fn test_file_storage_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "not json").unwrap();
        let storage = FileSessionStorage::new(&path);
        assert!(matches!(
            storage.get("topic"),
            Err(SessionError::Serialization(_))
        ));
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemorySessionStorage::new();
        storage.set("topic", "A").unwrap();
        assert_eq!(storage.len(), 1);
        storage.clear().unwrap();
        assert!(storage.is_empty());
    }
}
