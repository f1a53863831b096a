use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during state persistence operations
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to serialize state: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Failed to write state: {0}")]
    WriteError(#[from] std::io::Error),

    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),
}

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Durable local key-value storage.
///
/// Writes are synchronous. Callers treat a failed write as best-effort: it is logged and the
/// in-memory state stays authoritative.
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: String) -> PersistenceResult<()>;

    fn remove(&mut self, key: &str) -> PersistenceResult<()>;

    fn flush(&mut self) -> PersistenceResult<()> {
        Ok(())
    }
}

/// In-memory storage. Clones share the same map, so a handle can be inspected
/// after the storage has been handed to a store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    values: Arc<Mutex<HashMap<String, String>>>,
    /// Maximum bytes per value, mimicking a browser storage quota
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects values longer than `bytes`
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> PersistenceResult<()> {
        if let Some(quota) = self.quota {
            if value.len() > quota {
                return Err(PersistenceError::QuotaExceeded(format!(
                    "{} bytes for {key}, quota is {quota}",
                    value.len()
                )));
            }
        }
        self.values.lock().insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> PersistenceResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// One file per key inside a state directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    state_dir: PathBuf,
}

impl FileStorage {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.state_dir.join(format!("{file_name}.json"))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                log::warn!("Failed to read {}: {}", path.display(), err);
                None
            }
        }
    }

    fn set(&mut self, key: &str, value: String) -> PersistenceResult<()> {
        fs::create_dir_all(&self.state_dir)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> PersistenceResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// Adapter over eframe's app storage
pub struct EframeStorage<'a> {
    storage: &'a mut dyn eframe::Storage,
}

impl<'a> EframeStorage<'a> {
    pub fn new(storage: &'a mut dyn eframe::Storage) -> Self {
        Self { storage }
    }
}

impl KeyValueStorage for EframeStorage<'_> {
    fn get(&self, key: &str) -> Option<String> {
        // Removed keys are stored as empty strings
        self.storage.get_string(key).filter(|value| !value.is_empty())
    }

    fn set(&mut self, key: &str, value: String) -> PersistenceResult<()> {
        self.storage.set_string(key, value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> PersistenceResult<()> {
        self.storage.set_string(key, String::new());
        Ok(())
    }

    fn flush(&mut self) -> PersistenceResult<()> {
        self.storage.flush();
        Ok(())
    }
}

/// Copy every key from `from` into `to`
pub fn copy_keys(
    from: &dyn KeyValueStorage,
    to: &mut dyn KeyValueStorage,
    keys: &[&str],
) -> PersistenceResult<()> {
    for key in keys {
        if let Some(value) = from.get(key) {
            to.set(key, value)?;
        }
    }
    to.flush()
}
