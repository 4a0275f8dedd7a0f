//! Durable local key-value state.
//!
//! The persisted boost expiry and driver profile are the only durable state
//! in the system. Both are read once at startup and written on every state
//! transition; after a restart the in-memory state is always reconstructed
//! from them, never assumed fresh.

use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Arena-style durable key-value storage
pub trait KeyValueStore: Send + Sync {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T>;

    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        (**self).get(key)
    }

    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

/// Volatile store for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let values = self.values.lock().expect("store lock poisoned");
        values
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_value(value)?;
        self.values
            .lock()
            .expect("store lock poisoned")
            .insert(key.to_string(), json);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values
            .lock()
            .expect("store lock poisoned")
            .remove(key);
        Ok(())
    }
}

/// File-backed store: one JSON object per file, loaded once at construction
/// and rewritten atomically (temp file + rename) on every mutation.
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("discarding unreadable state file {path:?}: {err}");
                HashMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    fn flush(&self, values: &HashMap<String, serde_json::Value>) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let values = self.values.lock().expect("store lock poisoned");
        values
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_value(value)?;
        let mut values = self.values.lock().expect("store lock poisoned");
        values.insert(key.to_string(), json);
        self.flush(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().expect("store lock poisoned");
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        store.set("answer", &42_u32).unwrap();
        assert_eq!(store.get::<u32>("answer"), Some(42));

        store.remove("answer").unwrap();
        assert_eq!(store.get::<u32>("answer"), None);
    }

    #[test]
    fn test_json_file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("hotzones-store-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store.set("boost_until", &"2025-01-01T00:00:00Z").unwrap();
        }
        {
            let store = JsonFileStore::open(&path).unwrap();
            assert_eq!(
                store.get::<String>("boost_until").as_deref(),
                Some("2025-01-01T00:00:00Z")
            );
            store.remove("boost_until").unwrap();
        }
        {
            let store = JsonFileStore::open(&path).unwrap();
            assert_eq!(store.get::<String>("boost_until"), None);
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_state_file_is_discarded() {
        let dir = std::env::temp_dir().join(format!("hotzones-corrupt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get::<String>("anything"), None);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
