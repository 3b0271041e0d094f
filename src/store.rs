//! Key-value persistence for learner state.
//!
//! Everything we keep between runs (theme, exam settings, history, ...) is a
//! JSON blob under one key. `KvStore` is injected into the history log and the
//! preferences so tests can swap the on-disk store for `MemoryStore`.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::error::AppError;

pub const KEY_THEME: &str = "theme";
pub const KEY_EXAM_SETTINGS: &str = "examSettings";
pub const KEY_HISTORY: &str = "practiceHistory";
pub const KEY_RECOMMENDED_LEVEL: &str = "nivelRecomanat";
pub const KEY_ONBOARDING: &str = "onboardingComplete";
pub const KEY_MILESTONES: &str = "sharePopupMilestones";

pub trait KvStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>, AppError>;
  fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
  fn remove(&self, key: &str) -> Result<(), AppError>;
}

pub type SharedStore = Arc<dyn KvStore>;

/// Read and decode a JSON value. Missing, unreadable or corrupt entries
/// yield None; read failures are logged, never propagated.
pub fn load_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Option<T> {
  match store.get(key) {
    Ok(Some(raw)) => match serde_json::from_str(&raw) {
      Ok(v) => Some(v),
      Err(e) => {
        warn!(target: "practica_valencia", %key, error = %e, "Stored value is corrupt; using default");
        None
      }
    },
    Ok(None) => None,
    Err(e) => {
      warn!(target: "practica_valencia", %key, error = %e, "Failed to read stored value");
      None
    }
  }
}

/// Encode and write a JSON value; failures are logged and reported back
/// so callers can note they are running memory-only.
pub fn save_json<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> bool {
  let result = serde_json::to_string(value)
    .map_err(AppError::from)
    .and_then(|json| store.set(key, &json));
  match result {
    Ok(()) => true,
    Err(e) => {
      warn!(target: "practica_valencia", %key, error = %e, "Failed to persist value; keeping it in memory only");
      false
    }
  }
}

/// One file per key under a base directory, written atomically.
pub struct JsonFileStore {
  base_dir: PathBuf,
}

impl JsonFileStore {
  pub fn with_base_dir(base_dir: PathBuf) -> Result<Self, AppError> {
    fs::create_dir_all(&base_dir)?;
    Ok(Self { base_dir })
  }

  fn file_path(&self, key: &str) -> PathBuf {
    self.base_dir.join(format!("{key}.json"))
  }
}

impl KvStore for JsonFileStore {
  fn get(&self, key: &str) -> Result<Option<String>, AppError> {
    let path = self.file_path(key);
    if !path.exists() {
      return Ok(None);
    }
    Ok(Some(fs::read_to_string(&path)?))
  }

  fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
    let path = self.file_path(key);
    let tmp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(value.as_bytes())?;
    file.sync_all()?;

    fs::rename(&tmp_path, &path)?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), AppError> {
    let path = self.file_path(key);
    if path.exists() {
      fs::remove_file(&path)?;
    }
    Ok(())
  }
}

/// In-memory store; also the fallback when the data dir cannot be created.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KvStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, AppError> {
    let entries = self.entries.lock().map_err(|e| AppError::Persistence(e.to_string()))?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
    let mut entries = self.entries.lock().map_err(|e| AppError::Persistence(e.to_string()))?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), AppError> {
    let mut entries = self.entries.lock().map_err(|e| AppError::Persistence(e.to_string()))?;
    entries.remove(key);
    Ok(())
  }
}

/// Store whose every operation fails. Exercises the memory-only degradation paths.
#[cfg(test)]
pub(crate) struct BrokenStore;

#[cfg(test)]
impl KvStore for BrokenStore {
  fn get(&self, _: &str) -> Result<Option<String>, AppError> {
    Err(AppError::Persistence("disk on fire".into()))
  }
  fn set(&self, _: &str, _: &str) -> Result<(), AppError> {
    Err(AppError::Persistence("disk on fire".into()))
  }
  fn remove(&self, _: &str) -> Result<(), AppError> {
    Err(AppError::Persistence("disk on fire".into()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn make_test_store() -> (TempDir, JsonFileStore) {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::with_base_dir(dir.path().to_path_buf()).unwrap();
    (dir, store)
  }

  #[test]
  fn test_file_store_set_get_remove() {
    let (_dir, store) = make_test_store();
    assert_eq!(store.get(KEY_THEME).unwrap(), None);

    store.set(KEY_THEME, "\"dark\"").unwrap();
    assert_eq!(store.get(KEY_THEME).unwrap().as_deref(), Some("\"dark\""));
    assert!(store.file_path(KEY_THEME).exists());
    assert!(!store.file_path(KEY_THEME).with_extension("tmp").exists());

    store.remove(KEY_THEME).unwrap();
    assert_eq!(store.get(KEY_THEME).unwrap(), None);
    // Removing a missing key is fine.
    store.remove(KEY_THEME).unwrap();
  }

  #[test]
  fn test_load_json_treats_corrupt_value_as_missing() {
    let (_dir, store) = make_test_store();
    fs::write(store.file_path(KEY_MILESTONES), "[3, 10").unwrap();
    let loaded: Option<Vec<usize>> = load_json(&store, KEY_MILESTONES);
    assert!(loaded.is_none());
  }

  #[test]
  fn test_save_then_load_json() {
    let store = MemoryStore::new();
    assert!(save_json(&store, KEY_MILESTONES, &vec![3usize, 10]));
    let loaded: Option<Vec<usize>> = load_json(&store, KEY_MILESTONES);
    assert_eq!(loaded, Some(vec![3, 10]));
  }

  #[test]
  fn test_broken_store_degrades_quietly() {
    let store = BrokenStore;
    assert!(!save_json(&store, KEY_THEME, &"dark"));
    let loaded: Option<String> = load_json(&store, KEY_THEME);
    assert!(loaded.is_none());
  }
}
