use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

use crate::errors::{Result, SgAuthError};
use crate::store::KeyValueStore;

/// On-disk document holding all preference values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PrefsDocument {
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    values: HashMap<String, String>,
}

/// File-based key-value store
///
/// Persists preference values in a single JSON document, the local
/// equivalent of an engine's player-preferences slot.
///
/// # Directory Structure
/// ```text
/// ~/.config/signet/sg-auth/
/// ├── prefs.json             # Preference values + last-updated stamp
/// └── lock                   # Advisory lock file
/// ```
#[derive(Debug)]
pub struct FileKeyValueStore {
    prefs_file: PathBuf,
    lock_file: PathBuf,
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl FileKeyValueStore {
    /// Open a store rooted at `storage_dir`, loading any existing values
    pub async fn new(storage_dir: impl AsRef<Path>) -> Result<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        let prefs_file = storage_dir.join("prefs.json");
        let lock_file = storage_dir.join("lock");

        fs::create_dir_all(&storage_dir).await?;

        // Set secure permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(&storage_dir, perms)?;
        }

        let values = if prefs_file.exists() {
            let content = fs::read_to_string(&prefs_file).await?;
            let document: PrefsDocument = serde_json::from_str(&content)?;
            document.values
        } else {
            HashMap::new()
        };

        Ok(Self {
            prefs_file,
            lock_file,
            values: Arc::new(RwLock::new(values)),
        })
    }

    /// Get default storage directory for the current platform
    pub fn default_storage_dir() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("", "", "signet").ok_or_else(|| {
            SgAuthError::Store("Could not determine config directory".to_string())
        })?;

        Ok(project_dirs.config_dir().join("sg-auth"))
    }

    /// Acquire an exclusive lock on the storage
    fn acquire_lock(&self) -> Result<std::fs::File> {
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.lock_file)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| SgAuthError::LockTimeout)?;

        Ok(lock_file)
    }

    /// Write the full document to disk atomically
    async fn persist(&self, values: &HashMap<String, String>) -> Result<()> {
        let document = PrefsDocument {
            updated_at: Some(Utc::now()),
            values: values.clone(),
        };
        let content = serde_json::to_string_pretty(&document)?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.prefs_file.with_extension("tmp");
        fs::write(&temp_path, content).await?;

        // Sync to disk
        let file = std::fs::File::open(&temp_path)?;
        file.sync_all()?;

        // Atomic rename
        fs::rename(&temp_path, &self.prefs_file).await?;

        // Set secure permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.prefs_file, perms)?;
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _lock = self.acquire_lock()?;

        let mut values = self.values.read().await.clone();
        values.insert(key.to_string(), value.to_string());
        self.persist(&values).await?;

        *self.values.write().await = values;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _lock = self.acquire_lock()?;

        let mut values = self.values.read().await.clone();
        if values.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&values).await?;

        *self.values.write().await = values;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store() -> (FileKeyValueStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path()).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _temp) = create_test_store().await;

        store.set("user_id", "U123").await.unwrap();
        assert_eq!(store.get("user_id").await.as_deref(), Some("U123"));
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = FileKeyValueStore::new(temp_dir.path()).await.unwrap();
            store.set("user_id", "U123").await.unwrap();
        }

        let reopened = FileKeyValueStore::new(temp_dir.path()).await.unwrap();
        assert_eq!(reopened.get("user_id").await.as_deref(), Some("U123"));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _temp) = create_test_store().await;

        store.delete("user_id").await.unwrap();

        store.set("user_id", "U123").await.unwrap();
        store.delete("user_id").await.unwrap();
        assert!(store.get("user_id").await.is_none());

        store.delete("user_id").await.unwrap();
        assert!(store.get("user_id").await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_prefs_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("prefs.json"), "not json {{{").unwrap();

        let result = FileKeyValueStore::new(temp_dir.path()).await;
        assert!(matches!(result, Err(SgAuthError::Serde(_))));
    }
}
