use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::errors::{Result, SgAuthError};

/// Trait for the local key-value store that holds the stored user id
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value by key
    async fn get(&self, key: &str) -> Option<String>;

    /// Write a value, overwriting any previous one
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory key-value store for testing and simple use cases
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            values: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .map_err(|_| SgAuthError::Store("Lock poisoned".to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values
            .write()
            .map_err(|_| SgAuthError::Store("Lock poisoned".to_string()))?
            .remove(key);
        Ok(())
    }
}
