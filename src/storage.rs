//! Session-scoped key/value storage

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{Result, StorefrontError};

/// String blobs keyed by name, living as long as one shopper session.
pub trait SessionStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: String) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// In-memory storage; clones share the same entries.
///
/// An optional quota caps the bytes held across all keys, like a browser's
/// session storage does.
#[derive(Clone, Debug, Default)]
pub struct MemorySessionStorage {
    entries: Arc<RwLock<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl MemorySessionStorage {
    pub fn new() -> Self { Self::default() }

    pub fn with_quota(bytes: usize) -> Self { Self { quota: Some(bytes), ..Self::default() } }
}

impl SessionStorage for MemorySessionStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> { Ok(self.entries.read().get(key).cloned()) }

    fn set_item(&self, key: &str, value: String) -> Result<()> {
        let mut entries = self.entries.write();
        if let Some(quota) = self.quota {
            let others: usize = entries.iter().filter(|(k, _)| k.as_str() != key).map(|(k, v)| k.len() + v.len()).sum();
            let used = others + key.len() + value.len();
            if used > quota {
                return Err(StorefrontError::Storage(format!("quota of {quota} bytes exceeded ({used} bytes)")));
            }
        }
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}
