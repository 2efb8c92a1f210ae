use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use crate::error::StoreError;

use super::{BlobMeta, BlobStore};

#[derive(Debug, Clone)]
struct Entry {
    bytes: Vec<u8>,
    content_type: String,
    last_modified: DateTime<Utc>,
}

/// In-process store. Used for dry runs and as the test fake; modification
/// times can be set explicitly with [`MemoryStore::insert_at`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Entry>>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every `put` fails, for exercising write-failure paths.
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Store an object with a chosen modification time.
    pub fn insert_at(&self, key: &str, bytes: impl Into<Vec<u8>>, last_modified: DateTime<Utc>) {
        self.lock().insert(
            key.to_string(),
            Entry {
                bytes: bytes.into(),
                content_type: String::new(),
                last_modified,
            },
        );
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.lock().get(key).map(|e| e.content_type.clone())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Entry>> {
        // A panic while holding the lock cannot leave a map half-updated.
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn meta(key: &str, entry: &Entry) -> BlobMeta {
    BlobMeta {
        key: key.to_string(),
        last_modified: entry.last_modified,
        size: entry.bytes.len() as u64,
    }
}

fn under_prefix(key: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_matches('/');
    prefix.is_empty()
        || key
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Rejected {
                key: key.to_string(),
                reason: "memory store rejects writes".to_string(),
            });
        }

        self.lock().insert(
            key.to_string(),
            Entry {
                bytes,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.lock()
            .get(key)
            .map(|e| e.bytes.clone())
            .ok_or_else(|| StoreError::NotFound { key: key.to_string() })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, StoreError> {
        Ok(self
            .lock()
            .iter()
            .filter(|(key, _)| under_prefix(key, prefix))
            .map(|(key, entry)| meta(key, entry))
            .collect())
    }

    async fn head(&self, key: &str) -> Result<BlobMeta, StoreError> {
        self.lock()
            .get(key)
            .map(|e| meta(key, e))
            .ok_or_else(|| StoreError::NotFound { key: key.to_string() })
    }
}
