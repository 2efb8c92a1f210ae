use crate::{
    config::{StoreBackend, StoreConfig},
    error::StoreError,
    store::{memory::MemoryStore, object::ObjectBlobStore},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{fmt::Debug, sync::Arc};

pub mod memory;
pub mod object;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_CSV: &str = "text/csv";

/// Listing entry for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Key-value object store bound to a single bucket.
///
/// Writes are atomic per object: a failed `put` leaves nothing behind.
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Every object whose key lives under `prefix`, in no particular order.
    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, StoreError>;

    async fn head(&self, key: &str) -> Result<BlobMeta, StoreError>;
}

/// Construct the configured store backend.
pub fn store_from_config(config: &StoreConfig) -> Result<Arc<dyn BlobStore>, StoreError> {
    let store: Arc<dyn BlobStore> = match config.backend {
        StoreBackend::S3 => Arc::new(ObjectBlobStore::s3(config)?),
        StoreBackend::Local => {
            let root = config.root.as_deref().ok_or_else(|| {
                StoreError::Config("the local backend needs `store.root`".to_string())
            })?;
            Arc::new(ObjectBlobStore::local(root)?)
        }
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };

    Ok(store)
}
