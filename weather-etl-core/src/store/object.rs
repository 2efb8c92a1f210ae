use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::{
    Attribute, Attributes, ClientOptions, ObjectMeta, ObjectStore, PutOptions, PutPayload,
    aws::AmazonS3Builder, local::LocalFileSystem, path::Path as ObjectPath,
};
use std::{fmt, path::Path, sync::Arc};
use tracing::debug;

use crate::{config::StoreConfig, error::StoreError};

use super::{BlobMeta, BlobStore};

/// [`BlobStore`] over any `object_store` backend (S3 or a local directory).
#[derive(Clone)]
pub struct ObjectBlobStore {
    inner: Arc<dyn ObjectStore>,
    /// Local directories cannot hold a content type; S3 can.
    content_types: bool,
    label: String,
}

impl fmt::Debug for ObjectBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBlobStore").field("backend", &self.label).finish()
    }
}

impl ObjectBlobStore {
    /// S3 (or S3-compatible) bucket. Credentials come from the standard AWS
    /// environment variables unless the endpoint setup overrides them.
    pub fn s3(config: &StoreConfig) -> Result<Self, StoreError> {
        let bucket = config.bucket.as_deref().ok_or_else(|| {
            StoreError::Config("the s3 backend needs a bucket name".to_string())
        })?;

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_allow_http(config.allow_http)
            .with_client_options(ClientOptions::new().with_timeout(config.timeout()));

        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        Ok(Self {
            inner: Arc::new(builder.build()?),
            content_types: true,
            label: format!("s3://{bucket}"),
        })
    }

    /// Directory on the local filesystem, created if missing.
    pub fn local(root: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root).map_err(|e| {
            StoreError::Config(format!("cannot create store root {}: {e}", root.display()))
        })?;

        Ok(Self {
            inner: Arc::new(LocalFileSystem::new_with_prefix(root)?),
            content_types: false,
            label: format!("file://{}", root.display()),
        })
    }
}

fn to_meta(meta: ObjectMeta) -> BlobMeta {
    BlobMeta {
        key: meta.location.to_string(),
        last_modified: meta.last_modified,
        size: meta.size as u64,
    }
}

fn map_err(key: &str, err: object_store::Error) -> StoreError {
    match err {
        object_store::Error::NotFound { .. } => StoreError::NotFound { key: key.to_string() },
        other => StoreError::Backend(other),
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        let mut opts = PutOptions::default();
        if self.content_types {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            opts.attributes = attributes;
        }

        debug!(backend = %self.label, key, size = bytes.len(), "put object");
        self.inner
            .put_opts(&ObjectPath::from(key), PutPayload::from(bytes), opts)
            .await
            .map_err(|e| map_err(key, e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let result = self
            .inner
            .get(&ObjectPath::from(key))
            .await
            .map_err(|e| map_err(key, e))?;
        let bytes = result.bytes().await.map_err(|e| map_err(key, e))?;
        Ok(bytes.to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>, StoreError> {
        let prefix = prefix.trim_matches('/');
        let path = (!prefix.is_empty()).then(|| ObjectPath::from(prefix));

        let objects: Vec<ObjectMeta> = self.inner.list(path.as_ref()).try_collect().await?;
        Ok(objects.into_iter().map(to_meta).collect())
    }

    async fn head(&self, key: &str) -> Result<BlobMeta, StoreError> {
        let meta = self
            .inner
            .head(&ObjectPath::from(key))
            .await
            .map_err(|e| map_err(key, e))?;
        Ok(to_meta(meta))
    }
}
