use tracing::debug;

use crate::{
    error::{EtlError, Result},
    store::BlobStore,
};

/// Key of the most recently modified object under `prefix`.
///
/// "Latest" is whatever the store reports as last modified. Key order and
/// content are ignored, and ties resolve to an arbitrary candidate.
pub async fn latest_key(store: &dyn BlobStore, prefix: &str) -> Result<String> {
    let objects = store.list(prefix).await?;
    debug!(prefix, candidates = objects.len(), "listed objects");

    objects
        .into_iter()
        .max_by_key(|meta| meta.last_modified)
        .map(|meta| meta.key)
        .ok_or_else(|| EtlError::NotFound {
            prefix: prefix.to_string(),
        })
}
