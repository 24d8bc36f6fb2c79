//! Existence classification.
//!
//! The store has no "is directory" call. A path is a directory when a marker
//! object sits at its key or when at least one object lives under `key + "/"`;
//! finding that out takes an exact-key probe followed by a one-item prefix scan.

use blobpath_models::{CloudPath, PathKind};
use tracing::debug;

use crate::error::StorageResult;
use crate::store::{ListRequest, ObjectStore};

/// Classify `path` as a file, a directory or nothing.
pub async fn classify(store: &dyn ObjectStore, path: &CloudPath) -> StorageResult<PathKind> {
    if path.is_root() {
        return Ok(if store.container_exists(path.container()).await? {
            PathKind::Directory
        } else {
            PathKind::Nothing
        });
    }

    match store.head(path.container(), path.key()).await {
        Ok(metadata) if metadata.is_directory_marker() => return Ok(PathKind::Directory),
        Ok(_) => return Ok(PathKind::File),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }

    let request = ListRequest::new(path.dir_prefix()).max_results(1);
    let page = store.list_page(path.container(), &request).await?;

    let kind = if page.items.is_empty() {
        PathKind::Nothing
    } else {
        PathKind::Directory
    };
    debug!(path = %path, kind = kind.as_str(), "classified by prefix scan");
    Ok(kind)
}

/// Whether anything exists at `path`.
pub async fn exists(store: &dyn ObjectStore, path: &CloudPath) -> StorageResult<bool> {
    Ok(classify(store, path).await?.exists())
}
