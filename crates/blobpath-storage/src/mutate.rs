//! Move, copy and recursive remove.
//!
//! None of these are transactional. A failure between the copy and the delete
//! of a move leaves both objects in place, and a failure partway through a
//! recursive remove leaves a partially deleted tree. Errors propagate as is.

use std::collections::HashMap;

use blobpath_models::{CloudPath, PathKind};
use chrono::Utc;
use futures::TryStreamExt;
use tracing::{debug, info};

use crate::classify::classify;
use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;
use crate::walk::{walk, WalkedEntry};

/// User metadata field refreshed by a same-path move.
pub const LAST_MODIFIED_FIELD: &str = "last_modified";

/// Keys per batch delete call.
pub const DELETE_BATCH_SIZE: usize = 1000;

/// Move `src` to `dst` with a server-side copy, deleting `src` when `remove_src`.
///
/// Moving a path onto itself transfers nothing and only refreshes its
/// last-modified metadata.
pub async fn move_path(
    store: &dyn ObjectStore,
    src: &CloudPath,
    dst: &CloudPath,
    remove_src: bool,
) -> StorageResult<CloudPath> {
    if src == dst {
        let metadata = HashMap::from([(
            LAST_MODIFIED_FIELD.to_string(),
            Utc::now().timestamp().to_string(),
        )]);
        store
            .set_metadata(src.container(), src.key(), metadata)
            .await?;
        debug!(path = %src, "Touched");
        return Ok(dst.clone());
    }

    store
        .copy(src.container(), src.key(), dst.container(), dst.key())
        .await?;
    info!(src = %src, dst = %dst, "Copied");

    if remove_src {
        remove(store, src, true).await?;
    }

    Ok(dst.clone())
}

/// Remove whatever is at `path`.
///
/// Directories are torn down files first, then markers deepest first, then
/// the directory's own marker. A missing path is an error unless `missing_ok`.
pub async fn remove(store: &dyn ObjectStore, path: &CloudPath, missing_ok: bool) -> StorageResult<()> {
    match classify(store, path).await? {
        PathKind::Nothing => {
            if missing_ok {
                Ok(())
            } else {
                Err(StorageError::not_found(path.to_string()))
            }
        }
        PathKind::File => {
            store.delete(path.container(), path.key()).await?;
            info!(path = %path, "Removed file");
            Ok(())
        }
        PathKind::Directory => remove_tree(store, path).await,
    }
}

async fn remove_tree(store: &dyn ObjectStore, path: &CloudPath) -> StorageResult<()> {
    let walked: Vec<WalkedEntry> = walk(store, path, true).try_collect().await?;

    let mut files = Vec::new();
    let mut markers = Vec::new();
    let mut own_markers = Vec::new();
    for w in walked {
        if w.is_own_marker {
            own_markers.push(w.store_key);
        } else if w.entry.is_dir {
            markers.push(w.store_key);
        } else {
            files.push(w.store_key);
        }
    }

    let container = path.container();

    for batch in files.chunks(DELETE_BATCH_SIZE) {
        store.delete_many(container, batch).await?;
    }

    // Deepest first: a marker never outlives the markers below it.
    markers.sort_unstable_by(|a, b| b.cmp(a));
    for marker in &markers {
        store.delete(container, marker).await?;
    }

    if !path.is_root() {
        store.delete(container, path.key()).await?;
    }
    for own in &own_markers {
        store.delete(container, own).await?;
    }

    info!(
        path = %path,
        files = files.len(),
        markers = markers.len() + own_markers.len(),
        "Removed directory"
    );
    Ok(())
}
