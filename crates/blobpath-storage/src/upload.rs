//! Uploads from the local filesystem.

use std::path::Path;

use blobpath_models::CloudPath;
use tokio::fs;
use tracing::{debug, info};

use crate::content_type::ContentTypeResolver;
use crate::error::{StorageError, StorageResult};
use crate::store::{ObjectStore, PutBody};

/// Upload `local` to `remote`, overwriting any existing object.
///
/// Content type and encoding come from `resolver`; fields it leaves unset are
/// not sent at all.
pub async fn upload(
    store: &dyn ObjectStore,
    resolver: &dyn ContentTypeResolver,
    local: &Path,
    remote: &CloudPath,
) -> StorageResult<CloudPath> {
    let meta = fs::metadata(local).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::not_found(local.display().to_string())
        } else {
            StorageError::Io(e)
        }
    })?;
    if !meta.is_file() {
        return Err(StorageError::transfer_failed(
            local.display().to_string(),
            "not a regular file",
        ));
    }

    let settings = resolver.resolve(local);
    debug!(
        local = %local.display(),
        remote = %remote,
        content_type = ?settings.content_type,
        content_encoding = ?settings.content_encoding,
        "Uploading"
    );

    store
        .put(
            remote.container(),
            remote.key(),
            PutBody::File(local.to_path_buf()),
            &settings,
        )
        .await?;

    info!(local = %local.display(), remote = %remote, size = meta.len(), "Uploaded");
    Ok(remote.clone())
}
