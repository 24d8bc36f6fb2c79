//! Atomic downloads into the local filesystem.
//!
//! Content is streamed into `<local>.part` and renamed over the target only
//! once every byte has been written, so the target is never observed half
//! written. The staging file is removed on every failure path.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use blobpath_models::CloudPath;
use futures::TryStreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::StorageResult;
use crate::store::{ByteStream, ObjectStore};

/// Suffix of in-flight download files.
pub const STAGING_SUFFIX: &str = ".part";

/// Staging path for a download into `local`.
pub fn staging_path(local: &Path) -> PathBuf {
    let mut name: OsString = local.as_os_str().to_owned();
    name.push(STAGING_SUFFIX);
    PathBuf::from(name)
}

/// Download `remote` into `local`, replacing it atomically.
///
/// On failure `local` keeps its previous state and the triggering error is
/// returned as is.
pub async fn download(
    store: &dyn ObjectStore,
    remote: &CloudPath,
    local: &Path,
) -> StorageResult<PathBuf> {
    debug!(remote = %remote, local = %local.display(), "Downloading");

    let stream = store.get_stream(remote.container(), remote.key()).await?;

    if let Some(parent) = local.parent() {
        fs::create_dir_all(parent).await?;
    }

    let staging = staging_path(local);
    match stage_and_commit(stream, &staging, local).await {
        Ok(bytes) => {
            info!(remote = %remote, local = %local.display(), bytes, "Downloaded");
            Ok(local.to_path_buf())
        }
        Err(e) => {
            remove_staging(&staging).await;
            Err(e)
        }
    }
}

async fn stage_and_commit(
    mut stream: ByteStream,
    staging: &Path,
    local: &Path,
) -> StorageResult<u64> {
    let mut file = fs::File::create(staging).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = stream.try_next().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(staging, local).await?;
    Ok(written)
}

async fn remove_staging(staging: &Path) {
    match fs::remove_file(staging).await {
        Ok(()) => debug!(staging = %staging.display(), "Removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            staging = %staging.display(),
            error = %e,
            "Failed to remove partial download"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::memory::{Fault, MemoryStore, MEMORY_SCHEME};
    use crate::store::PutBody;
    use blobpath_models::ContentSettings;
    use bytes::Bytes;
    use tempfile::TempDir;

    async fn store_with(key: &str, data: &'static [u8]) -> MemoryStore {
        let store = MemoryStore::new().with_chunk_size(4);
        store.create_container("c1");
        store
            .put("c1", key, PutBody::Bytes(Bytes::from_static(data)), &ContentSettings::default())
            .await
            .unwrap();
        store
    }

    fn remote(key: &str) -> CloudPath {
        CloudPath::new(MEMORY_SCHEME, "c1", key).unwrap()
    }

    #[test]
    fn test_staging_path_appends_suffix() {
        assert_eq!(
            staging_path(Path::new("/cache/c1/notes/todo.txt")),
            PathBuf::from("/cache/c1/notes/todo.txt.part")
        );
    }

    #[tokio::test]
    async fn test_download_creates_parents_and_leaves_no_staging() {
        let dir = TempDir::new().unwrap();
        let store = store_with("notes/todo.txt", b"buy milk").await;
        let local = dir.path().join("c1").join("notes").join("todo.txt");

        let result = download(&store, &remote("notes/todo.txt"), &local).await.unwrap();

        assert_eq!(result, local);
        assert_eq!(fs::read(&local).await.unwrap(), b"buy milk");
        assert!(!staging_path(&local).exists());
    }

    #[tokio::test]
    async fn test_download_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let store = store_with("f.txt", b"new content").await;
        let local = dir.path().join("f.txt");
        fs::write(&local, b"old").await.unwrap();

        download(&store, &remote("f.txt"), &local).await.unwrap();
        assert_eq!(fs::read(&local).await.unwrap(), b"new content");
    }

    #[tokio::test]
    async fn test_failed_transfer_keeps_previous_content() {
        let dir = TempDir::new().unwrap();
        let store = store_with("f.txt", b"0123456789abcdef").await;
        store.inject_fault("c1", "f.txt", Fault::StreamAfter(6));
        let local = dir.path().join("f.txt");
        fs::write(&local, b"previous").await.unwrap();

        let err = download(&store, &remote("f.txt"), &local).await.unwrap_err();

        assert!(matches!(err, StorageError::TransferFailed { .. }));
        assert_eq!(fs::read(&local).await.unwrap(), b"previous");
        assert!(!staging_path(&local).exists());
    }

    #[tokio::test]
    async fn test_failed_transfer_leaves_target_absent() {
        let dir = TempDir::new().unwrap();
        let store = store_with("f.txt", b"0123456789").await;
        store.inject_fault("c1", "f.txt", Fault::StreamAfter(5));
        let local = dir.path().join("sub").join("f.txt");

        assert!(download(&store, &remote("f.txt"), &local).await.is_err());
        assert!(!local.exists());
        assert!(!staging_path(&local).exists());
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store_with("f.txt", b"x").await;
        let local = dir.path().join("g.txt");

        let err = download(&store, &remote("g.txt"), &local).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(!local.exists());
    }
}
