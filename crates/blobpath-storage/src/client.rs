//! Path-level client.
//!
//! [`BlobClient`] exposes the filesystem operations on [`CloudPath`] values
//! and local paths; store handles never leak through it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use blobpath_models::{CloudPath, ObjectMetadata, PathKind};

use crate::classify;
use crate::content_type::{ContentTypeResolver, GuessContentType};
use crate::download;
use crate::error::{StorageError, StorageResult};
use crate::mutate;
use crate::presign::{self, PresignedUrl};
use crate::store::ObjectStore;
use crate::upload;
use crate::walk::{self, EntryStream};

/// Filesystem-style operations over one object store.
#[derive(Clone)]
pub struct BlobClient {
    store: Arc<dyn ObjectStore>,
    content_types: Arc<dyn ContentTypeResolver>,
}

impl BlobClient {
    /// Create a client guessing upload content types from file names.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            content_types: Arc::new(GuessContentType),
        }
    }

    /// Replace the content type resolver used by uploads.
    pub fn with_content_types(mut self, resolver: Arc<dyn ContentTypeResolver>) -> Self {
        self.content_types = resolver;
        self
    }

    pub fn scheme(&self) -> &str {
        self.store.scheme()
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Path for `container/key` in this client's scheme.
    pub fn path(&self, container: &str, key: &str) -> StorageResult<CloudPath> {
        Ok(CloudPath::new(self.scheme(), container, key)?)
    }

    fn check(&self, path: &CloudPath) -> StorageResult<()> {
        if path.scheme() == self.scheme() {
            Ok(())
        } else {
            Err(StorageError::UnknownScheme(format!(
                "{} (client handles {}://)",
                path,
                self.scheme()
            )))
        }
    }

    pub async fn classify(&self, path: &CloudPath) -> StorageResult<PathKind> {
        self.check(path)?;
        classify::classify(self.store(), path).await
    }

    pub async fn exists(&self, path: &CloudPath) -> StorageResult<bool> {
        self.check(path)?;
        classify::exists(self.store(), path).await
    }

    pub async fn is_file(&self, path: &CloudPath) -> StorageResult<bool> {
        Ok(self.classify(path).await?.is_file())
    }

    pub async fn is_dir(&self, path: &CloudPath) -> StorageResult<bool> {
        Ok(self.classify(path).await?.is_dir())
    }

    /// Metadata of the object at exactly `path`.
    pub async fn metadata(&self, path: &CloudPath) -> StorageResult<ObjectMetadata> {
        self.check(path)?;
        self.store.head(path.container(), path.key()).await
    }

    /// Children of `path`, or all descendants when `recursive`.
    pub fn list(&self, path: &CloudPath, recursive: bool) -> StorageResult<EntryStream<'_>> {
        self.check(path)?;
        Ok(walk::list(self.store(), path, recursive))
    }

    pub async fn download(&self, remote: &CloudPath, local: &Path) -> StorageResult<PathBuf> {
        self.check(remote)?;
        download::download(self.store(), remote, local).await
    }

    pub async fn upload(&self, local: &Path, remote: &CloudPath) -> StorageResult<CloudPath> {
        self.check(remote)?;
        upload::upload(self.store(), self.content_types.as_ref(), local, remote).await
    }

    /// Create an explicit directory marker at `path`.
    pub async fn mkdir(&self, path: &CloudPath) -> StorageResult<()> {
        self.check(path)?;
        if path.is_root() {
            return Ok(());
        }
        self.store.put_marker(path.container(), path.key()).await
    }

    pub async fn move_path(
        &self,
        src: &CloudPath,
        dst: &CloudPath,
        remove_src: bool,
    ) -> StorageResult<CloudPath> {
        self.check(src)?;
        self.check(dst)?;
        mutate::move_path(self.store(), src, dst, remove_src).await
    }

    /// Server-side copy that keeps the source.
    pub async fn copy(&self, src: &CloudPath, dst: &CloudPath) -> StorageResult<CloudPath> {
        self.move_path(src, dst, false).await
    }

    pub async fn remove(&self, path: &CloudPath, missing_ok: bool) -> StorageResult<()> {
        self.check(path)?;
        mutate::remove(self.store(), path, missing_ok).await
    }

    /// Time-limited read URL for `path`.
    pub async fn presign(&self, path: &CloudPath, expire_seconds: u64) -> StorageResult<PresignedUrl> {
        self.check(path)?;
        presign::issue(self.store(), path, expire_seconds).await
    }

    /// Unsigned URL for `path`.
    pub fn public_url(&self, path: &CloudPath) -> StorageResult<String> {
        self.check(path)?;
        Ok(self.store.public_url(path.container(), path.key()))
    }
}
