//! End-to-end tests for BlobClient over the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use blobpath_models::{CloudPath, PathKind};
use chrono::Duration;
use futures::TryStreamExt;
use tempfile::TempDir;
use tokio::fs;

use crate::client::BlobClient;
use crate::content_type::NoContentType;
use crate::error::StorageError;
use crate::memory::{MemoryStore, MEMORY_SCHEME};
use crate::presign::DEFAULT_EXPIRY_SECS;
use crate::session::SessionConfig;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (Arc<MemoryStore>, BlobClient) {
    init_tracing();
    let store = Arc::new(MemoryStore::new().with_page_size(2));
    store.create_container("c1");
    let client = BlobClient::new(store.clone());
    (store, client)
}

fn path(key: &str) -> CloudPath {
    CloudPath::new(MEMORY_SCHEME, "c1", key).unwrap()
}

async fn write_local(dir: &TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
    let local = dir.path().join(name);
    fs::write(&local, data).await.unwrap();
    local
}

#[tokio::test]
async fn test_upload_list_download_remove() {
    let (store, client) = setup();
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "todo.txt", b"buy milk").await;

    client.upload(&local, &path("notes/todo.txt")).await.unwrap();

    assert_eq!(client.classify(&path("notes")).await.unwrap(), PathKind::Directory);
    assert_eq!(client.classify(&path("notes/todo.txt")).await.unwrap(), PathKind::File);
    assert_eq!(client.classify(&path("notes/other")).await.unwrap(), PathKind::Nothing);

    let entries: Vec<_> = client
        .list(&path("notes"), false)
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, path("notes/todo.txt"));
    assert!(!entries[0].is_dir);

    let target = dir.path().join("cache").join("c1").join("notes").join("todo.txt");
    client.download(&path("notes/todo.txt"), &target).await.unwrap();
    assert_eq!(fs::read(&target).await.unwrap(), b"buy milk");

    client.remove(&path("notes"), false).await.unwrap();
    assert_eq!(client.classify(&path("notes")).await.unwrap(), PathKind::Nothing);
    assert!(store.keys("c1").is_empty());
}

#[tokio::test]
async fn test_move_then_classify() {
    let (_store, client) = setup();
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "a.csv", b"x,y\n1,2\n").await;
    client.upload(&local, &path("in/a.csv")).await.unwrap();

    let moved = client
        .move_path(&path("in/a.csv"), &path("out/a.csv"), true)
        .await
        .unwrap();

    assert_eq!(moved, path("out/a.csv"));
    assert!(!client.exists(&path("in/a.csv")).await.unwrap());
    assert!(!client.exists(&path("in")).await.unwrap());
    assert!(client.is_file(&path("out/a.csv")).await.unwrap());
    assert!(client.is_dir(&path("out")).await.unwrap());

    let meta = client.metadata(&path("out/a.csv")).await.unwrap();
    assert_eq!(meta.content_type.as_deref(), Some("text/csv"));
}

#[tokio::test]
async fn test_copy_keeps_both() {
    let (_store, client) = setup();
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "a.txt", b"a").await;
    client.upload(&local, &path("a.txt")).await.unwrap();

    client.copy(&path("a.txt"), &path("b.txt")).await.unwrap();

    assert!(client.is_file(&path("a.txt")).await.unwrap());
    assert!(client.is_file(&path("b.txt")).await.unwrap());
}

#[tokio::test]
async fn test_remove_every_descendant() {
    let (_store, client) = setup();
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "f", b"x").await;

    client.mkdir(&path("tree")).await.unwrap();
    client.mkdir(&path("tree/empty")).await.unwrap();
    for key in ["tree/a", "tree/b/c", "tree/b/d/e", "tree/b/d/f", "sibling"] {
        client.upload(&local, &path(key)).await.unwrap();
    }

    let before: Vec<_> = client
        .list(&path("tree"), true)
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(before.len(), 5);

    client.remove(&path("tree"), false).await.unwrap();

    for entry in &before {
        assert_eq!(client.classify(&entry.path).await.unwrap(), PathKind::Nothing);
    }
    assert_eq!(client.classify(&path("tree")).await.unwrap(), PathKind::Nothing);
    assert!(client.is_file(&path("sibling")).await.unwrap());
}

#[tokio::test]
async fn test_mkdir_creates_empty_directory() {
    let (_store, client) = setup();

    client.mkdir(&path("empty")).await.unwrap();

    assert_eq!(client.classify(&path("empty")).await.unwrap(), PathKind::Directory);
    let entries: Vec<_> = client
        .list(&path("empty"), true)
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_custom_content_type_resolver() {
    let (_store, client) = setup();
    let client = client.with_content_types(Arc::new(NoContentType));
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "page.html", b"<p>").await;

    client.upload(&local, &path("page.html")).await.unwrap();

    let meta = client.metadata(&path("page.html")).await.unwrap();
    assert_eq!(meta.content_type, None);
}

#[tokio::test]
async fn test_presign_expiry_window() {
    let (store, client) = setup();
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "todo.txt", b"buy milk").await;
    client.upload(&local, &path("notes/todo.txt")).await.unwrap();

    let presigned = client
        .presign(&path("notes/todo.txt"), DEFAULT_EXPIRY_SECS)
        .await
        .unwrap();

    assert_eq!(presigned.expires_at - presigned.issued_at, Duration::seconds(3600));
    assert_eq!(presigned.expires_in_secs, 3600);

    let inside = presigned.issued_at + Duration::seconds(3599);
    let after = presigned.issued_at + Duration::seconds(3600);
    assert!(store.verify_presigned(&presigned.url, inside).unwrap());
    assert!(!store.verify_presigned(&presigned.url, after).unwrap());
}

#[tokio::test]
async fn test_presigned_url_bound_to_account_key() {
    let signer = Arc::new(MemoryStore::new().with_signing_key(b"account-key-one".to_vec()));
    signer.create_container("c1");
    let other = MemoryStore::new().with_signing_key(b"account-key-two".to_vec());
    let client = BlobClient::new(signer.clone());

    let presigned = client.presign(&path("notes/todo.txt"), 60).await.unwrap();
    let inside = presigned.issued_at + Duration::seconds(1);

    assert!(signer.verify_presigned(&presigned.url, inside).unwrap());
    assert!(!other.verify_presigned(&presigned.url, inside).unwrap());
}

#[tokio::test]
async fn test_presign_rejects_bad_expiry() {
    let (_store, client) = setup();
    for secs in [0, 604_801] {
        let err = client.presign(&path("k"), secs).await.unwrap_err();
        assert!(matches!(err, StorageError::PresignFailed(_)));
    }
}

#[tokio::test]
async fn test_s3_presign_offline() {
    let store = SessionConfig::from_connection_string(
        "EndpointUrl=https://acct.r2.example.com;AccessKeyId=AKID;SecretAccessKey=SECRET",
    )
    .unwrap()
    .build_store();
    let client = BlobClient::new(Arc::new(store));
    let remote = CloudPath::new("s3", "bucket", "notes/todo.txt").unwrap();

    let presigned = client.presign(&remote, 3600).await.unwrap();

    let url = url::Url::parse(&presigned.url).unwrap();
    let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(query.get("X-Amz-Expires").map(String::as_str), Some("3600"));
    assert_eq!(
        query.get("X-Amz-Date"),
        Some(&presigned.issued_at.format("%Y%m%dT%H%M%SZ").to_string())
    );
    assert!(presigned.url.starts_with("https://acct.r2.example.com/bucket/notes/todo.txt?"));
}

#[tokio::test]
async fn test_scheme_mismatch_is_rejected() {
    let (_store, client) = setup();
    let foreign = CloudPath::new("s3", "c1", "k").unwrap();

    assert!(matches!(
        client.classify(&foreign).await,
        Err(StorageError::UnknownScheme(_))
    ));
    assert!(matches!(
        client.public_url(&foreign),
        Err(StorageError::UnknownScheme(_))
    ));
}

#[tokio::test]
async fn test_public_url() {
    let (_store, client) = setup();
    assert_eq!(
        client.public_url(&path("notes/my file.txt")).unwrap(),
        "mem://c1/notes/my%20file.txt"
    );
}
