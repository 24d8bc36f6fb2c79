//! Object store capability interface.
//!
//! Everything above this trait (classification, walking, transfers and
//! mutations) only talks to the store through these calls, so the same logic
//! runs against S3 and the in-memory store used in tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use blobpath_models::{ContentSettings, ObjectMetadata};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::StorageResult;

/// Stream of object content chunks.
pub type ByteStream = BoxStream<'static, StorageResult<Bytes>>;

/// Parameters for a single listing page.
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    /// Only keys starting with this string are returned.
    pub prefix: String,
    /// Group keys below the next `/` into a single common prefix.
    pub delimited: bool,
    /// Upper bound on the number of items in the page.
    pub max_results: Option<u32>,
    /// Token returned by the previous page.
    pub continuation: Option<String>,
}

impl ListRequest {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn delimited(mut self, delimited: bool) -> Self {
        self.delimited = delimited;
        self
    }

    pub fn max_results(mut self, max: u32) -> Self {
        self.max_results = Some(max);
        self
    }

    pub fn continuation(mut self, token: Option<String>) -> Self {
        self.continuation = token;
        self
    }
}

/// Summary of one object as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Raw store key
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub last_modified: Option<DateTime<Utc>>,
    /// Whether the store considers this object a directory marker
    pub is_marker: bool,
}

/// One item of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListItem {
    Object(ObjectSummary),
    /// Common prefix of a delimited listing, including its trailing `/`.
    Prefix(String),
}

/// A page of listing results.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub items: Vec<ListItem>,
    /// Present when more results are available.
    pub next_token: Option<String>,
}

/// Body of a write.
#[derive(Debug, Clone)]
pub enum PutBody {
    Bytes(Bytes),
    /// Streamed from a local file.
    File(PathBuf),
}

/// Minimal set of calls a flat key-addressed store has to provide.
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Scheme used in textual paths for this store (e.g. `s3`).
    fn scheme(&self) -> &str;

    async fn container_exists(&self, container: &str) -> StorageResult<bool>;

    /// Metadata of the object at exactly `key`; `NotFound` when absent.
    async fn head(&self, container: &str, key: &str) -> StorageResult<ObjectMetadata>;

    async fn list_page(&self, container: &str, request: &ListRequest) -> StorageResult<ListPage>;

    /// Open the object content as a stream; `NotFound` when absent.
    async fn get_stream(&self, container: &str, key: &str) -> StorageResult<ByteStream>;

    /// Write an object, overwriting whatever is stored at `key`.
    async fn put(
        &self,
        container: &str,
        key: &str,
        body: PutBody,
        settings: &ContentSettings,
    ) -> StorageResult<()>;

    /// Write an empty directory marker for `key`.
    async fn put_marker(&self, container: &str, key: &str) -> StorageResult<()>;

    /// Server-side copy; the bytes never pass through the caller.
    async fn copy(
        &self,
        src_container: &str,
        src_key: &str,
        dst_container: &str,
        dst_key: &str,
    ) -> StorageResult<()>;

    /// Merge `metadata` into the object's user metadata without touching its content.
    async fn set_metadata(
        &self,
        container: &str,
        key: &str,
        metadata: HashMap<String, String>,
    ) -> StorageResult<()>;

    /// Delete one object. Deleting an absent key succeeds.
    async fn delete(&self, container: &str, key: &str) -> StorageResult<()>;

    /// Delete several objects in one call; returns how many were requested.
    async fn delete_many(&self, container: &str, keys: &[String]) -> StorageResult<u32>;

    /// Sign a read-only URL valid from `issued_at` for `expires_in`.
    async fn presign_get(
        &self,
        container: &str,
        key: &str,
        issued_at: DateTime<Utc>,
        expires_in: Duration,
    ) -> StorageResult<String>;

    /// Unsigned URL of the object.
    fn public_url(&self, container: &str, key: &str) -> String;
}
