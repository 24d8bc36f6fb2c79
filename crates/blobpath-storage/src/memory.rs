//! In-memory object store.
//!
//! Behaves like a flat blob service: containers hold keys, directory markers
//! are objects without content type or hash, deletes of absent keys succeed.
//! Faults can be injected to exercise partial-failure paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use blobpath_models::{ContentSettings, ObjectMetadata};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::presign::ReadGrant;
use crate::store::{
    ByteStream, ListItem, ListPage, ListRequest, ObjectStore, ObjectSummary, PutBody,
};

/// Scheme of in-memory paths.
pub const MEMORY_SCHEME: &str = "mem";

const DEFAULT_PAGE_SIZE: usize = 1000;
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    metadata: ObjectMetadata,
}

/// Failure to inject on a specific object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `get_stream` yields this many bytes and then fails.
    StreamAfter(usize),
    /// `delete` and `delete_many` fail when they touch the key.
    Delete,
    /// `copy` fails when reading from the key.
    Copy,
}

/// Flat in-memory blob store.
pub struct MemoryStore {
    scheme: String,
    containers: RwLock<BTreeMap<String, BTreeMap<String, StoredObject>>>,
    faults: Mutex<HashMap<(String, String), Fault>>,
    signing_key: Vec<u8>,
    page_size: usize,
    chunk_size: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            scheme: MEMORY_SCHEME.to_string(),
            containers: RwLock::new(BTreeMap::new()),
            faults: Mutex::new(HashMap::new()),
            signing_key: b"memory-account-key".to_vec(),
            page_size: DEFAULT_PAGE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Use a different scheme for paths routed to this store.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Maximum items per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Size of chunks yielded by `get_stream`.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Account key used to sign presigned URLs.
    pub fn with_signing_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.signing_key = key.into();
        self
    }

    pub fn create_container(&self, container: &str) {
        self.write_containers()
            .entry(container.to_string())
            .or_default();
    }

    /// Arm a fault on `container/key`.
    pub fn inject_fault(&self, container: &str, key: &str, fault: Fault) {
        self.lock_faults()
            .insert((container.to_string(), key.to_string()), fault);
    }

    pub fn clear_faults(&self) {
        self.lock_faults().clear();
    }

    /// Raw content of an object, bypassing the store interface.
    pub fn object_bytes(&self, container: &str, key: &str) -> Option<Bytes> {
        self.read_containers()
            .get(container)
            .and_then(|objects| objects.get(key))
            .map(|obj| obj.data.clone())
    }

    /// All keys currently stored in a container.
    pub fn keys(&self, container: &str) -> Vec<String> {
        self.read_containers()
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Check a URL produced by `presign_get` at instant `now`.
    pub fn verify_presigned(&self, url: &str, now: DateTime<Utc>) -> StorageResult<bool> {
        let parsed = url::Url::parse(url).map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let container = parsed.host_str().unwrap_or_default().to_string();
        let key = parsed.path().trim_start_matches('/');
        let key = urlencoding::decode(key)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?
            .into_owned();

        let query: HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        let (Some(st), Some(se), Some(sig)) = (query.get("st"), query.get("se"), query.get("sig"))
        else {
            return Ok(false);
        };
        let (Ok(starts_at), Ok(expires_at)) = (
            DateTime::parse_from_rfc3339(st),
            DateTime::parse_from_rfc3339(se),
        ) else {
            return Ok(false);
        };

        let grant = ReadGrant {
            container,
            key,
            starts_at: starts_at.with_timezone(&Utc),
            expires_at: expires_at.with_timezone(&Utc),
        };
        grant.verify(sig, &self.signing_key, now)
    }

    fn read_containers(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, BTreeMap<String, StoredObject>>> {
        self.containers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_containers(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, BTreeMap<String, StoredObject>>> {
        self.containers.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Fault>> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fault(&self, container: &str, key: &str) -> Option<Fault> {
        self.lock_faults()
            .get(&(container.to_string(), key.to_string()))
            .copied()
    }

    fn insert(&self, container: &str, key: &str, object: StoredObject) -> StorageResult<()> {
        let mut containers = self.write_containers();
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| StorageError::not_found(format!("container {}", container)))?;
        objects.insert(key.to_string(), object);
        Ok(())
    }

    fn get(&self, container: &str, key: &str) -> StorageResult<StoredObject> {
        self.read_containers()
            .get(container)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| StorageError::not_found(format!("{}/{}", container, key)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn content_hash(data: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(data))
}

/// Continuation tokens remember whether the last item was a key or a common prefix.
fn encode_token(item: &ListItem) -> String {
    match item {
        ListItem::Object(obj) => format!("k:{}", obj.key),
        ListItem::Prefix(prefix) => format!("p:{}", prefix),
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    async fn container_exists(&self, container: &str) -> StorageResult<bool> {
        Ok(self.read_containers().contains_key(container))
    }

    async fn head(&self, container: &str, key: &str) -> StorageResult<ObjectMetadata> {
        Ok(self.get(container, key)?.metadata)
    }

    async fn list_page(&self, container: &str, request: &ListRequest) -> StorageResult<ListPage> {
        let containers = self.read_containers();
        let objects = containers
            .get(container)
            .ok_or_else(|| StorageError::not_found(format!("container {}", container)))?;

        let limit = request
            .max_results
            .map(|m| (m as usize).min(self.page_size))
            .unwrap_or(self.page_size)
            .max(1);

        let (start, skip_prefix) = match request.continuation.as_deref() {
            Some(token) => {
                if let Some(key) = token.strip_prefix("k:") {
                    (Bound::Excluded(key.to_string()), None)
                } else if let Some(prefix) = token.strip_prefix("p:") {
                    (Bound::Excluded(prefix.to_string()), Some(prefix.to_string()))
                } else {
                    return Err(StorageError::store(format!(
                        "invalid continuation token {}",
                        token
                    )));
                }
            }
            None => (Bound::Included(request.prefix.clone()), None),
        };

        let mut items: Vec<ListItem> = Vec::new();
        let mut seen_prefixes: HashSet<String> = HashSet::new();
        let mut more = false;

        for (key, object) in objects.range::<String, _>((start, Bound::Unbounded)) {
            if !key.starts_with(&request.prefix) {
                break;
            }
            if let Some(skip) = &skip_prefix {
                if key.starts_with(skip.as_str()) {
                    continue;
                }
            }

            let item = if request.delimited {
                let rest = &key[request.prefix.len()..];
                match rest.find('/') {
                    Some(idx) => {
                        let common = format!("{}{}", request.prefix, &rest[..=idx]);
                        if !seen_prefixes.insert(common.clone()) {
                            continue;
                        }
                        ListItem::Prefix(common)
                    }
                    None => ListItem::Object(summary(key, object)),
                }
            } else {
                ListItem::Object(summary(key, object))
            };

            if items.len() == limit {
                more = true;
                break;
            }
            items.push(item);
        }

        let next_token = if more {
            items.last().map(encode_token)
        } else {
            None
        };

        Ok(ListPage { items, next_token })
    }

    async fn get_stream(&self, container: &str, key: &str) -> StorageResult<ByteStream> {
        let object = self.get(container, key)?;
        let fail_after = match self.fault(container, key) {
            Some(Fault::StreamAfter(n)) => Some(n.min(object.data.len())),
            _ => None,
        };

        let available = fail_after.unwrap_or(object.data.len());
        let mut chunks: Vec<StorageResult<Bytes>> = Vec::new();
        let mut offset = 0;
        while offset < available {
            let end = (offset + self.chunk_size).min(available);
            chunks.push(Ok(object.data.slice(offset..end)));
            offset = end;
        }
        if fail_after.is_some() {
            chunks.push(Err(StorageError::transfer_failed(
                format!("{}/{}", container, key),
                "connection reset by peer",
            )));
        }

        Ok(stream::iter(chunks).boxed())
    }

    async fn put(
        &self,
        container: &str,
        key: &str,
        body: PutBody,
        settings: &ContentSettings,
    ) -> StorageResult<()> {
        let data = match body {
            PutBody::Bytes(bytes) => bytes,
            PutBody::File(path) => Bytes::from(tokio::fs::read(&path).await?),
        };

        debug!(container, key, size = data.len(), "memory put");

        let metadata = ObjectMetadata {
            content_type: settings.content_type.clone(),
            content_encoding: settings.content_encoding.clone(),
            content_hash: Some(content_hash(&data)),
            last_modified: Some(Utc::now()),
            size: data.len() as u64,
            metadata: HashMap::new(),
        };

        self.insert(container, key, StoredObject { data, metadata })
    }

    async fn put_marker(&self, container: &str, key: &str) -> StorageResult<()> {
        let metadata = ObjectMetadata {
            last_modified: Some(Utc::now()),
            ..Default::default()
        };
        self.insert(
            container,
            key,
            StoredObject {
                data: Bytes::new(),
                metadata,
            },
        )
    }

    async fn copy(
        &self,
        src_container: &str,
        src_key: &str,
        dst_container: &str,
        dst_key: &str,
    ) -> StorageResult<()> {
        if self.fault(src_container, src_key) == Some(Fault::Copy) {
            return Err(StorageError::store(format!(
                "copy from {}/{} failed",
                src_container, src_key
            )));
        }

        let mut object = self.get(src_container, src_key)?;
        object.metadata.last_modified = Some(Utc::now());
        self.insert(dst_container, dst_key, object)
    }

    async fn set_metadata(
        &self,
        container: &str,
        key: &str,
        metadata: HashMap<String, String>,
    ) -> StorageResult<()> {
        let mut containers = self.write_containers();
        let object = containers
            .get_mut(container)
            .and_then(|objects| objects.get_mut(key))
            .ok_or_else(|| StorageError::not_found(format!("{}/{}", container, key)))?;

        object.metadata.metadata.extend(metadata);
        object.metadata.last_modified = Some(Utc::now());
        Ok(())
    }

    async fn delete(&self, container: &str, key: &str) -> StorageResult<()> {
        if self.fault(container, key) == Some(Fault::Delete) {
            return Err(StorageError::store(format!(
                "delete of {}/{} failed",
                container, key
            )));
        }

        if let Some(objects) = self.write_containers().get_mut(container) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn delete_many(&self, container: &str, keys: &[String]) -> StorageResult<u32> {
        if let Some(key) = keys
            .iter()
            .find(|k| self.fault(container, k) == Some(Fault::Delete))
        {
            return Err(StorageError::store(format!(
                "batch delete failed at {}/{}",
                container, key
            )));
        }

        if let Some(objects) = self.write_containers().get_mut(container) {
            for key in keys {
                objects.remove(key);
            }
        }
        Ok(keys.len() as u32)
    }

    async fn presign_get(
        &self,
        container: &str,
        key: &str,
        issued_at: DateTime<Utc>,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let grant = ReadGrant::new(container, key, issued_at, expires_in)?;
        let query = grant.sign(&self.signing_key)?;
        Ok(format!("{}?{}", self.public_url(container, key), query))
    }

    fn public_url(&self, container: &str, key: &str) -> String {
        let encoded: Vec<_> = key.split('/').map(urlencoding::encode).collect();
        format!("{}://{}/{}", self.scheme, container, encoded.join("/"))
    }
}

fn summary(key: &str, object: &StoredObject) -> ObjectSummary {
    ObjectSummary {
        key: key.to_string(),
        size: object.metadata.size,
        last_modified: object.metadata.last_modified,
        is_marker: object.metadata.is_directory_marker(),
    }
}
