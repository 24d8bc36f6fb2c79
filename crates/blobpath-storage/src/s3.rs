//! S3-compatible object store.
//!
//! Directory markers follow the common S3 convention: an empty object whose
//! key ends in `/`, or an empty object typed `application/x-directory`.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream as S3ByteStream;
use aws_sdk_s3::types::{Delete, MetadataDirective, ObjectIdentifier};
use aws_sdk_s3::Client;
use blobpath_models::{ContentSettings, ObjectMetadata};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::store::{
    ByteStream, ListItem, ListPage, ListRequest, ObjectStore, ObjectSummary, PutBody,
};

/// Scheme of S3 paths.
pub const S3_SCHEME: &str = "s3";

/// Content type some tools give to directory marker objects.
///
/// Listings carry no content types, so a typed marker whose key lacks the
/// trailing `/` lists as an empty file even though `head` reports it as a
/// directory. Markers written by this crate always end in `/`.
pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";

/// Maximum keys S3 accepts in one `DeleteObjects` call.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Object store backed by an S3-compatible service.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    endpoint_url: Option<String>,
    region: String,
}

impl S3Store {
    pub fn new(client: Client, endpoint_url: Option<String>, region: impl Into<String>) -> Self {
        Self {
            client,
            endpoint_url: endpoint_url.map(|u| u.trim_end_matches('/').to_string()),
            region: region.into(),
        }
    }

    /// Wrap an already authenticated client.
    ///
    /// `endpoint_url` only affects [`ObjectStore::public_url`]; requests go
    /// wherever the client is configured to send them.
    pub fn from_client(client: Client, endpoint_url: Option<String>) -> Self {
        let region = client
            .config()
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "us-east-1".to_string());
        Self::new(client, endpoint_url, region)
    }
}

fn sdk_error<E, R>(context: impl std::fmt::Display, err: SdkError<E, R>) -> StorageError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    StorageError::store(format!("{}: {}", context, DisplayErrorContext(&err)))
}

fn to_chrono(t: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(t.secs(), t.subsec_nanos())
}

fn is_marker(key: &str, size: u64, content_type: Option<&str>) -> bool {
    size == 0 && (key.ends_with('/') || content_type == Some(DIRECTORY_CONTENT_TYPE))
}

#[async_trait]
impl ObjectStore for S3Store {
    fn scheme(&self) -> &str {
        S3_SCHEME
    }

    async fn container_exists(&self, container: &str) -> StorageResult<bool> {
        match self.client.head_bucket().bucket(container).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    Ok(false)
                } else {
                    Err(sdk_error(format!("head bucket {}", container), e))
                }
            }
        }
    }

    async fn head(&self, container: &str, key: &str) -> StorageResult<ObjectMetadata> {
        debug!(container, key, "head object");

        let response = match self
            .client
            .head_object()
            .bucket(container)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    return Err(StorageError::not_found(format!("{}/{}", container, key)));
                }
                return Err(sdk_error(format!("head {}/{}", container, key), e));
            }
        };

        let size = response.content_length().unwrap_or(0).max(0) as u64;
        let marker = is_marker(key, size, response.content_type());

        Ok(ObjectMetadata {
            content_type: if marker {
                None
            } else {
                response.content_type().map(str::to_string)
            },
            content_encoding: response.content_encoding().map(str::to_string),
            content_hash: if marker {
                None
            } else {
                response.e_tag().map(|t| t.trim_matches('"').to_string())
            },
            last_modified: response.last_modified().and_then(to_chrono),
            size,
            metadata: response.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn list_page(&self, container: &str, request: &ListRequest) -> StorageResult<ListPage> {
        debug!(container, prefix = %request.prefix, delimited = request.delimited, "list objects");

        let mut call = self
            .client
            .list_objects_v2()
            .bucket(container)
            .prefix(&request.prefix);

        if request.delimited {
            call = call.delimiter("/");
        }
        if let Some(max) = request.max_results {
            call = call.max_keys(max as i32);
        }
        if let Some(token) = &request.continuation {
            call = call.continuation_token(token);
        }

        let response = call.send().await.map_err(|e| {
            if e.as_service_error().is_some_and(|se| se.is_no_such_bucket()) {
                StorageError::not_found(format!("container {}", container))
            } else {
                sdk_error(format!("list {}/{}", container, request.prefix), e)
            }
        })?;

        let mut items = Vec::new();
        for prefix in response.common_prefixes() {
            if let Some(p) = prefix.prefix() {
                items.push(ListItem::Prefix(p.to_string()));
            }
        }
        for obj in response.contents() {
            let key = obj.key().unwrap_or_default().to_string();
            let size = obj.size().unwrap_or(0).max(0) as u64;
            items.push(ListItem::Object(ObjectSummary {
                is_marker: is_marker(&key, size, None),
                last_modified: obj.last_modified().and_then(to_chrono),
                key,
                size,
            }));
        }

        let next_token = if response.is_truncated() == Some(true) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage { items, next_token })
    }

    async fn get_stream(&self, container: &str, key: &str) -> StorageResult<ByteStream> {
        debug!(container, key, "get object");

        let response = self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::not_found(format!("{}/{}", container, key))
                } else {
                    sdk_error(format!("get {}/{}", container, key), e)
                }
            })?;

        let path = format!("{}/{}", container, key);
        let body = stream::try_unfold((response.body, path), |(mut body, path)| async move {
            match body.try_next().await {
                Ok(Some(chunk)) => Ok(Some((chunk, (body, path)))),
                Ok(None) => Ok(None),
                Err(e) => Err(StorageError::transfer_failed(path, e.to_string())),
            }
        });

        Ok(body.boxed())
    }

    async fn put(
        &self,
        container: &str,
        key: &str,
        body: PutBody,
        settings: &ContentSettings,
    ) -> StorageResult<()> {
        let path = format!("{}/{}", container, key);
        let body = match body {
            PutBody::Bytes(bytes) => S3ByteStream::from(bytes),
            PutBody::File(local) => S3ByteStream::from_path(&local)
                .await
                .map_err(|e| StorageError::transfer_failed(&path, e.to_string()))?,
        };

        let mut call = self
            .client
            .put_object()
            .bucket(container)
            .key(key)
            .body(body);

        if let Some(content_type) = &settings.content_type {
            call = call.content_type(content_type);
        }
        if let Some(content_encoding) = &settings.content_encoding {
            call = call.content_encoding(content_encoding);
        }

        call.send()
            .await
            .map_err(|e| StorageError::transfer_failed(&path, DisplayErrorContext(&e).to_string()))?;

        info!("Uploaded {}", path);
        Ok(())
    }

    async fn put_marker(&self, container: &str, key: &str) -> StorageResult<()> {
        let marker_key = format!("{}/", key.trim_end_matches('/'));
        self.client
            .put_object()
            .bucket(container)
            .key(&marker_key)
            .body(S3ByteStream::from_static(b""))
            .content_type(DIRECTORY_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| sdk_error(format!("put marker {}/{}", container, marker_key), e))?;
        Ok(())
    }

    async fn copy(
        &self,
        src_container: &str,
        src_key: &str,
        dst_container: &str,
        dst_key: &str,
    ) -> StorageResult<()> {
        debug!(src_container, src_key, dst_container, dst_key, "copy object");

        self.client
            .copy_object()
            .copy_source(format!("{}/{}", src_container, urlencoding::encode(src_key)))
            .bucket(dst_container)
            .key(dst_key)
            .send()
            .await
            .map_err(|e| {
                if e.raw_response().is_some_and(|r| r.status().as_u16() == 404) {
                    StorageError::not_found(format!("{}/{}", src_container, src_key))
                } else {
                    sdk_error(format!("copy {}/{}", src_container, src_key), e)
                }
            })?;

        Ok(())
    }

    async fn set_metadata(
        &self,
        container: &str,
        key: &str,
        metadata: HashMap<String, String>,
    ) -> StorageResult<()> {
        // A REPLACE copy onto itself resets every header, so carry the current ones over.
        let current = self.head(container, key).await?;
        let mut merged = current.metadata;
        merged.extend(metadata);

        let mut call = self
            .client
            .copy_object()
            .copy_source(format!("{}/{}", container, urlencoding::encode(key)))
            .bucket(container)
            .key(key)
            .metadata_directive(MetadataDirective::Replace)
            .set_metadata(Some(merged));

        if let Some(content_type) = &current.content_type {
            call = call.content_type(content_type);
        }
        if let Some(content_encoding) = &current.content_encoding {
            call = call.content_encoding(content_encoding);
        }

        call.send()
            .await
            .map_err(|e| sdk_error(format!("set metadata {}/{}", container, key), e))?;
        Ok(())
    }

    async fn delete(&self, container: &str, key: &str) -> StorageResult<()> {
        debug!(container, key, "delete object");

        self.client
            .delete_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error(format!("delete {}/{}", container, key), e))?;

        Ok(())
    }

    async fn delete_many(&self, container: &str, keys: &[String]) -> StorageResult<u32> {
        if keys.is_empty() {
            return Ok(0);
        }
        if keys.len() > MAX_DELETE_BATCH {
            return Err(StorageError::store(format!(
                "batch of {} keys exceeds the {} key limit",
                keys.len(),
                MAX_DELETE_BATCH
            )));
        }

        debug!(container, count = keys.len(), "delete objects");

        let objects = keys
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::store(e.to_string()))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StorageError::store(e.to_string()))?;

        let response = self
            .client
            .delete_objects()
            .bucket(container)
            .delete(delete)
            .send()
            .await
            .map_err(|e| sdk_error(format!("delete objects in {}", container), e))?;

        if let Some(failed) = response.errors().first() {
            return Err(StorageError::store(format!(
                "delete of {}/{} failed: {}",
                container,
                failed.key().unwrap_or_default(),
                failed.message().unwrap_or("unknown error")
            )));
        }

        info!("Deleted {} objects from {}", keys.len(), container);
        Ok(keys.len() as u32)
    }

    async fn presign_get(
        &self,
        container: &str,
        key: &str,
        issued_at: DateTime<Utc>,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let presign_config = PresigningConfig::builder()
            .start_time(SystemTime::from(issued_at))
            .expires_in(expires_in)
            .build()
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(DisplayErrorContext(&e).to_string()))?;

        Ok(presigned.uri().to_string())
    }

    fn public_url(&self, container: &str, key: &str) -> String {
        let encoded: Vec<_> = key.split('/').map(urlencoding::encode).collect();
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}/{}", endpoint, container, encoded.join("/")),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                container,
                self.region,
                encoded.join("/")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_detection() {
        assert!(is_marker("notes/", 0, None));
        assert!(is_marker("notes", 0, Some(DIRECTORY_CONTENT_TYPE)));
        assert!(!is_marker("notes", 0, Some("binary/octet-stream")));
        assert!(!is_marker("notes/", 3, None));
    }

    #[test]
    fn test_typed_marker_without_slash_needs_content_type() {
        // what list_page sees vs what head sees
        assert!(!is_marker("notes", 0, None));
        assert!(is_marker("notes", 0, Some(DIRECTORY_CONTENT_TYPE)));
    }

    #[test]
    fn test_to_chrono() {
        let t = aws_sdk_s3::primitives::DateTime::from_secs(1_700_000_000);
        assert_eq!(to_chrono(&t).unwrap().timestamp(), 1_700_000_000);
    }
}
