//! Object metadata models.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata reported by the store for a single object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// MIME type, if the object was written with one
    pub content_type: Option<String>,
    /// Content encoding (e.g. `gzip`)
    pub content_encoding: Option<String>,
    /// Content hash as reported by the store (MD5/ETag)
    pub content_hash: Option<String>,
    /// Last modification time
    pub last_modified: Option<DateTime<Utc>>,
    /// Size in bytes
    pub size: u64,
    /// User-defined metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ObjectMetadata {
    /// A directory marker is an object with neither content type nor content hash.
    pub fn is_directory_marker(&self) -> bool {
        self.content_type.is_none() && self.content_hash.is_none()
    }
}

/// Content headers sent along with an upload.
///
/// `None` fields are omitted from the write entirely rather than sent empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
}

impl ContentSettings {
    pub fn new(content_type: Option<String>, content_encoding: Option<String>) -> Self {
        Self {
            content_type,
            content_encoding,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content_type.is_none() && self.content_encoding.is_none()
    }
}
