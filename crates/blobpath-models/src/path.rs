//! Cloud path model.
//!
//! A [`CloudPath`] addresses either a whole container (empty key) or a single
//! key inside it. Keys are slash-delimited and never carry a trailing slash in
//! their canonical form, so `s3://bucket/a/b/` and `s3://bucket/a/b` are the
//! same path.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while building or parsing a cloud path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("missing scheme separator '://' in {0}")]
    MissingScheme(String),

    #[error("empty scheme in {0}")]
    EmptyScheme(String),

    #[error("empty container in {0}")]
    EmptyContainer(String),
}

/// Result type for path construction.
pub type PathResult<T> = Result<T, PathError>;

/// A `(container, key)` pair qualified by the scheme of the store it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CloudPath {
    scheme: String,
    container: String,
    key: String,
}

impl CloudPath {
    /// Create a path from its parts, canonicalising the key.
    pub fn new(
        scheme: impl Into<String>,
        container: impl Into<String>,
        key: impl AsRef<str>,
    ) -> PathResult<Self> {
        let scheme = scheme.into();
        let container = container.into();
        let display = format!("{}://{}/{}", scheme, container, key.as_ref());

        if scheme.is_empty() {
            return Err(PathError::EmptyScheme(display));
        }
        if container.is_empty() {
            return Err(PathError::EmptyContainer(display));
        }

        Ok(Self {
            scheme,
            container,
            key: canonical_key(key.as_ref()),
        })
    }

    /// Parse the textual form `scheme://container/key/with/slashes`.
    pub fn parse(s: &str) -> PathResult<Self> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| PathError::MissingScheme(s.to_string()))?;

        let (container, key) = rest.split_once('/').unwrap_or((rest, ""));
        Self::new(scheme, container, key)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Key inside the container; empty for the container root.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this path denotes the container itself.
    pub fn is_root(&self) -> bool {
        self.key.is_empty()
    }

    /// Key prefix that every descendant of this path starts with.
    ///
    /// Empty for the container root, `key + "/"` otherwise.
    pub fn dir_prefix(&self) -> String {
        if self.key.is_empty() {
            String::new()
        } else {
            format!("{}/", self.key)
        }
    }

    /// Same scheme and container, different key.
    pub fn with_key(&self, key: impl AsRef<str>) -> Self {
        Self {
            scheme: self.scheme.clone(),
            container: self.container.clone(),
            key: canonical_key(key.as_ref()),
        }
    }

    /// Append a relative segment (or several, slash-separated).
    pub fn join(&self, child: &str) -> Self {
        let child = child.trim_matches('/');
        if child.is_empty() {
            return self.clone();
        }
        if self.key.is_empty() {
            self.with_key(child)
        } else {
            self.with_key(format!("{}/{}", self.key, child))
        }
    }

    /// Last key segment; empty for the container root.
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or("")
    }

    /// Parent path, or `None` for the container root.
    pub fn parent(&self) -> Option<Self> {
        if self.key.is_empty() {
            return None;
        }
        let parent_key = self.key.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
        Some(self.with_key(parent_key))
    }
}

fn canonical_key(key: &str) -> String {
    key.trim_start_matches('/').trim_end_matches('/').to_string()
}

impl fmt::Display for CloudPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.container, self.key)
    }
}

impl std::str::FromStr for CloudPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CloudPath {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<CloudPath> for String {
    fn from(path: CloudPath) -> Self {
        path.to_string()
    }
}
