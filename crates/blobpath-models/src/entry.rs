//! Directory entries and path classification.

use serde::{Deserialize, Serialize};

use crate::path::CloudPath;

/// What a path currently refers to in the store.
///
/// Computed from remote state on every call; directories have no stored
/// identity of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    File,
    Directory,
    Nothing,
}

impl PathKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathKind::File => "file",
            PathKind::Directory => "dir",
            PathKind::Nothing => "nothing",
        }
    }

    pub fn exists(&self) -> bool {
        !matches!(self, PathKind::Nothing)
    }

    pub fn is_file(&self) -> bool {
        matches!(self, PathKind::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, PathKind::Directory)
    }
}

/// One child produced by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub path: CloudPath,
    pub is_dir: bool,
}

impl DirectoryEntry {
    pub fn file(path: CloudPath) -> Self {
        Self {
            path,
            is_dir: false,
        }
    }

    pub fn dir(path: CloudPath) -> Self {
        Self { path, is_dir: true }
    }
}
