//! Shared data models for blobpath.
//!
//! This crate provides Serde-serializable types for:
//! - Cloud paths (`scheme://container/key`)
//! - Object metadata and content settings
//! - Directory entries and path classification

pub mod entry;
pub mod metadata;
pub mod path;

// Re-export common types
pub use entry::{DirectoryEntry, PathKind};
pub use metadata::{ContentSettings, ObjectMetadata};
pub use path::{CloudPath, PathError, PathResult};
