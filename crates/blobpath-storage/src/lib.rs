//! Filesystem semantics over flat blob storage.
//!
//! This crate provides:
//! - File / directory / nothing classification of keys
//! - Shallow and recursive directory listings from prefix scans
//! - Atomic downloads through a `.part` staging file
//! - Uploads with guessed content type and encoding
//! - Move, copy and ordered recursive delete
//! - Presigned read URLs
//! - S3-compatible and in-memory stores behind one `ObjectStore` trait

pub mod classify;
pub mod client;
pub mod content_type;
pub mod download;
pub mod error;
pub mod memory;
pub mod mutate;
pub mod presign;
pub mod registry;
pub mod s3;
pub mod session;
pub mod store;
pub mod upload;
pub mod walk;

#[cfg(test)]
mod client_tests;

pub use client::BlobClient;
pub use content_type::{ContentTypeResolver, GuessContentType, NoContentType};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use presign::PresignedUrl;
pub use registry::BackendRegistry;
pub use s3::S3Store;
pub use session::{SessionBuilder, SessionConfig, CONNECTION_STRING_ENV};
pub use store::{ListItem, ListPage, ListRequest, ObjectStore, ObjectSummary, PutBody};
pub use walk::EntryStream;
