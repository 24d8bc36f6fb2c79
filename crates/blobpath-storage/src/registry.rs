//! Scheme to client table.
//!
//! Built once at startup and handed to whatever needs to resolve paths; there
//! is no process-wide registry.

use std::collections::HashMap;

use blobpath_models::CloudPath;
use tracing::debug;

use crate::client::BlobClient;
use crate::error::{StorageError, StorageResult};

#[derive(Clone, Default)]
pub struct BackendRegistry {
    clients: HashMap<String, BlobClient>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` under its scheme, replacing any previous client for it.
    pub fn register(mut self, client: BlobClient) -> Self {
        debug!(scheme = client.scheme(), "Registering storage client");
        self.clients.insert(client.scheme().to_string(), client);
        self
    }

    pub fn get(&self, scheme: &str) -> Option<&BlobClient> {
        self.clients.get(scheme)
    }

    /// Client responsible for `path`.
    pub fn client_for(&self, path: &CloudPath) -> StorageResult<&BlobClient> {
        self.get(path.scheme())
            .ok_or_else(|| StorageError::UnknownScheme(path.scheme().to_string()))
    }

    /// Parse `s` and return it with its client.
    pub fn resolve(&self, s: &str) -> StorageResult<(CloudPath, &BlobClient)> {
        let path = CloudPath::parse(s)?;
        let client = self.client_for(&path)?;
        Ok((path, client))
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }
}
