// src/storage/mod.rs
//! Storage collaborators: the content-addressed document store and the
//! athlete/audit directory.

pub mod directory;
pub mod ipfs_client;
pub mod memory;

use crate::error::StoreError;
use async_trait::async_trait;

/// Durable, content-addressed blob storage.
///
/// There is no delete: whatever is put stays retrievable by its address.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores raw bytes; `name` is descriptive only and does not affect the address.
    async fn put_bytes(&self, bytes: Vec<u8>, name: &str) -> Result<String, StoreError>;

    /// Stores a JSON document.
    async fn put_json(&self, value: &serde_json::Value) -> Result<String, StoreError>;

    /// Fetches content by address.
    async fn get(&self, address: &str) -> Result<Vec<u8>, StoreError>;
}

/// `ipfs://` URI for a content address.
pub fn ipfs_uri(address: &str) -> String {
    format!("ipfs://{}", address)
}
