// src/storage/memory.rs
//! In-process content store.
//!
//! Addresses are derived from the Keccak-256 digest of the content, so the
//! same bytes always land at the same address. Used for local runs without
//! an IPFS node and throughout the test suite.

use crate::error::StoreError;
use crate::storage::ContentStore;
use crate::utils::crypto::hex_digest;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Default)]
pub struct MemoryContentStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn address_of(bytes: &[u8]) -> String {
        format!("mem{}", &hex_digest(bytes)[2..])
    }

    /// Replaces the bytes behind an address, bypassing content addressing.
    #[cfg(test)]
    pub fn overwrite(&self, address: &str, bytes: Vec<u8>) {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.to_string(), bytes);
    }

    /// Drops content so it becomes unreachable.
    #[cfg(test)]
    pub fn evict(&self, address: &str) {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(address);
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put_bytes(&self, bytes: Vec<u8>, name: &str) -> Result<String, StoreError> {
        let address = Self::address_of(&bytes);
        debug!("pinning {} ({} bytes) at {}", name, bytes.len(), address);
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.clone(), bytes);
        Ok(address)
    }

    async fn put_json(&self, value: &serde_json::Value) -> Result<String, StoreError> {
        let bytes = serde_json::to_vec(value)?;
        self.put_bytes(bytes, "document.json").await
    }

    async fn get(&self, address: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(address.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn identical_content_shares_an_address() {
        let store = MemoryContentStore::new();
        let a = store.put_bytes(b"birth certificate".to_vec(), "a.pdf").await.unwrap();
        let b = store.put_bytes(b"birth certificate".to_vec(), "b.pdf").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&a).await.unwrap(), b"birth certificate".to_vec());
    }

    #[tokio::test]
    async fn json_documents_are_retrievable() {
        let store = MemoryContentStore::new();
        let address = store.put_json(&json!({ "name": "card" })).await.unwrap();
        let bytes = store.get(&address).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["name"], "card");
    }

    #[tokio::test]
    async fn missing_content_is_not_found() {
        let store = MemoryContentStore::new();
        assert!(matches!(store.get("mem00").await, Err(StoreError::NotFound(_))));
    }
}
