// src/storage/ipfs_client.rs
//! IPFS storage client for decentralized document storage.
//!
//! Provides thread-safe interaction with an IPFS node for:
//! - Pinning raw registration documents (birth certificates, selfies)
//! - Pinning JSON metadata and audit entries
//! - Retrieving pinned content by CID for integrity checks
//!
//! # Security Considerations
//! - All stored data is public by default (IPFS is a public network)
//! - Hashes are content-addressable and permanent

use crate::error::StoreError;
use crate::storage::ContentStore;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::TryStreamExt;
use ipfs_api_backend_hyper::{IpfsApi, IpfsClient, TryFromUri};
use log::debug;
use std::io::Cursor;
use std::sync::Arc;
use tokio::task;

/// Thread-safe IPFS client wrapper.
///
/// The hyper-backed client futures are not `Send`, so every call runs on a
/// blocking worker with its own runtime and only the result crosses back.
#[derive(Clone)]
pub struct IpfsStorage {
    /// Shared IPFS client instance (thread-safe via Arc)
    client: Arc<IpfsClient>,
}

impl IpfsStorage {
    /// Creates a client for the node API at `api_url`
    /// (e.g. `http://localhost:5001`).
    ///
    /// Connection errors only surface on the first operation.
    pub fn new(api_url: &str) -> Result<Self, StoreError> {
        let client = <IpfsClient as TryFromUri>::from_str(api_url)
            .map_err(|e| StoreError::Unavailable(format!("invalid IPFS API url '{}': {}", api_url, e)))?;
        Ok(IpfsStorage {
            client: Arc::new(client),
        })
    }

    /// Stores raw binary data in IPFS and returns its CID.
    async fn store_data(&self, data: Vec<u8>) -> Result<String, StoreError> {
        let client = self.client.clone();

        let res = task::spawn_blocking(move || -> Result<String, String> {
            let rt = tokio::runtime::Runtime::new().map_err(|e| e.to_string())?;
            rt.block_on(async {
                let reader = Cursor::new(data);
                let res = client.add(reader).await.map_err(|e| e.to_string())?;
                Ok(res.hash)
            })
        })
        .await;

        match res {
            Ok(inner) => inner.map_err(StoreError::Unavailable),
            Err(join_err) => Err(StoreError::Unavailable(join_err.to_string())),
        }
    }

    /// Retrieves binary data from IPFS by its CID.
    async fn retrieve_data(&self, hash: &str) -> Result<Vec<u8>, StoreError> {
        let client = self.client.clone();
        let hash = hash.to_string();

        let data = task::spawn_blocking(move || -> Result<Vec<u8>, String> {
            let rt = tokio::runtime::Runtime::new().map_err(|e| e.to_string())?;
            rt.block_on(async {
                let data = client
                    .cat(&hash)
                    .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                        acc.extend_from_slice(&chunk);
                        Ok(acc)
                    })
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(data.to_vec())
            })
        })
        .await;

        match data {
            Ok(inner) => inner.map_err(StoreError::Unavailable),
            Err(join_err) => Err(StoreError::Unavailable(join_err.to_string())),
        }
    }
}

#[async_trait]
impl ContentStore for IpfsStorage {
    async fn put_bytes(&self, bytes: Vec<u8>, name: &str) -> Result<String, StoreError> {
        debug!("pinning {} ({} bytes) to IPFS", name, bytes.len());
        let cid = self.store_data(bytes).await?;
        debug!("pinned {} as {}", name, cid);
        Ok(cid)
    }

    async fn put_json(&self, value: &serde_json::Value) -> Result<String, StoreError> {
        let json_str = crate::utils::serialization::serialize(value)?;
        self.store_data(json_str.into_bytes()).await
    }

    async fn get(&self, address: &str) -> Result<Vec<u8>, StoreError> {
        self.retrieve_data(address).await
    }
}
