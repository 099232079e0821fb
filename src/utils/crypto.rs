// src/utils/crypto.rs
//! Cryptographic utilities optimized for blockchain compatibility.
//!
//! Uses Keccak-256 (Ethereum's standard hash function) for all operations,
//! so digests computed here can be compared byte-for-byte with values held
//! by the credential contract.

use ethers::utils::{hex, keccak256};

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// Keccak-256 of `data` rendered as a `0x`-prefixed lowercase hex string.
pub fn hex_digest(data: &[u8]) -> String {
    format!("0x{}", hex::encode(hash_data(data)))
}

/// Commitment to a biometric embedding.
///
/// Hashes the little-endian bytes of every component in order. The raw
/// vector cannot be recovered from the commitment, which is what goes on the
/// ledger.
pub fn embedding_commitment(embedding: &[f32]) -> [u8; 32] {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    hash_data(&bytes)
}
