// src/biometrics/mod.rs
//! Biometric collaborators: the face-service gateway and the duplicate gate
//! built on top of it.

pub mod duplicate_gate;
pub mod face_client;

use crate::error::BiometricError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Nearest-match result over a set of stored embeddings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Comparison {
    #[serde(rename = "match")]
    pub is_match: bool,
    /// Index into the compared set; -1 when the set was empty
    #[serde(rename = "best_idx")]
    pub best_index: i64,
    #[serde(rename = "best_score")]
    pub best_score: f64,
}

/// External face embedding service.
#[async_trait]
pub trait BiometricGateway: Send + Sync {
    /// Derives an embedding from an image.
    async fn extract_embedding(&self, image: &[u8]) -> Result<Vec<f32>, BiometricError>;

    /// Finds the closest of `existing` to `candidate`; a match means the
    /// distance is below `threshold`.
    async fn compare_embedding(
        &self,
        candidate: &[f32],
        existing: &[Vec<f32>],
        threshold: f64,
    ) -> Result<Comparison, BiometricError>;
}
