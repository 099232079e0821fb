// src/biometrics/duplicate_gate.rs
//! Duplicate identity gate.
//!
//! Compares a new registration's embedding against every enrolled one and
//! reports the closest owner when it falls under the distance threshold.
//! The enrolled set is read without locking: two registrations of the same
//! face racing through the gate can both pass before either is persisted.

use crate::biometrics::BiometricGateway;
use crate::error::BiometricError;
use crate::models::athlete::EnrolledEmbedding;
use log::debug;
use std::sync::Arc;

/// Outcome of a duplicate check.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    NoMatch,
    /// The candidate matches an existing athlete.
    Match { did: String, name: String, score: f64 },
}

pub struct DuplicateGate {
    gateway: Arc<dyn BiometricGateway>,
    threshold: f64,
}

impl DuplicateGate {
    pub fn new(gateway: Arc<dyn BiometricGateway>, threshold: f64) -> Self {
        Self { gateway, threshold }
    }

    /// Checks `candidate` against `enrolled`.
    ///
    /// An empty enrolled set is trivially `NoMatch` and the gateway is not
    /// consulted. A match index outside the enrolled set is treated as a
    /// malformed gateway response rather than guessed at.
    pub async fn check(
        &self,
        candidate: &[f32],
        enrolled: &[EnrolledEmbedding],
    ) -> Result<GateDecision, BiometricError> {
        if enrolled.is_empty() {
            return Ok(GateDecision::NoMatch);
        }

        let existing: Vec<Vec<f32>> = enrolled.iter().map(|e| e.embedding.clone()).collect();
        let comparison = self
            .gateway
            .compare_embedding(candidate, &existing, self.threshold)
            .await?;
        debug!(
            "duplicate check over {} embeddings: match={} score={:.4}",
            enrolled.len(),
            comparison.is_match,
            comparison.best_score
        );

        if !comparison.is_match {
            return Ok(GateDecision::NoMatch);
        }

        let owner = usize::try_from(comparison.best_index)
            .ok()
            .and_then(|index| enrolled.get(index))
            .ok_or_else(|| {
                BiometricError::Malformed(format!(
                    "match index {} outside enrolled set of {}",
                    comparison.best_index,
                    enrolled.len()
                ))
            })?;

        Ok(GateDecision::Match {
            did: owner.did.clone(),
            name: owner.name.clone(),
            score: comparison.best_score,
        })
    }
}
