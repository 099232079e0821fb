// src/services/verifier.rs
//! Credential verification service.
//!
//! Answers "may this athlete play today?" by combining the directory row,
//! the ledger record (which wins on status) and the configured age window.

use crate::blockchain::CredentialLedger;
use crate::error::{RegistryError, Step};
use crate::models::athlete::AthleteRecord;
use crate::models::credential::CredentialStatus;
use crate::services::audit_log::{AuditEvent, AuditLog};
use crate::storage::directory::Directory;
use crate::wallet::key_management::{verify_token, CredentialPayload};
use chrono::NaiveDate;
use k256::ecdsa::VerifyingKey;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;

/// Actor recorded on verification audit entries.
pub const VERIFICATION_ACTOR: &str = "verification-api";

/// Outcome of an eligibility check, most severe first.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Eligibility {
    Revoked { reason: String },
    Flagged { reason: String },
    Ineligible { age: i32 },
    Eligible,
}

#[derive(Serialize, Debug, Clone)]
pub struct VerificationReport {
    pub athlete: AthleteRecord,
    /// Age in whole years on the verification date
    pub age: i32,
    pub status: CredentialStatus,
    pub reason: Option<String>,
    pub eligibility: Eligibility,
}

pub struct Verifier {
    directory: Arc<dyn Directory>,
    ledger: Arc<dyn CredentialLedger>,
    audit: Arc<AuditLog>,
    issuer_key: VerifyingKey,
    min_age: i32,
    max_age: i32,
}

impl Verifier {
    /// Constructs a verifier for the inclusive age window `[min_age, max_age]`.
    pub fn new(
        directory: Arc<dyn Directory>,
        ledger: Arc<dyn CredentialLedger>,
        audit: Arc<AuditLog>,
        issuer_key: VerifyingKey,
        min_age: i32,
        max_age: i32,
    ) -> Self {
        Self {
            directory,
            ledger,
            audit,
            issuer_key,
            min_age,
            max_age,
        }
    }

    /// Verifies the athlete behind `did` as of `on_date`.
    ///
    /// A minted credential is read back from the ledger and its status and
    /// reason override the directory copy. An unminted athlete is judged on
    /// age alone.
    ///
    /// # Errors
    /// - `NotFound` if no athlete has this DID
    /// - `Integrity` if the ledger record belongs to a different DID
    /// - `Ledger` if the ledger read fails
    pub async fn verify(&self, did: &str, on_date: NaiveDate) -> Result<VerificationReport, RegistryError> {
        let mut athlete = self
            .directory
            .athlete(did)
            .await
            .map_err(|e| RegistryError::dependency(Step::LoadAthlete, e))?
            .ok_or_else(|| RegistryError::NotFound(format!("athlete {}", did)))?;

        let (status, reason) = match athlete.mint.token_id() {
            Some(token_id) => {
                let credential = self.ledger.get_credential(token_id).await?;
                if credential.did != athlete.did {
                    return Err(RegistryError::Integrity(format!(
                        "ledger token {} belongs to {}, not {}",
                        token_id, credential.did, athlete.did
                    )));
                }
                (credential.status, credential.revoke_reason)
            }
            None => {
                debug!("{} is unminted; using directory status", did);
                (athlete.status, None)
            }
        };
        athlete.status = status;

        let age = athlete.profile.age_on(on_date);
        let eligibility = self.eligibility(status, reason.as_deref(), age);
        info!("verified {}: age {}, {:?}", did, age, eligibility);

        self.audit
            .record(AuditEvent::new(format!("Verified athlete with DID {}", did), VERIFICATION_ACTOR))
            .await;

        Ok(VerificationReport {
            athlete,
            age,
            status,
            reason,
            eligibility,
        })
    }

    fn eligibility(&self, status: CredentialStatus, reason: Option<&str>, age: i32) -> Eligibility {
        let reason = reason.unwrap_or_default().to_string();
        match status {
            CredentialStatus::Revoked => Eligibility::Revoked { reason },
            CredentialStatus::Flagged => Eligibility::Flagged { reason },
            CredentialStatus::Active if age < self.min_age || age > self.max_age => {
                Eligibility::Ineligible { age }
            }
            CredentialStatus::Active => Eligibility::Eligible,
        }
    }

    /// Checks a credential token offline against the issuer key.
    pub fn check_token(&self, token: &str) -> Result<CredentialPayload, RegistryError> {
        verify_token(token, &self.issuer_key).map_err(|e| RegistryError::Validation(e.to_string()))
    }
}
