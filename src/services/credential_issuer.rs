// src/services/credential_issuer.rs
//! Issuer-side credential administration: revoking and flagging.

use crate::blockchain::CredentialLedger;
use crate::error::{LedgerError, RegistryError, Step};
use crate::models::athlete::AthleteRecord;
use crate::models::credential::CredentialStatus;
use crate::services::audit_log::{AuditEvent, AuditLog};
use crate::storage::directory::Directory;
use log::{info, warn};
use serde::Deserialize;
use std::sync::Arc;

/// A requested status change.
#[derive(Deserialize, Debug, Clone)]
pub struct StatusChange {
    pub status: CredentialStatus,
    pub reason: String,
    #[serde(default)]
    pub evidence_url: Option<String>,
    /// Who asked for the change; recorded in the audit trail
    pub actor: String,
}

/// Changes credential status on behalf of the issuer.
///
/// Authorization is left to the ledger: the admin submits as whatever
/// identity its ledger client is bound to, and a non-issuer caller comes
/// back as `Authorization`. Once the ledger accepts a change it is always
/// audited, even if the directory update fails.
pub struct CredentialAdmin {
    directory: Arc<dyn Directory>,
    ledger: Arc<dyn CredentialLedger>,
    audit: Arc<AuditLog>,
}

impl CredentialAdmin {
    pub fn new(directory: Arc<dyn Directory>, ledger: Arc<dyn CredentialLedger>, audit: Arc<AuditLog>) -> Self {
        Self {
            directory,
            ledger,
            audit,
        }
    }

    /// Moves the athlete's credential to `Revoked` or `Flagged`.
    ///
    /// # Returns
    /// The athlete record with the new status.
    ///
    /// # Errors
    /// - `Validation` for `Active` or an empty reason
    /// - `NotFound` for an unknown DID
    /// - `Ledger(NotMinted)` when there is no credential to change
    /// - ledger rejections (`Authorization`, `AlreadyFinal`, ...) unchanged
    pub async fn set_status(&self, did: &str, change: StatusChange) -> Result<AthleteRecord, RegistryError> {
        if !change.status.is_terminal() {
            return Err(RegistryError::Validation(format!(
                "status can only change to Revoked or Flagged, not {}",
                change.status
            )));
        }
        let reason = change.reason.trim();
        if reason.is_empty() {
            return Err(RegistryError::Validation("a reason is required".into()));
        }

        let mut athlete = self
            .directory
            .athlete(did)
            .await
            .map_err(|e| RegistryError::dependency(Step::LoadAthlete, e))?
            .ok_or_else(|| RegistryError::NotFound(format!("athlete {}", did)))?;
        let token_id = athlete
            .mint
            .token_id()
            .ok_or_else(|| LedgerError::NotMinted(did.to_string()))?;

        if let Err(e) = self.ledger.set_status(token_id, change.status, reason).await {
            warn!("status change for {} to {} rejected: {}", did, change.status, e);
            return Err(e.into());
        }

        // The ledger is authoritative from here on; the directory copy may lag.
        if let Err(e) = self.directory.set_status(did, change.status).await {
            warn!("{} credential for {} not mirrored to the directory: {}", change.status, did, e);
        }
        athlete.status = change.status;
        info!("{} credential for {}: {}", change.status, did, reason);

        self.audit
            .record(
                AuditEvent::new(format!("{} credential for DID {}", change.status, did), change.actor)
                    .with_reason(reason)
                    .with_evidence(change.evidence_url),
            )
            .await;

        Ok(athlete)
    }
}
