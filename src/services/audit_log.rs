// src/services/audit_log.rs
//! Tamper-evident audit trail.
//!
//! Each entry is canonicalised (sorted keys, no nulls, no bookkeeping
//! fields), digested with Keccak-256 and stored with its digest in the
//! directory. The canonical form plus digest is then pinned to the content
//! store; that second copy is what [`AuditLog::verify`] checks against.

use crate::error::{RegistryError, Step};
use crate::models::audit::{AuditLogEntry, AuditRecord, IntegrityStatus, PinnedAuditEntry};
use crate::storage::directory::Directory;
use crate::storage::ContentStore;
use crate::utils::crypto::hex_digest;
use crate::utils::serialization::{canonical_json, deserialize};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use log::{info, warn};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

/// An action about to be audited.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: String,
    pub actor: String,
    pub reason: Option<String>,
    pub evidence_url: Option<String>,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            actor: actor.into(),
            reason: None,
            evidence_url: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_evidence(mut self, evidence_url: Option<String>) -> Self {
        self.evidence_url = evidence_url.filter(|url| !url.trim().is_empty());
        self
    }
}

/// Canonical JSON form of an entry, as digested and pinned.
pub fn canonical_entry(entry: &AuditLogEntry) -> Value {
    json!({
        "action": entry.action,
        "actor": entry.actor,
        "timestamp": entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        "reason": entry.reason,
        "evidence_url": entry.evidence_url,
    })
}

/// `0x`-prefixed Keccak-256 digest of an entry's canonical form.
pub fn entry_digest(entry: &AuditLogEntry) -> String {
    hex_digest(canonical_json(&canonical_entry(entry)).as_bytes())
}

pub struct AuditLog {
    directory: Arc<dyn Directory>,
    store: Arc<dyn ContentStore>,
    /// Last timestamp written; held across the directory append so that
    /// sequence ids and timestamps advance together.
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl AuditLog {
    pub fn new(directory: Arc<dyn Directory>, store: Arc<dyn ContentStore>) -> Self {
        Self {
            directory,
            store,
            last_timestamp: Mutex::new(None),
        }
    }

    /// Current time at millisecond precision, never earlier than `last`.
    fn next_timestamp(last: &mut Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(3);
        let stamped = match *last {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        *last = Some(stamped);
        stamped
    }

    /// Appends an entry and pins its canonical copy.
    ///
    /// # Returns
    /// The stored record. `entry.content_address` is `None` when pinning
    /// failed; that is logged and otherwise ignored.
    ///
    /// # Errors
    /// `Dependency` at `append-audit` if the directory write fails.
    pub async fn append(&self, event: AuditEvent) -> Result<AuditRecord, RegistryError> {
        let (id, mut entry, digest) = {
            let mut last = self.last_timestamp.lock().await;
            let mut entry = AuditLogEntry::new(event.action, event.actor, Self::next_timestamp(&mut *last));
            entry.reason = event.reason;
            entry.evidence_url = event.evidence_url;

            let digest = entry_digest(&entry);
            let id = self
                .directory
                .append_audit(entry.clone(), digest.clone())
                .await
                .map_err(|e| RegistryError::dependency(Step::AppendAudit, e))?;
            (id, entry, digest)
        };

        let pinned = json!({ "entry": canonical_entry(&entry), "digest": digest });
        match self.store.put_json(&pinned).await {
            Ok(address) => match self.directory.set_audit_content_address(id, address.clone()).await {
                Ok(()) => entry.content_address = Some(address),
                Err(e) => warn!("audit entry {} pinned as {} but not recorded: {}", id, address, e),
            },
            Err(e) => warn!("failed to pin audit entry {}: {}", id, e),
        }

        Ok(AuditRecord { id, entry, digest })
    }

    /// Best-effort [`append`](Self::append): failures are logged and
    /// swallowed.
    pub async fn record(&self, event: AuditEvent) -> Option<AuditRecord> {
        let action = event.action.clone();
        match self.append(event).await {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("audit entry '{}' not recorded: {}", action, e);
                None
            }
        }
    }

    /// Compares a directory entry with its pinned copy.
    ///
    /// # Returns
    /// - `Valid` when the recomputed digest matches the pinned one
    /// - `Tampered` when any of the digests disagree
    /// - `Error` when the pinned copy is missing, unreachable or unreadable
    ///
    /// # Errors
    /// `NotFound` for an unknown id; `Dependency` if the directory read fails.
    pub async fn verify(&self, id: u64) -> Result<IntegrityStatus, RegistryError> {
        let record = self
            .directory
            .audit(id)
            .await
            .map_err(|e| RegistryError::dependency(Step::AuditLookup, e))?
            .ok_or_else(|| RegistryError::NotFound(format!("audit entry {}", id)))?;

        let Some(address) = record.entry.content_address.as_deref() else {
            return Ok(IntegrityStatus::Error {
                detail: format!("audit entry {} has no pinned copy", id),
            });
        };
        let bytes = match self.store.get(address).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("pinned copy of audit entry {} unreachable: {}", id, e);
                return Ok(IntegrityStatus::Error { detail: e.to_string() });
            }
        };
        let pinned: PinnedAuditEntry = match deserialize(&String::from_utf8_lossy(&bytes)) {
            Ok(pinned) => pinned,
            Err(e) => {
                return Ok(IntegrityStatus::Error {
                    detail: format!("pinned copy of audit entry {} is unreadable: {}", id, e),
                })
            }
        };

        let recomputed = entry_digest(&record.entry);
        let pinned_form = hex_digest(canonical_json(&pinned.entry).as_bytes());
        let found = if recomputed != pinned.digest {
            recomputed
        } else if record.digest != pinned.digest {
            record.digest
        } else {
            pinned_form
        };
        let status = if found == pinned.digest {
            IntegrityStatus::Valid
        } else {
            IntegrityStatus::Tampered {
                expected: pinned.digest,
                found,
            }
        };

        if status != IntegrityStatus::Valid {
            warn!("audit entry {} failed integrity check", id);
        } else {
            info!("audit entry {} verified", id);
        }
        Ok(status)
    }

    /// Audit history for a DID, oldest first.
    pub async fn history(&self, did: &str) -> Result<Vec<AuditRecord>, RegistryError> {
        self.directory
            .audit_matching(did)
            .await
            .map_err(|e| RegistryError::dependency(Step::AuditLookup, e))
    }
}
