// src/models/audit.rs
//! Audit trail data model.
//!
//! Entries are append-only. The digest is computed over the canonical form
//! of the entry and is kept next to it in the directory; a second copy of
//! canonical form and digest is pinned to the content store so the two can
//! be compared later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One audited action.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuditLogEntry {
    pub action: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
    pub evidence_url: Option<String>,
    /// Address of the pinned copy; `None` while unpinned or when pinning failed
    pub content_address: Option<String>,
}

impl AuditLogEntry {
    pub fn new(action: impl Into<String>, actor: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            action: action.into(),
            actor: actor.into(),
            timestamp,
            reason: None,
            evidence_url: None,
            content_address: None,
        }
    }
}

/// Directory row: sequence id, entry and its digest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub id: u64,
    pub entry: AuditLogEntry,
    pub digest: String,
}

/// The document pinned to the content store for each entry.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PinnedAuditEntry {
    pub entry: serde_json::Value,
    pub digest: String,
}

/// Outcome of an integrity check.
///
/// `Error` means the comparison could not be made; it is never evidence of
/// tampering.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum IntegrityStatus {
    Valid,
    Tampered { expected: String, found: String },
    Error { detail: String },
}
