// src/storage/directory.rs
//! Directory collaborator: athlete rows keyed by DID and audit rows keyed by
//! sequence id.
//!
//! The relational directory itself is external; this module defines the
//! contract the registry needs from it and an in-memory implementation used
//! for local runs and tests.

use crate::error::DirectoryError;
use crate::models::athlete::{AthleteRecord, EnrolledEmbedding};
use crate::models::audit::{AuditLogEntry, AuditRecord};
use crate::models::credential::{CredentialStatus, MintState};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

#[async_trait]
pub trait Directory: Send + Sync {
    /// Every enrolled embedding, tagged with its owner.
    async fn enrolled_embeddings(&self) -> Result<Vec<EnrolledEmbedding>, DirectoryError>;

    /// Inserts a new athlete together with their embedding.
    ///
    /// Fails with `DuplicateDid` if the DID is already present.
    async fn insert_athlete(
        &self,
        record: AthleteRecord,
        embedding: Vec<f32>,
    ) -> Result<AthleteRecord, DirectoryError>;

    async fn athlete(&self, did: &str) -> Result<Option<AthleteRecord>, DirectoryError>;

    async fn set_mint_state(&self, did: &str, mint: MintState) -> Result<(), DirectoryError>;

    /// Atomically moves an `Unminted` row to `Minting` and returns it.
    ///
    /// Any other mint state fails with `MintNotClaimable` and is left as is.
    async fn claim_mint(&self, did: &str) -> Result<AthleteRecord, DirectoryError>;

    async fn set_status(&self, did: &str, status: CredentialStatus) -> Result<(), DirectoryError>;

    /// Appends an audit row and returns its sequence id.
    async fn append_audit(&self, entry: AuditLogEntry, digest: String) -> Result<u64, DirectoryError>;

    /// Records where the audit row's canonical copy was pinned.
    async fn set_audit_content_address(&self, id: u64, address: String) -> Result<(), DirectoryError>;

    async fn audit(&self, id: u64) -> Result<Option<AuditRecord>, DirectoryError>;

    /// Audit rows whose action mentions `fragment`, oldest first.
    async fn audit_matching(&self, fragment: &str) -> Result<Vec<AuditRecord>, DirectoryError>;
}

struct AthleteRow {
    record: AthleteRecord,
    embedding: Vec<f32>,
}

#[derive(Default)]
struct Tables {
    athletes: HashMap<String, AthleteRow>,
    audit: BTreeMap<u64, AuditRecord>,
    next_audit_id: u64,
}

/// In-memory directory.
///
/// Each call takes the table lock once, which gives row-level atomicity
/// equivalent to the relational store it stands in for.
#[derive(Default)]
pub struct MemoryDirectory {
    tables: Mutex<Tables>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn athlete_count(&self) -> usize {
        self.tables().athletes.len()
    }

    /// Rewrites an audit row in place, as an attacker with database access could.
    #[cfg(test)]
    pub fn tamper_audit(&self, id: u64, action: &str) {
        if let Some(row) = self.tables().audit.get_mut(&id) {
            row.entry.action = action.to_string();
        }
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn enrolled_embeddings(&self) -> Result<Vec<EnrolledEmbedding>, DirectoryError> {
        let tables = self.tables();
        let mut enrolled: Vec<EnrolledEmbedding> = tables
            .athletes
            .values()
            .map(|row| EnrolledEmbedding {
                did: row.record.did.clone(),
                name: row.record.profile.name.clone(),
                embedding: row.embedding.clone(),
            })
            .collect();
        enrolled.sort_by(|a, b| a.did.cmp(&b.did));
        Ok(enrolled)
    }

    async fn insert_athlete(
        &self,
        record: AthleteRecord,
        embedding: Vec<f32>,
    ) -> Result<AthleteRecord, DirectoryError> {
        let mut tables = self.tables();
        if tables.athletes.contains_key(&record.did) {
            return Err(DirectoryError::DuplicateDid(record.did));
        }
        tables.athletes.insert(
            record.did.clone(),
            AthleteRow {
                record: record.clone(),
                embedding,
            },
        );
        Ok(record)
    }

    async fn athlete(&self, did: &str) -> Result<Option<AthleteRecord>, DirectoryError> {
        Ok(self.tables().athletes.get(did).map(|row| row.record.clone()))
    }

    async fn set_mint_state(&self, did: &str, mint: MintState) -> Result<(), DirectoryError> {
        let mut tables = self.tables();
        let row = tables
            .athletes
            .get_mut(did)
            .ok_or_else(|| DirectoryError::NotFound(did.to_string()))?;
        row.record.mint = mint;
        Ok(())
    }

    async fn claim_mint(&self, did: &str) -> Result<AthleteRecord, DirectoryError> {
        let mut tables = self.tables();
        let row = tables
            .athletes
            .get_mut(did)
            .ok_or_else(|| DirectoryError::NotFound(did.to_string()))?;
        if !matches!(row.record.mint, MintState::Unminted { .. }) {
            return Err(DirectoryError::MintNotClaimable {
                did: did.to_string(),
                state: row.record.mint.label(),
            });
        }
        row.record.mint = MintState::Minting;
        Ok(row.record.clone())
    }

    async fn set_status(&self, did: &str, status: CredentialStatus) -> Result<(), DirectoryError> {
        let mut tables = self.tables();
        let row = tables
            .athletes
            .get_mut(did)
            .ok_or_else(|| DirectoryError::NotFound(did.to_string()))?;
        row.record.status = status;
        Ok(())
    }

    async fn append_audit(&self, entry: AuditLogEntry, digest: String) -> Result<u64, DirectoryError> {
        let mut tables = self.tables();
        tables.next_audit_id += 1;
        let id = tables.next_audit_id;
        tables.audit.insert(id, AuditRecord { id, entry, digest });
        Ok(id)
    }

    async fn set_audit_content_address(&self, id: u64, address: String) -> Result<(), DirectoryError> {
        let mut tables = self.tables();
        let row = tables
            .audit
            .get_mut(&id)
            .ok_or_else(|| DirectoryError::NotFound(format!("audit entry {}", id)))?;
        row.entry.content_address = Some(address);
        Ok(())
    }

    async fn audit(&self, id: u64) -> Result<Option<AuditRecord>, DirectoryError> {
        Ok(self.tables().audit.get(&id).cloned())
    }

    async fn audit_matching(&self, fragment: &str) -> Result<Vec<AuditRecord>, DirectoryError> {
        Ok(self
            .tables()
            .audit
            .values()
            .filter(|row| row.entry.action.contains(fragment))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::athlete::{AthleteProfile, DocumentBundle};
    use chrono::{NaiveDate, Utc};
    use ethers::types::H256;

    fn record(did: &str) -> AthleteRecord {
        AthleteRecord {
            did: did.to_string(),
            profile: AthleteProfile {
                name: "Farai".into(),
                dob: NaiveDate::from_ymd_opt(2011, 1, 2).unwrap(),
                gender: None,
                school_id: "2".into(),
                sport: "Rugby".into(),
            },
            documents: DocumentBundle {
                birth_certificate_ca: "a".into(),
                selfie_ca: "b".into(),
                metadata_ca: "c".into(),
            },
            biometric_hash: H256::zero(),
            status: CredentialStatus::Active,
            mint: MintState::Unminted { reason: "pending".into() },
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_dids_are_rejected() {
        let directory = MemoryDirectory::new();
        directory.insert_athlete(record("did:ethr:0x1"), vec![0.1]).await.unwrap();
        let second = directory.insert_athlete(record("did:ethr:0x1"), vec![0.2]).await;
        assert!(matches!(second, Err(DirectoryError::DuplicateDid(_))));
        assert_eq!(directory.athlete_count(), 1);
    }

    #[tokio::test]
    async fn embeddings_are_tagged_with_owner() {
        let directory = MemoryDirectory::new();
        directory.insert_athlete(record("did:ethr:0x1"), vec![0.1, 0.2]).await.unwrap();
        let enrolled = directory.enrolled_embeddings().await.unwrap();
        assert_eq!(enrolled.len(), 1);
        assert_eq!(enrolled[0].did, "did:ethr:0x1");
        assert_eq!(enrolled[0].name, "Farai");
        assert_eq!(enrolled[0].embedding, vec![0.1, 0.2]);
    }

    #[tokio::test]
    async fn audit_ids_are_sequential_and_searchable() {
        let directory = MemoryDirectory::new();
        let now = Utc::now();
        let first = directory
            .append_audit(AuditLogEntry::new("registered did:ethr:0xA", "api", now), "d1".into())
            .await
            .unwrap();
        let second = directory
            .append_audit(AuditLogEntry::new("registered did:ethr:0xB", "api", now), "d2".into())
            .await
            .unwrap();
        assert_eq!((first, second), (1, 2));

        let matching = directory.audit_matching("0xB").await.unwrap();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].id, 2);
    }

    #[tokio::test]
    async fn updates_to_unknown_rows_fail() {
        let directory = MemoryDirectory::new();
        assert!(directory.set_status("did:ethr:0x9", CredentialStatus::Revoked).await.is_err());
        assert!(directory.set_audit_content_address(4, "cid".into()).await.is_err());
    }

    #[tokio::test]
    async fn only_unminted_rows_can_be_claimed_for_minting() {
        let directory = MemoryDirectory::new();
        directory.insert_athlete(record("did:ethr:0x1"), vec![0.1]).await.unwrap();

        let claimed = directory.claim_mint("did:ethr:0x1").await.unwrap();
        assert_eq!(claimed.mint, MintState::Minting);
        assert!(matches!(
            directory.claim_mint("did:ethr:0x1").await,
            Err(DirectoryError::MintNotClaimable { state: "being minted", .. })
        ));

        directory
            .set_mint_state(
                "did:ethr:0x1",
                MintState::Minted {
                    token_id: 1.into(),
                    token_uri: "ipfs://card".into(),
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            directory.claim_mint("did:ethr:0x1").await,
            Err(DirectoryError::MintNotClaimable { state: "minted", .. })
        ));
        assert!(matches!(
            directory.claim_mint("did:ethr:0x2").await,
            Err(DirectoryError::NotFound(_))
        ));
    }
}
