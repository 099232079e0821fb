// src/testing.rs
//! Test doubles for the external collaborators and a harness wiring them
//! into the services.

use crate::biometrics::{BiometricGateway, Comparison};
use crate::blockchain::memory::MemoryLedger;
use crate::blockchain::CredentialLedger;
use crate::error::{BiometricError, DirectoryError, LedgerError, SigningError, StoreError};
use crate::models::athlete::{
    AthleteProfile, AthleteRecord, DocumentBundle, EnrolledEmbedding, UploadedDocument,
};
use crate::models::audit::{AuditLogEntry, AuditRecord};
use crate::models::credential::{CredentialClaims, CredentialRecord, CredentialStatus, MintState, TokenId};
use crate::services::audit_log::AuditLog;
use crate::services::credential_issuer::CredentialAdmin;
use crate::services::registration::{Registrar, RegistrationRequest};
use crate::services::verifier::Verifier;
use crate::storage::directory::{Directory, MemoryDirectory};
use crate::storage::memory::MemoryContentStore;
use crate::storage::ContentStore;
use crate::wallet::key_management::IssuerSigner;
use crate::wallet::CredentialSigner;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ethers::types::{Address, H256};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Hardhat account #0.
pub const ISSUER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const MATCH_THRESHOLD: f64 = 10.0;

/// Face service stand-in.
///
/// The embedding of an image is its first four bytes as floats, zero-padded,
/// and comparison is plain Euclidean distance, so tests pick faces by
/// choosing bytes.
#[derive(Default)]
pub struct EuclideanGateway {
    fail_extract: AtomicBool,
    fail_compare: AtomicBool,
    compare_calls: AtomicUsize,
}

impl EuclideanGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_extract(&self, fail: bool) {
        self.fail_extract.store(fail, Ordering::SeqCst);
    }

    pub fn fail_compare(&self, fail: bool) {
        self.fail_compare.store(fail, Ordering::SeqCst);
    }

    pub fn compare_calls(&self) -> usize {
        self.compare_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BiometricGateway for EuclideanGateway {
    async fn extract_embedding(&self, image: &[u8]) -> Result<Vec<f32>, BiometricError> {
        if self.fail_extract.load(Ordering::SeqCst) {
            return Err(BiometricError::Rejected("No face detected".into()));
        }
        let mut embedding: Vec<f32> = image.iter().take(4).map(|b| *b as f32).collect();
        embedding.resize(4, 0.0);
        Ok(embedding)
    }

    async fn compare_embedding(
        &self,
        candidate: &[f32],
        existing: &[Vec<f32>],
        threshold: f64,
    ) -> Result<Comparison, BiometricError> {
        self.compare_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_compare.load(Ordering::SeqCst) {
            return Err(BiometricError::Rejected("comparison backend offline".into()));
        }
        let best = existing
            .iter()
            .enumerate()
            .map(|(index, other)| {
                let distance = candidate
                    .iter()
                    .zip(other)
                    .map(|(a, b)| f64::from(a - b).powi(2))
                    .sum::<f64>()
                    .sqrt();
                (index, distance)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));

        Ok(match best {
            Some((index, score)) => Comparison {
                is_match: score < threshold,
                best_index: index as i64,
                best_score: score,
            },
            None => Comparison {
                is_match: false,
                best_index: -1,
                best_score: f64::MAX,
            },
        })
    }
}

/// Gateway whose comparison result is fixed.
pub struct ScriptedComparison(pub Comparison);

#[async_trait]
impl BiometricGateway for ScriptedComparison {
    async fn extract_embedding(&self, _image: &[u8]) -> Result<Vec<f32>, BiometricError> {
        Ok(vec![0.0; 4])
    }

    async fn compare_embedding(
        &self,
        _candidate: &[f32],
        _existing: &[Vec<f32>],
        _threshold: f64,
    ) -> Result<Comparison, BiometricError> {
        Ok(self.0.clone())
    }
}

type JsonPredicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// Content store that can be told to fail.
#[derive(Default)]
pub struct FlakyContentStore {
    inner: MemoryContentStore,
    fail_bytes: AtomicBool,
    fail_json: Mutex<Option<JsonPredicate>>,
}

impl FlakyContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryContentStore {
        &self.inner
    }

    pub fn fail_bytes(&self, fail: bool) {
        self.fail_bytes.store(fail, Ordering::SeqCst);
    }

    /// Fails every JSON put whose document satisfies `predicate`.
    pub fn fail_json_when(&self, predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) {
        *self.fail_json.lock().unwrap() = Some(Box::new(predicate));
    }
}

#[async_trait]
impl ContentStore for FlakyContentStore {
    async fn put_bytes(&self, bytes: Vec<u8>, name: &str) -> Result<String, StoreError> {
        if self.fail_bytes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.inner.put_bytes(bytes, name).await
    }

    async fn put_json(&self, value: &Value) -> Result<String, StoreError> {
        let fail = self
            .fail_json
            .lock()
            .unwrap()
            .as_ref()
            .map_or(false, |predicate| predicate(value));
        if fail {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.inner.put_json(value).await
    }

    async fn get(&self, address: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.get(address).await
    }
}

/// Signer that refuses every claim set.
pub struct RefusingSigner;

impl CredentialSigner for RefusingSigner {
    fn issue_token(
        &self,
        _subject_did: &str,
        _claims: &CredentialClaims,
        _issued_at: DateTime<Utc>,
    ) -> Result<String, SigningError> {
        Err(SigningError::InvalidKey("signing key unavailable".into()))
    }
}

/// Directory whose individual operations can be told to fail.
#[derive(Default)]
pub struct FlakyDirectory {
    inner: MemoryDirectory,
    fail_insert: AtomicBool,
    fail_enrolled: AtomicBool,
    fail_status: AtomicBool,
    failing_minted_writes: AtomicUsize,
    yield_before_audit: AtomicBool,
}

impl FlakyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryDirectory {
        &self.inner
    }

    pub fn fail_insert(&self, fail: bool) {
        self.fail_insert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_enrolled(&self, fail: bool) {
        self.fail_enrolled.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    /// Fails the next `count` writes of a `Minted` state.
    pub fn fail_minted_writes(&self, count: usize) {
        self.failing_minted_writes.store(count, Ordering::SeqCst);
    }

    /// Yields to the scheduler before every audit append.
    pub fn yield_before_audit(&self, yield_first: bool) {
        self.yield_before_audit.store(yield_first, Ordering::SeqCst);
    }
}

#[async_trait]
impl Directory for FlakyDirectory {
    async fn enrolled_embeddings(&self) -> Result<Vec<EnrolledEmbedding>, DirectoryError> {
        if self.fail_enrolled.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("read timed out".into()));
        }
        self.inner.enrolled_embeddings().await
    }

    async fn insert_athlete(
        &self,
        record: AthleteRecord,
        embedding: Vec<f32>,
    ) -> Result<AthleteRecord, DirectoryError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("connection reset".into()));
        }
        self.inner.insert_athlete(record, embedding).await
    }

    async fn athlete(&self, did: &str) -> Result<Option<AthleteRecord>, DirectoryError> {
        self.inner.athlete(did).await
    }

    async fn set_mint_state(&self, did: &str, mint: MintState) -> Result<(), DirectoryError> {
        if matches!(mint, MintState::Minted { .. })
            && self
                .failing_minted_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(DirectoryError::Unavailable("connection reset".into()));
        }
        self.inner.set_mint_state(did, mint).await
    }

    async fn claim_mint(&self, did: &str) -> Result<AthleteRecord, DirectoryError> {
        self.inner.claim_mint(did).await
    }

    async fn set_status(&self, did: &str, status: CredentialStatus) -> Result<(), DirectoryError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("connection reset".into()));
        }
        self.inner.set_status(did, status).await
    }

    async fn append_audit(&self, entry: AuditLogEntry, digest: String) -> Result<u64, DirectoryError> {
        if self.yield_before_audit.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        self.inner.append_audit(entry, digest).await
    }

    async fn set_audit_content_address(&self, id: u64, address: String) -> Result<(), DirectoryError> {
        self.inner.set_audit_content_address(id, address).await
    }

    async fn audit(&self, id: u64) -> Result<Option<AuditRecord>, DirectoryError> {
        self.inner.audit(id).await
    }

    async fn audit_matching(&self, fragment: &str) -> Result<Vec<AuditRecord>, DirectoryError> {
        self.inner.audit_matching(fragment).await
    }
}

/// In-memory ledger whose next mints can be made to fail.
pub struct FlakyLedger {
    inner: MemoryLedger,
    failing_mints: AtomicUsize,
}

impl FlakyLedger {
    pub fn new(issuer: Address) -> Self {
        Self {
            inner: MemoryLedger::new(issuer),
            failing_mints: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryLedger {
        &self.inner
    }

    /// Fails the next `count` mints.
    pub fn fail_mints(&self, count: usize) {
        self.failing_mints.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialLedger for FlakyLedger {
    async fn mint_credential(
        &self,
        owner: Address,
        did: &str,
        document_hash: &str,
        biometric_hash: H256,
        token_uri: &str,
    ) -> Result<TokenId, LedgerError> {
        let failing = self
            .failing_mints
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(LedgerError::Transport("connection reset by peer".into()));
        }
        self.inner
            .mint_credential(owner, did, document_hash, biometric_hash, token_uri)
            .await
    }

    async fn get_credential(&self, token_id: TokenId) -> Result<CredentialRecord, LedgerError> {
        self.inner.get_credential(token_id).await
    }

    async fn set_status(
        &self,
        token_id: TokenId,
        status: CredentialStatus,
        reason: &str,
    ) -> Result<(), LedgerError> {
        self.inner.set_status(token_id, status, reason).await
    }

    async fn token_uri(&self, token_id: TokenId) -> Result<String, LedgerError> {
        self.inner.token_uri(token_id).await
    }
}

/// Services wired to test doubles that share state.
pub struct Harness {
    pub store: Arc<FlakyContentStore>,
    pub gateway: Arc<EuclideanGateway>,
    pub directory: Arc<FlakyDirectory>,
    pub ledger: Arc<FlakyLedger>,
    pub issuer: Arc<IssuerSigner>,
    pub audit: Arc<AuditLog>,
}

impl Harness {
    pub fn new() -> Self {
        let issuer = Arc::new(IssuerSigner::from_hex(ISSUER_KEY).unwrap());
        let store = Arc::new(FlakyContentStore::new());
        let directory = Arc::new(FlakyDirectory::new());
        Self {
            audit: Arc::new(AuditLog::new(directory.clone(), store.clone())),
            ledger: Arc::new(FlakyLedger::new(issuer.address)),
            gateway: Arc::new(EuclideanGateway::new()),
            store,
            directory,
            issuer,
        }
    }

    pub fn registrar(&self) -> Registrar {
        self.registrar_signing_with(self.issuer.clone())
    }

    pub fn registrar_signing_with(&self, signer: Arc<dyn CredentialSigner>) -> Registrar {
        Registrar::new(
            self.store.clone(),
            self.gateway.clone(),
            self.directory.clone(),
            self.ledger.clone(),
            signer,
            self.audit.clone(),
            MATCH_THRESHOLD,
        )
    }

    pub fn verifier(&self) -> Verifier {
        Verifier::new(
            self.directory.clone(),
            self.ledger.clone(),
            self.audit.clone(),
            self.issuer.verifying_key(),
            5,
            18,
        )
    }

    pub fn admin(&self) -> CredentialAdmin {
        CredentialAdmin::new(self.directory.clone(), self.ledger.clone(), self.audit.clone())
    }
}

/// A complete request whose selfie embeds as `[face; 4]`.
pub fn registration_request(name: &str, face: u8, dob: &str) -> RegistrationRequest {
    RegistrationRequest {
        name: name.into(),
        dob: dob.into(),
        gender: None,
        school_id: "3".into(),
        sport: "Soccer".into(),
        birth_certificate: Some(UploadedDocument {
            file_name: "birth_certificate.pdf".into(),
            bytes: format!("%PDF birth certificate of {}", name).into_bytes(),
        }),
        selfie: Some(UploadedDocument {
            file_name: "selfie.jpg".into(),
            bytes: vec![face; 16],
        }),
        consent: true,
    }
}

/// A directory row that never went through registration.
pub fn athlete_record(did: &str) -> AthleteRecord {
    AthleteRecord {
        did: did.to_string(),
        profile: AthleteProfile {
            name: "Farai".into(),
            dob: NaiveDate::from_ymd_opt(2012, 1, 2).unwrap(),
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
        mint: MintState::Unminted {
            reason: "not registered".into(),
        },
        registered_at: Utc::now(),
    }
}
