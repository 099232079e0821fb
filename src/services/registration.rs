// src/services/registration.rs
//! Athlete registration.
//!
//! A registration runs as an ordered saga:
//!
//! 1. pin the birth certificate, selfie and a metadata document linking them
//! 2. extract the selfie's biometric embedding
//! 3. reject the registration if the embedding matches an enrolled athlete
//! 4. generate the athlete's identity
//! 5. sign the credential token
//! 6. insert the athlete into the directory
//! 7. audit the registration and the consent given
//! 8. pin team-card metadata and mint the ledger credential
//!
//! Steps 1-6 are fatal and nothing is written to the directory unless all of
//! them succeed. Step 6 commits the registration; 7 and 8 are best-effort and
//! a failed mint leaves the athlete `Unminted` until [`Registrar::retry_mint`]
//! succeeds. Steps are not cancellable once 6 has completed.
//!
//! A row is inserted as `Minting` and every later mint first claims it through
//! [`Directory::claim_mint`], so at most one mint per athlete is in flight.
//! Once the ledger returns a token the row is never put back to `Unminted`.

use crate::biometrics::duplicate_gate::{DuplicateGate, GateDecision};
use crate::biometrics::BiometricGateway;
use crate::blockchain::CredentialLedger;
use crate::error::{DirectoryError, RegistryError, Step, StoreError};
use crate::models::athlete::{AthleteProfile, AthleteRecord, DocumentBundle, UploadedDocument};
use crate::models::credential::{AthleteAgeClaims, CredentialClaims, CredentialStatus, MintState, TokenId};
use crate::models::did::address_from_did;
use crate::services::audit_log::{AuditEvent, AuditLog};
use crate::storage::directory::Directory;
use crate::storage::{ipfs_uri, ContentStore};
use crate::utils::crypto::embedding_commitment;
use crate::wallet::key_management::generate_identity;
use crate::wallet::CredentialSigner;
use chrono::{NaiveDate, Utc};
use ethers::types::H256;
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;

/// Actor recorded on registration audit entries.
pub const REGISTRATION_ACTOR: &str = "registration-api";

const MINTED_WRITE_ATTEMPTS: usize = 3;

/// Raw registration input, as received.
#[derive(Clone, Default)]
pub struct RegistrationRequest {
    pub name: String,
    /// ISO-8601 date of birth
    pub dob: String,
    pub gender: Option<String>,
    pub school_id: String,
    pub sport: String,
    pub birth_certificate: Option<UploadedDocument>,
    pub selfie: Option<UploadedDocument>,
    pub consent: bool,
}

/// A request that passed validation.
pub struct ValidRegistration {
    pub profile: AthleteProfile,
    pub birth_certificate: UploadedDocument,
    pub selfie: UploadedDocument,
}

fn required(field: &str, value: &str) -> Result<String, RegistryError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RegistryError::Validation(format!("missing required field '{}'", field)));
    }
    Ok(value.to_string())
}

fn required_document(
    field: &str,
    document: Option<UploadedDocument>,
) -> Result<UploadedDocument, RegistryError> {
    match document {
        Some(doc) if !doc.bytes.is_empty() && !doc.file_name.trim().is_empty() => Ok(doc),
        _ => Err(RegistryError::Validation(format!("missing required document '{}'", field))),
    }
}

impl RegistrationRequest {
    /// Checks every field before anything external is touched.
    pub fn validate(self, today: NaiveDate) -> Result<ValidRegistration, RegistryError> {
        let name = required("name", &self.name)?;
        let dob = NaiveDate::parse_from_str(required("dob", &self.dob)?.as_str(), "%Y-%m-%d")
            .map_err(|_| RegistryError::Validation(format!("dob '{}' is not a YYYY-MM-DD date", self.dob)))?;
        if dob > today {
            return Err(RegistryError::Validation("dob is in the future".into()));
        }
        let school_id = required("school_id", &self.school_id)?;
        let sport = required("sport", &self.sport)?;
        let birth_certificate = required_document("birth_certificate", self.birth_certificate)?;
        let selfie = required_document("selfie", self.selfie)?;
        if !self.consent {
            return Err(RegistryError::Validation("consent is required".into()));
        }

        Ok(ValidRegistration {
            profile: AthleteProfile {
                name,
                dob,
                gender: self.gender.filter(|g| !g.trim().is_empty()),
                school_id,
                sport,
            },
            birth_certificate,
            selfie,
        })
    }
}

/// Successful registration.
pub struct Registration {
    pub athlete: AthleteRecord,
    /// Signed credential token (ES256K JWT)
    pub credential_token: String,
    /// Athlete's private key; handed over here once and stored nowhere
    pub signing_key: String,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("athlete", &self.athlete)
            .field("credential_token", &self.credential_token)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

pub struct Registrar {
    store: Arc<dyn ContentStore>,
    gateway: Arc<dyn BiometricGateway>,
    gate: DuplicateGate,
    directory: Arc<dyn Directory>,
    ledger: Arc<dyn CredentialLedger>,
    issuer: Arc<dyn CredentialSigner>,
    audit: Arc<AuditLog>,
}

impl Registrar {
    /// # Arguments
    /// * `match_threshold` - Embedding distance under which two selfies are
    ///   treated as the same person
    pub fn new(
        store: Arc<dyn ContentStore>,
        gateway: Arc<dyn BiometricGateway>,
        directory: Arc<dyn Directory>,
        ledger: Arc<dyn CredentialLedger>,
        issuer: Arc<dyn CredentialSigner>,
        audit: Arc<AuditLog>,
        match_threshold: f64,
    ) -> Self {
        Self {
            store,
            gate: DuplicateGate::new(gateway.clone(), match_threshold),
            gateway,
            directory,
            ledger,
            issuer,
            audit,
        }
    }

    /// Runs the registration saga.
    ///
    /// # Errors
    /// - `Validation` for bad input, before any external call
    /// - `Conflict` when the selfie matches an enrolled athlete
    /// - `Dependency` naming the step when any of steps 1-6 fails
    ///
    /// Mint failures are not errors: the returned athlete is `Unminted`.
    pub async fn register(&self, request: RegistrationRequest) -> Result<Registration, RegistryError> {
        let ValidRegistration {
            profile,
            birth_certificate,
            selfie,
        } = request.validate(Utc::now().date_naive())?;

        let documents = self
            .pin_documents(&profile, &birth_certificate, &selfie)
            .await
            .map_err(|e| RegistryError::dependency(Step::PinDocuments, e))?;

        let embedding = self
            .gateway
            .extract_embedding(&selfie.bytes)
            .await
            .map_err(|e| RegistryError::dependency(Step::ExtractEmbedding, e))?;

        let enrolled = self
            .directory
            .enrolled_embeddings()
            .await
            .map_err(|e| RegistryError::dependency(Step::DuplicateCheck, e))?;
        let decision = self
            .gate
            .check(&embedding, &enrolled)
            .await
            .map_err(|e| RegistryError::dependency(Step::DuplicateCheck, e))?;
        if let GateDecision::Match { did, name, score } = decision {
            warn!("registration for {} rejected: biometric match with {} ({:.4})", profile.name, did, score);
            return Err(RegistryError::Conflict {
                matched_did: did,
                matched_name: name,
                score,
            });
        }

        let identity = generate_identity();

        let registered_at = Utc::now();
        let claims = CredentialClaims::AthleteAgeV1(AthleteAgeClaims {
            name: profile.name.clone(),
            dob: profile.dob,
            gender: profile.gender.clone(),
            sport: profile.sport.clone(),
            school_id: profile.school_id.clone(),
            documents: documents.clone(),
        });
        let credential_token = self
            .issuer
            .issue_token(&identity.did, &claims, registered_at)
            .map_err(|e| RegistryError::dependency(Step::SignCredential, e))?;

        let record = AthleteRecord {
            did: identity.did.clone(),
            profile,
            documents,
            biometric_hash: H256(embedding_commitment(&embedding)),
            status: CredentialStatus::Active,
            mint: MintState::Minting,
            registered_at,
        };
        let mut athlete = self
            .directory
            .insert_athlete(record, embedding)
            .await
            .map_err(|e| RegistryError::dependency(Step::PersistAthlete, e))?;
        info!("registered athlete {} as {}", athlete.profile.name, athlete.did);

        self.audit
            .record(AuditEvent::new(
                format!("Registered athlete {} with DID {}", athlete.profile.name, athlete.did),
                REGISTRATION_ACTOR,
            ))
            .await;
        self.audit
            .record(AuditEvent::new(
                format!("Consent given for DID {}", athlete.did),
                REGISTRATION_ACTOR,
            ))
            .await;

        athlete.mint = match self.mint(&athlete).await {
            Ok(minted) => minted,
            Err(e) => {
                warn!("credential for {} left unminted: {}", athlete.did, e);
                self.record_unminted(&athlete.did, &e).await
            }
        };

        Ok(Registration {
            athlete,
            credential_token,
            signing_key: identity.export_signing_key(),
        })
    }

    /// Re-runs the mint step for an athlete left `Unminted`.
    ///
    /// # Errors
    /// `NotFound` for an unknown DID, `Validation` if already minted or a mint
    /// is in flight, and the mint failure itself if it fails again.
    pub async fn retry_mint(&self, did: &str) -> Result<AthleteRecord, RegistryError> {
        let mut athlete = self.directory.claim_mint(did).await.map_err(|e| match e {
            DirectoryError::NotFound(_) => RegistryError::NotFound(format!("athlete {}", did)),
            DirectoryError::MintNotClaimable { .. } => RegistryError::Validation(e.to_string()),
            e => RegistryError::dependency(Step::LoadAthlete, e),
        })?;

        match self.mint(&athlete).await {
            Ok(minted) => {
                athlete.mint = minted;
                Ok(athlete)
            }
            Err(e) => {
                self.record_unminted(did, &e).await;
                Err(e)
            }
        }
    }

    async fn pin_documents(
        &self,
        profile: &AthleteProfile,
        birth_certificate: &UploadedDocument,
        selfie: &UploadedDocument,
    ) -> Result<DocumentBundle, StoreError> {
        let birth_certificate_ca = self
            .store
            .put_bytes(birth_certificate.bytes.clone(), &birth_certificate.file_name)
            .await?;
        let selfie_ca = self.store.put_bytes(selfie.bytes.clone(), &selfie.file_name).await?;
        let metadata = json!({
            "name": profile.name,
            "description": format!("Registration documents for {}", profile.name),
            "birthCertificate": ipfs_uri(&birth_certificate_ca),
            "selfie": ipfs_uri(&selfie_ca),
        });
        let metadata_ca = self.store.put_json(&metadata).await?;

        Ok(DocumentBundle {
            birth_certificate_ca,
            selfie_ca,
            metadata_ca,
        })
    }

    /// Pins card metadata, mints, and records the minted state.
    ///
    /// Fails only before the ledger has accepted the mint.
    async fn mint(&self, athlete: &AthleteRecord) -> Result<MintState, RegistryError> {
        let owner = address_from_did(&athlete.did)
            .ok_or_else(|| RegistryError::Validation(format!("{} has no ledger address", athlete.did)))?;

        let card = json!({
            "name": format!("{} Team Card", athlete.profile.name),
            "description": format!("{} athlete credential for {}", athlete.profile.sport, athlete.profile.name),
            "image": ipfs_uri(&athlete.documents.selfie_ca),
            "did": athlete.did,
            "attributes": [
                { "trait_type": "Sport", "value": athlete.profile.sport },
                { "trait_type": "School", "value": athlete.profile.school_id },
                { "trait_type": "Date of Birth", "value": athlete.profile.dob.to_string() },
            ],
        });
        let card_ca = self
            .store
            .put_json(&card)
            .await
            .map_err(|e| RegistryError::dependency(Step::PinCardMetadata, e))?;
        let token_uri = ipfs_uri(&card_ca);

        let token_id = self
            .ledger
            .mint_credential(
                owner,
                &athlete.did,
                &athlete.documents.metadata_ca,
                athlete.biometric_hash,
                &token_uri,
            )
            .await?;
        let minted = MintState::Minted { token_id, token_uri };
        info!("minted credential token {} for {}", token_id, athlete.did);
        self.record_minted(&athlete.did, token_id, &minted).await;
        self.audit
            .record(AuditEvent::new(
                format!("credential-minted: token {} for DID {}", token_id, athlete.did),
                REGISTRATION_ACTOR,
            ))
            .await;

        Ok(minted)
    }

    /// Writes the minted state, leaving the row claimed if every attempt fails.
    async fn record_minted(&self, did: &str, token_id: TokenId, minted: &MintState) {
        for attempt in 1..=MINTED_WRITE_ATTEMPTS {
            match self.directory.set_mint_state(did, minted.clone()).await {
                Ok(()) => return,
                Err(e) => warn!(
                    "token {} minted for {} but not recorded (attempt {}/{}): {}",
                    token_id,
                    did,
                    attempt,
                    MINTED_WRITE_ATTEMPTS,
                    e
                ),
            }
        }
    }

    async fn record_unminted(&self, did: &str, cause: &RegistryError) -> MintState {
        let unminted = MintState::Unminted {
            reason: cause.to_string(),
        };
        if let Err(e) = self.directory.set_mint_state(did, unminted.clone()).await {
            warn!("could not record mint failure for {}: {}", did, e);
        }
        unminted
    }
}
