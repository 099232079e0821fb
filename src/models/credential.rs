// src/models/credential.rs
//! Credential data model.
//!
//! Two halves live here: the ledger-resident [`CredentialRecord`] with its
//! status machine vocabulary, and the closed claim schema that gets signed
//! into the athlete's credential token.

use crate::models::athlete::DocumentBundle;
use crate::models::did::address_from_did;
use chrono::NaiveDate;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger token identifier.
pub type TokenId = U256;

/// Status of a credential on the ledger.
///
/// `Active` is set at mint. `Revoked` and `Flagged` are terminal: nothing
/// moves a credential back to `Active`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialStatus {
    Active,
    Revoked,
    Flagged,
}

impl CredentialStatus {
    /// Numeric code used by the credential contract (`enum Status`).
    pub fn code(self) -> u8 {
        match self {
            CredentialStatus::Active => 0,
            CredentialStatus::Revoked => 1,
            CredentialStatus::Flagged => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CredentialStatus::Active),
            1 => Some(CredentialStatus::Revoked),
            2 => Some(CredentialStatus::Flagged),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, CredentialStatus::Active)
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CredentialStatus::Active => "Active",
            CredentialStatus::Revoked => "Revoked",
            CredentialStatus::Flagged => "Flagged",
        };
        f.write_str(name)
    }
}

/// A credential as held on the ledger.
///
/// `biometric_hash` is a commitment to the embedding, never the vector
/// itself. `token_uri` is fixed at mint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CredentialRecord {
    pub did: String,
    pub owner: Address,
    /// Content address of the pinned document metadata
    pub document_hash: String,
    pub biometric_hash: H256,
    pub status: CredentialStatus,
    pub revoke_reason: Option<String>,
    pub token_uri: String,
}

/// Where an athlete's credential stands with respect to the ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MintState {
    /// Credential exists on the ledger.
    Minted { token_id: TokenId, token_uri: String },
    /// A mint has been claimed and its outcome is not recorded yet.
    Minting,
    /// Registration committed but the ledger mint has not succeeded yet.
    Unminted { reason: String },
}

impl MintState {
    pub fn token_id(&self) -> Option<TokenId> {
        match self {
            MintState::Minted { token_id, .. } => Some(*token_id),
            MintState::Minting | MintState::Unminted { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MintState::Minted { .. } => "minted",
            MintState::Minting => "being minted",
            MintState::Unminted { .. } => "unminted",
        }
    }
}

/// Claims about an athlete, versioned by schema tag.
///
/// Adding a field means adding a new variant; existing variants never
/// change shape so previously issued tokens keep decoding.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "schema")]
pub enum CredentialClaims {
    #[serde(rename = "athlete-age/v1")]
    AthleteAgeV1(AthleteAgeClaims),
}

/// Version 1 of the athlete age claim set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AthleteAgeClaims {
    pub name: String,
    pub dob: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    pub sport: String,
    pub school_id: String,
    pub documents: DocumentBundle,
}

impl CredentialClaims {
    /// Checks the claim set before it is signed for `subject_did`.
    pub fn validate(&self, subject_did: &str) -> Result<(), String> {
        if address_from_did(subject_did).is_none() {
            return Err(format!("subject '{}' is not a did:ethr identifier", subject_did));
        }
        match self {
            CredentialClaims::AthleteAgeV1(claims) => {
                if claims.name.trim().is_empty() {
                    return Err("claim 'name' is empty".into());
                }
                if claims.sport.trim().is_empty() {
                    return Err("claim 'sport' is empty".into());
                }
                if claims.school_id.trim().is_empty() {
                    return Err("claim 'school_id' is empty".into());
                }
                if claims.documents.metadata_ca.is_empty() {
                    return Err("claim 'documents' has no metadata address".into());
                }
                Ok(())
            }
        }
    }
}
