// src/models/athlete.rs
//! Athlete registration data model.

use crate::models::credential::{CredentialStatus, MintState};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use ethers::types::H256;
use serde::{Deserialize, Serialize};

/// Profile fields supplied at registration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AthleteProfile {
    pub name: String,
    pub dob: NaiveDate,
    #[serde(default)]
    pub gender: Option<String>,
    pub school_id: String,
    pub sport: String,
}

impl AthleteProfile {
    /// Age in whole years on `on_date`.
    pub fn age_on(&self, on_date: NaiveDate) -> i32 {
        let mut age = on_date.year() - self.dob.year();
        if (on_date.month(), on_date.day()) < (self.dob.month(), self.dob.day()) {
            age -= 1;
        }
        age
    }
}

/// A source document uploaded with a registration.
#[derive(Clone)]
pub struct UploadedDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Content addresses of the pinned registration documents.
///
/// Documents are referenced by address only; their bytes never appear in a
/// record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DocumentBundle {
    pub birth_certificate_ca: String,
    pub selfie_ca: String,
    /// Metadata document linking the other two; used as the ledger document hash
    pub metadata_ca: String,
}

/// Directory row for a registered athlete.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AthleteRecord {
    pub did: String,
    #[serde(flatten)]
    pub profile: AthleteProfile,
    pub documents: DocumentBundle,
    /// Keccak commitment to the biometric embedding
    pub biometric_hash: H256,
    pub status: CredentialStatus,
    pub mint: MintState,
    pub registered_at: DateTime<Utc>,
}

/// An embedding already enrolled in the directory, tagged by its owner.
#[derive(Debug, Clone)]
pub struct EnrolledEmbedding {
    pub did: String,
    pub name: String,
    pub embedding: Vec<f32>,
}
