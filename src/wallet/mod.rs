// src/wallet/mod.rs
pub mod key_management;

use crate::error::SigningError;
use crate::models::credential::CredentialClaims;
use chrono::{DateTime, Utc};

/// Issues signed credential tokens anchored to the issuer DID.
pub trait CredentialSigner: Send + Sync {
    fn issue_token(
        &self,
        subject_did: &str,
        claims: &CredentialClaims,
        issued_at: DateTime<Utc>,
    ) -> Result<String, SigningError>;
}

impl CredentialSigner for key_management::IssuerSigner {
    fn issue_token(
        &self,
        subject_did: &str,
        claims: &CredentialClaims,
        issued_at: DateTime<Utc>,
    ) -> Result<String, SigningError> {
        key_management::IssuerSigner::issue_token(self, subject_did, claims, issued_at)
    }
}
