// src/error.rs
//! Error types for the registry.
//!
//! Each external collaborator has its own error enum; the services fold them
//! into [`RegistryError`], which names the failing step and never carries
//! key material, raw embeddings or document bytes.

use crate::models::credential::{CredentialStatus, TokenId};
use std::fmt;
use thiserror::Error;

/// Content store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("content store unavailable: {0}")]
    Unavailable(String),

    #[error("content '{0}' not found")]
    NotFound(String),

    #[error("content encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Biometric gateway failures.
#[derive(Error, Debug)]
pub enum BiometricError {
    #[error("face service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("face service rejected the request: {0}")]
    Rejected(String),

    #[error("face service returned an unusable response: {0}")]
    Malformed(String),
}

/// Identity generation and token signing failures.
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("invalid issuer key: {0}")]
    InvalidKey(String),

    #[error("claim set rejected: {0}")]
    InvalidClaims(String),

    #[error("token encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("malformed credential token: {0}")]
    MalformedToken(String),

    #[error("credential token signature does not verify")]
    BadSignature,
}

/// Directory collaborator failures.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("athlete '{0}' already registered")]
    DuplicateDid(String),

    #[error("directory record '{0}' not found")]
    NotFound(String),

    #[error("directory unavailable: {0}")]
    Unavailable(String),

    #[error("credential for '{did}' is already {state}")]
    MintNotClaimable { did: String, state: &'static str },
}

/// Ledger failures, including rejections by the credential state machine.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("caller {caller} is not the credential issuer")]
    Unauthorized { caller: String },

    #[error("credential token {0} does not exist")]
    UnknownToken(TokenId),

    #[error("credential token {token_id} is already {status}: {reason}")]
    AlreadyFinal {
        token_id: TokenId,
        status: CredentialStatus,
        reason: String,
    },

    #[error("credential for {0} has not been minted")]
    NotMinted(String),

    #[error("status change to {0} is not permitted")]
    InvalidTransition(CredentialStatus),

    #[error("ledger did not confirm the transaction: {0}")]
    MissingConfirmation(String),

    #[error("ledger rejected the call: {0}")]
    Rejected(String),

    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("contract binding error: {0}")]
    Contract(String),
}

/// Saga and service steps, named in dependency errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    PinDocuments,
    ExtractEmbedding,
    DuplicateCheck,
    SignCredential,
    PersistAthlete,
    PinCardMetadata,
    LoadAthlete,
    AppendAudit,
    AuditLookup,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::PinDocuments => "pin-documents",
            Step::ExtractEmbedding => "extract-embedding",
            Step::DuplicateCheck => "duplicate-check",
            Step::SignCredential => "sign-credential",
            Step::PersistAthlete => "persist-athlete",
            Step::PinCardMetadata => "pin-card-metadata",
            Step::LoadAthlete => "load-athlete",
            Step::AppendAudit => "append-audit",
            Step::AuditLookup => "audit-lookup",
        };
        f.write_str(name)
    }
}

/// Failure of a collaborator the current step depends on.
#[derive(Error, Debug)]
pub enum DependencyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Biometric(#[from] BiometricError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Service-level error taxonomy.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Missing or malformed input; raised before any external call
    #[error("validation failed: {0}")]
    Validation(String),

    /// Biometric duplicate of an existing athlete
    #[error("biometric match with existing athlete {matched_name} ({matched_did}), score {score:.4}")]
    Conflict {
        matched_did: String,
        matched_name: String,
        score: f64,
    },

    #[error("step {step} failed: {source}")]
    Dependency {
        step: Step,
        #[source]
        source: DependencyError,
    },

    #[error(transparent)]
    Ledger(LedgerError),

    /// Status change attempted by someone other than the issuer
    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl RegistryError {
    /// Wraps a collaborator failure with the step it broke.
    pub fn dependency(step: Step, source: impl Into<DependencyError>) -> Self {
        RegistryError::Dependency {
            step,
            source: source.into(),
        }
    }
}

impl From<LedgerError> for RegistryError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Unauthorized { .. } => RegistryError::Authorization(err.to_string()),
            other => RegistryError::Ledger(other),
        }
    }
}
