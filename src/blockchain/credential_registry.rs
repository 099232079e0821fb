// src/blockchain/credential_registry.rs
//! Credential state machine.
//!
//! Mirrors the rules enforced by the `AthleteCredential` contract:
//! - only the issuer mints or changes status
//! - credentials start `Active`
//! - `Active` moves once to `Revoked` or `Flagged` and stays there
//! - unknown token ids are errors, never zeroed records
//! - `token_uri` is fixed at mint

use crate::error::LedgerError;
use crate::models::credential::{CredentialRecord, CredentialStatus, TokenId};
use ethers::types::{Address, H256};
use ethers::utils::to_checksum;
use std::collections::BTreeMap;

pub struct CredentialRegistry {
    issuer: Address,
    tokens: BTreeMap<TokenId, CredentialRecord>,
    next_id: TokenId,
}

impl CredentialRegistry {
    pub fn new(issuer: Address) -> Self {
        Self {
            issuer,
            tokens: BTreeMap::new(),
            next_id: TokenId::one(),
        }
    }

    fn authorize(&self, caller: Address) -> Result<(), LedgerError> {
        if caller != self.issuer {
            return Err(LedgerError::Unauthorized {
                caller: to_checksum(&caller, None),
            });
        }
        Ok(())
    }

    pub fn mint(
        &mut self,
        caller: Address,
        owner: Address,
        did: &str,
        document_hash: &str,
        biometric_hash: H256,
        token_uri: &str,
    ) -> Result<TokenId, LedgerError> {
        self.authorize(caller)?;
        if did.is_empty() || token_uri.is_empty() {
            return Err(LedgerError::Rejected("did and token URI are required".into()));
        }

        let token_id = self.next_id;
        self.next_id = token_id + 1;
        self.tokens.insert(
            token_id,
            CredentialRecord {
                did: did.to_string(),
                owner,
                document_hash: document_hash.to_string(),
                biometric_hash,
                status: CredentialStatus::Active,
                revoke_reason: None,
                token_uri: token_uri.to_string(),
            },
        );
        Ok(token_id)
    }

    pub fn get(&self, token_id: TokenId) -> Result<&CredentialRecord, LedgerError> {
        self.tokens
            .get(&token_id)
            .ok_or(LedgerError::UnknownToken(token_id))
    }

    pub fn set_status(
        &mut self,
        caller: Address,
        token_id: TokenId,
        status: CredentialStatus,
        reason: &str,
    ) -> Result<(), LedgerError> {
        self.authorize(caller)?;
        let record = self
            .tokens
            .get_mut(&token_id)
            .ok_or(LedgerError::UnknownToken(token_id))?;

        if !status.is_terminal() {
            return Err(LedgerError::InvalidTransition(status));
        }
        if record.status.is_terminal() {
            return Err(LedgerError::AlreadyFinal {
                token_id,
                status: record.status,
                reason: record.revoke_reason.clone().unwrap_or_default(),
            });
        }

        record.status = status;
        record.revoke_reason = Some(reason.to_string());
        Ok(())
    }

    pub fn token_uri(&self, token_id: TokenId) -> Result<&str, LedgerError> {
        self.get(token_id).map(|record| record.token_uri.as_str())
    }
}
