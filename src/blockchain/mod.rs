// src/blockchain/mod.rs
//! Ledger side of the registry: the credential state machine and the clients
//! that host it, either in-process or on the deployed `AthleteCredential`
//! contract.

pub mod credential_registry;
pub mod evm_client;
pub mod memory;

use crate::error::LedgerError;
use crate::models::credential::{CredentialRecord, CredentialStatus, TokenId};
use async_trait::async_trait;
use ethers::types::{Address, H256};

/// Ledger client contract.
///
/// The caller identity is fixed when the client is built; every call is
/// made as that identity and authorization is decided by the ledger.
#[async_trait]
pub trait CredentialLedger: Send + Sync {
    /// Mints an `Active` credential and returns its token id.
    async fn mint_credential(
        &self,
        owner: Address,
        did: &str,
        document_hash: &str,
        biometric_hash: H256,
        token_uri: &str,
    ) -> Result<TokenId, LedgerError>;

    /// Reads a credential; unknown ids fail with `UnknownToken`.
    async fn get_credential(&self, token_id: TokenId) -> Result<CredentialRecord, LedgerError>;

    /// Moves an `Active` credential to a terminal status.
    async fn set_status(
        &self,
        token_id: TokenId,
        status: CredentialStatus,
        reason: &str,
    ) -> Result<(), LedgerError>;

    async fn token_uri(&self, token_id: TokenId) -> Result<String, LedgerError>;
}
