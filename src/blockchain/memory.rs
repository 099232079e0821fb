// src/blockchain/memory.rs
//! In-process ledger backed by [`CredentialRegistry`].
//!
//! Used for local runs (`ledger.backend = "memory"`) and tests. Clients made
//! with [`MemoryLedger::connect_as`] share the same registry, so a second
//! caller identity can be exercised against the issuer's credentials.

use crate::blockchain::credential_registry::CredentialRegistry;
use crate::blockchain::CredentialLedger;
use crate::error::LedgerError;
use crate::models::credential::{CredentialRecord, CredentialStatus, TokenId};
use async_trait::async_trait;
use ethers::types::{Address, H256};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone)]
pub struct MemoryLedger {
    registry: Arc<Mutex<CredentialRegistry>>,
    caller: Address,
}

impl MemoryLedger {
    /// Creates a fresh ledger whose issuer is `issuer`, connected as the issuer.
    pub fn new(issuer: Address) -> Self {
        Self {
            registry: Arc::new(Mutex::new(CredentialRegistry::new(issuer))),
            caller: issuer,
        }
    }

    /// A client for the same ledger making calls as `caller`.
    pub fn connect_as(&self, caller: Address) -> Self {
        Self {
            registry: self.registry.clone(),
            caller,
        }
    }

    fn registry(&self) -> MutexGuard<'_, CredentialRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CredentialLedger for MemoryLedger {
    async fn mint_credential(
        &self,
        owner: Address,
        did: &str,
        document_hash: &str,
        biometric_hash: H256,
        token_uri: &str,
    ) -> Result<TokenId, LedgerError> {
        self.registry()
            .mint(self.caller, owner, did, document_hash, biometric_hash, token_uri)
    }

    async fn get_credential(&self, token_id: TokenId) -> Result<CredentialRecord, LedgerError> {
        self.registry().get(token_id).cloned()
    }

    async fn set_status(
        &self,
        token_id: TokenId,
        status: CredentialStatus,
        reason: &str,
    ) -> Result<(), LedgerError> {
        self.registry().set_status(self.caller, token_id, status, reason)
    }

    async fn token_uri(&self, token_id: TokenId) -> Result<String, LedgerError> {
        self.registry().token_uri(token_id).map(str::to_string)
    }
}
