// src/blockchain/evm_client.rs
//! EVM client for the deployed `AthleteCredential` contract.
//!
//! Every state-changing call is simulated with `eth_call` first so contract
//! reverts come back with their reason string, then sent through a signing
//! middleware and confirmed from the transaction receipt.

use crate::blockchain::CredentialLedger;
use crate::error::LedgerError;
use crate::models::credential::{CredentialRecord, CredentialStatus, TokenId};
use async_trait::async_trait;
use ethers::abi::Abi;
use ethers::contract::{BaseContract, Contract, ContractCall, ContractError};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TransactionReceipt, H256, U64};
use ethers::utils::to_checksum;
use log::{debug, info, warn};
use std::sync::Arc;

/// Contract ABI, as exported by the contract build.
const CREDENTIAL_ABI: &[u8] = include_bytes!("abi/AthleteCredential.json");

type SignedClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Parses the bundled contract ABI.
pub fn credential_abi() -> Result<Abi, LedgerError> {
    Abi::load(CREDENTIAL_ABI).map_err(|e| LedgerError::Contract(format!("invalid ABI: {}", e)))
}

/// Broad class of a contract revert, recovered from its reason string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertKind {
    Unauthorized,
    UnknownToken,
    AlreadyFinal,
    Other,
}

impl RevertKind {
    pub fn from_reason(reason: &str) -> Self {
        let reason = reason.to_ascii_lowercase();
        if reason.contains("not the issuer")
            || reason.contains("not issuer")
            || reason.contains("caller is not")
            || reason.contains("unauthorized")
        {
            RevertKind::Unauthorized
        } else if reason.contains("nonexistent")
            || reason.contains("does not exist")
            || reason.contains("invalid token")
        {
            RevertKind::UnknownToken
        } else if reason.contains("already") {
            RevertKind::AlreadyFinal
        } else {
            RevertKind::Other
        }
    }
}

/// Extracts the id of the credential minted in `receipt`.
///
/// A reverted transaction is `Rejected`; a successful one without a
/// `CredentialMinted` event from `contract_address` is `MissingConfirmation`.
pub fn minted_token_id(
    abi: &BaseContract,
    contract_address: Address,
    receipt: &TransactionReceipt,
) -> Result<TokenId, LedgerError> {
    if receipt.status != Some(U64::from(1)) {
        return Err(LedgerError::Rejected(format!(
            "mint transaction {:?} reverted",
            receipt.transaction_hash
        )));
    }

    receipt
        .logs
        .iter()
        .filter(|log| log.address == contract_address)
        .find_map(|log| {
            abi.decode_event::<(TokenId, Address, String)>(
                "CredentialMinted",
                log.topics.clone(),
                log.data.clone(),
            )
            .ok()
        })
        .map(|(token_id, _, _)| token_id)
        .ok_or_else(|| {
            LedgerError::MissingConfirmation(format!(
                "no CredentialMinted event in transaction {:?}",
                receipt.transaction_hash
            ))
        })
}

fn revert_reason(err: &ContractError<SignedClient>) -> Option<String> {
    match err.decode_revert::<String>() {
        Some(reason) => Some(reason),
        None if err.is_revert() => Some("execution reverted".to_string()),
        None => None,
    }
}

/// Ledger client bound to one contract and one signing identity.
#[derive(Clone)]
pub struct EvmLedger {
    client: Arc<SignedClient>,
    contract: Contract<SignedClient>,
}

impl EvmLedger {
    /// Connects to the contract at `contract_address` through `rpc_url`,
    /// signing as `wallet`.
    ///
    /// # Errors
    /// Returns `Transport` if the RPC url is invalid or the chain id cannot
    /// be read.
    pub async fn connect(
        rpc_url: &str,
        contract_address: Address,
        wallet: LocalWallet,
    ) -> Result<Self, LedgerError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| LedgerError::Transport(format!("invalid RPC url '{}': {}", rpc_url, e)))?;
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .as_u64();

        let client = Arc::new(SignerMiddleware::new(provider, wallet.with_chain_id(chain_id)));
        let contract = Contract::new(contract_address, credential_abi()?, client.clone());
        info!(
            "connected to credential contract {} on chain {} as {}",
            to_checksum(&contract_address, None),
            chain_id,
            to_checksum(&client.address(), None)
        );

        Ok(Self { client, contract })
    }

    fn caller(&self) -> String {
        to_checksum(&self.client.address(), None)
    }

    /// Maps a failed call to a ledger error, using the revert reason when
    /// there is one.
    fn classify(&self, err: ContractError<SignedClient>, token_id: Option<TokenId>) -> LedgerError {
        let Some(reason) = revert_reason(&err) else {
            return LedgerError::Transport(err.to_string());
        };
        match (RevertKind::from_reason(&reason), token_id) {
            (RevertKind::Unauthorized, _) => LedgerError::Unauthorized {
                caller: self.caller(),
            },
            (RevertKind::UnknownToken, Some(token_id)) => LedgerError::UnknownToken(token_id),
            _ => LedgerError::Rejected(reason),
        }
    }

    fn method<T, D>(&self, name: &str, args: T) -> Result<ContractCall<SignedClient, D>, LedgerError>
    where
        T: ethers::abi::Tokenize,
        D: ethers::abi::Detokenize,
    {
        self.contract
            .method::<T, D>(name, args)
            .map_err(|e| LedgerError::Contract(format!("{}: {}", name, e)))
    }

    /// Sends a simulated call and waits for its receipt.
    async fn submit(
        &self,
        call: ContractCall<SignedClient, ()>,
        token_id: TokenId,
    ) -> Result<TransactionReceipt, LedgerError> {
        let pending = call
            .send()
            .await
            .map_err(|e| self.classify(e, Some(token_id)))?;
        let receipt = pending
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .ok_or_else(|| {
                LedgerError::MissingConfirmation(format!("no receipt for token {}", token_id))
            })?;
        if receipt.status != Some(U64::from(1)) {
            return Err(LedgerError::Rejected(format!(
                "transaction {:?} reverted",
                receipt.transaction_hash
            )));
        }
        Ok(receipt)
    }
}

#[async_trait]
impl CredentialLedger for EvmLedger {
    async fn mint_credential(
        &self,
        owner: Address,
        did: &str,
        document_hash: &str,
        biometric_hash: H256,
        token_uri: &str,
    ) -> Result<TokenId, LedgerError> {
        let call = self.method::<_, TokenId>(
            "mintCredential",
            (
                owner,
                did.to_string(),
                document_hash.to_string(),
                biometric_hash,
                token_uri.to_string(),
            ),
        )?;
        call.call().await.map_err(|e| self.classify(e, None))?;

        let pending = call.send().await.map_err(|e| self.classify(e, None))?;
        debug!("mint for {} submitted as {:?}", did, pending.tx_hash());
        let receipt = pending
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .ok_or_else(|| LedgerError::MissingConfirmation(format!("no receipt for mint of {}", did)))?;

        let token_id = minted_token_id(&self.contract, self.contract.address(), &receipt)?;
        info!("minted credential token {} for {}", token_id, did);
        Ok(token_id)
    }

    async fn get_credential(&self, token_id: TokenId) -> Result<CredentialRecord, LedgerError> {
        let (did, document_hash, biometric_hash, code, reason): (String, String, H256, u8, String) = self
            .method("getCredential", token_id)?
            .call()
            .await
            .map_err(|e| self.classify(e, Some(token_id)))?;
        let owner: Address = self
            .method("ownerOf", token_id)?
            .call()
            .await
            .map_err(|e| self.classify(e, Some(token_id)))?;
        let token_uri = self.token_uri(token_id).await?;

        let status = CredentialStatus::from_code(code)
            .ok_or_else(|| LedgerError::Rejected(format!("unknown status code {}", code)))?;
        Ok(CredentialRecord {
            did,
            owner,
            document_hash,
            biometric_hash,
            status,
            revoke_reason: (!reason.is_empty()).then_some(reason),
            token_uri,
        })
    }

    async fn set_status(
        &self,
        token_id: TokenId,
        status: CredentialStatus,
        reason: &str,
    ) -> Result<(), LedgerError> {
        if !status.is_terminal() {
            return Err(LedgerError::InvalidTransition(status));
        }

        let call: ContractCall<SignedClient, ()> = match status {
            CredentialStatus::Revoked => {
                self.method("revokeCredential", (token_id, reason.to_string()))?
            }
            _ => self.method("setStatus", (token_id, status.code(), reason.to_string()))?,
        };

        if let Err(err) = call.call().await {
            if revert_reason(&err).map(|r| RevertKind::from_reason(&r)) == Some(RevertKind::AlreadyFinal) {
                let current = self.get_credential(token_id).await?;
                warn!("token {} is already {}", token_id, current.status);
                return Err(LedgerError::AlreadyFinal {
                    token_id,
                    status: current.status,
                    reason: current.revoke_reason.unwrap_or_default(),
                });
            }
            return Err(self.classify(err, Some(token_id)));
        }

        let receipt = self.submit(call, token_id).await?;
        info!(
            "token {} set to {} in {:?}",
            token_id, status, receipt.transaction_hash
        );
        Ok(())
    }

    async fn token_uri(&self, token_id: TokenId) -> Result<String, LedgerError> {
        self.method::<_, String>("tokenURI", token_id)?
            .call()
            .await
            .map_err(|e| self.classify(e, Some(token_id)))
    }
}
