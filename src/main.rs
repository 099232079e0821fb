// src/main.rs

//! # AgeTrust - Main Entry Point
//!
//! Wires the athlete credential registry together and starts the API server.
//!
//! ## Architecture Overview
//! 1. **Ledger Layer**: `EvmLedger` for the `AthleteCredential` contract, or an in-process ledger
//! 2. **Storage Layer**: IPFS (or in-memory) content store and the athlete/audit directory
//! 3. **Biometrics Layer**: face-service client and the duplicate identity gate
//! 4. **Services Layer**: registration, verification, credential administration, audit, HTTP API
//!
//! ## Configuration
//! See [`config::Settings`]; every key can be set through `AGETRUST__SECTION__KEY`
//! environment variables or an `agetrust.toml` file.

use crate::biometrics::face_client::FaceServiceClient;
use crate::blockchain::evm_client::EvmLedger;
use crate::blockchain::memory::MemoryLedger;
use crate::blockchain::CredentialLedger;
use crate::config::{ContentStoreBackend, LedgerBackend, Settings};
use crate::services::api_server::ApiServer;
use crate::services::audit_log::AuditLog;
use crate::services::credential_issuer::CredentialAdmin;
use crate::services::registration::Registrar;
use crate::services::verifier::Verifier;
use crate::storage::directory::MemoryDirectory;
use crate::storage::ipfs_client::IpfsStorage;
use crate::storage::memory::MemoryContentStore;
use crate::storage::ContentStore;
use crate::wallet::key_management::IssuerSigner;
use anyhow::Context;
use dotenv::dotenv;
use ethers::types::Address;
use log::{info, warn};
use std::sync::Arc;

// Module declarations (organized by functional domain)
mod biometrics; // Face service gateway and duplicate gate
mod blockchain; // Credential ledger
mod config; // Layered settings
mod error; // Error taxonomy
mod models; // Data structures
mod services; // Business logic and API
mod storage; // Content store and directory
mod utils; // Hashing and canonical JSON
mod wallet; // Issuer and athlete keys

#[cfg(test)]
mod testing;

async fn connect_ledger(settings: &Settings, issuer: &IssuerSigner) -> anyhow::Result<Arc<dyn CredentialLedger>> {
    match settings.ledger.backend {
        LedgerBackend::Evm => {
            let contract: Address = settings
                .ledger
                .contract_address
                .as_deref()
                .context("ledger.contract_address is not set")?
                .parse()
                .context("ledger.contract_address is not an address")?;
            let ledger = EvmLedger::connect(&settings.ledger.rpc_url, contract, issuer.wallet())
                .await
                .context("failed to connect to the credential contract")?;
            Ok(Arc::new(ledger))
        }
        LedgerBackend::Memory => {
            warn!("using the in-memory ledger; credentials are lost on exit");
            Ok(Arc::new(MemoryLedger::new(issuer.address)))
        }
    }
}

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load `.env` and settings
/// 2. Load the issuer key and connect collaborators
/// 3. Build the services
/// 4. Start the API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("invalid configuration")?;
    let issuer = Arc::new(IssuerSigner::from_hex(&settings.issuer.private_key).context("invalid issuer key")?);
    info!("issuer {}", issuer.did);

    let store: Arc<dyn ContentStore> = match settings.content_store.backend {
        ContentStoreBackend::Ipfs => Arc::new(IpfsStorage::new(&settings.content_store.api_url)?),
        ContentStoreBackend::Memory => {
            warn!("using the in-memory content store; documents are lost on exit");
            Arc::new(MemoryContentStore::new())
        }
    };
    let gateway = Arc::new(FaceServiceClient::new(&settings.biometrics.service_url));
    let directory = Arc::new(MemoryDirectory::new());
    let ledger = connect_ledger(&settings, &issuer).await?;
    let audit = Arc::new(AuditLog::new(directory.clone(), store.clone()));

    let registrar = Registrar::new(
        store,
        gateway,
        directory.clone(),
        ledger.clone(),
        issuer.clone(),
        audit.clone(),
        settings.biometrics.match_threshold,
    );
    let verifier = Verifier::new(
        directory.clone(),
        ledger.clone(),
        audit.clone(),
        issuer.verifying_key(),
        settings.eligibility.min_age,
        settings.eligibility.max_age,
    );
    let admin = CredentialAdmin::new(directory, ledger, audit.clone());

    let api_server = ApiServer::new(Arc::new(registrar), Arc::new(verifier), Arc::new(admin), audit);
    api_server
        .run(settings.server.bind_addr)
        .await
        .context("API server stopped")
}
