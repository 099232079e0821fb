// src/config.rs
//! Service configuration.
//!
//! Settings are layered: built-in defaults, then an optional `agetrust.toml`
//! next to the binary, then `AGETRUST__SECTION__KEY` environment variables
//! (a `.env` file is loaded into the environment first).

use config::{Config, ConfigError, Environment, File};
use ethers::types::Address;
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentStoreBackend {
    Ipfs,
    Memory,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Evm,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub bind_addr: SocketAddr,
}

/// Issuer identity. The key signs credential tokens and is the only caller
/// allowed to change a credential's status.
#[derive(Clone, Deserialize)]
pub struct IssuerSettings {
    pub private_key: String,
}

impl std::fmt::Debug for IssuerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerSettings")
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentStoreSettings {
    pub backend: ContentStoreBackend,
    pub api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BiometricSettings {
    pub service_url: String,
    /// Euclidean distance below which two embeddings are the same person
    pub match_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    pub backend: LedgerBackend,
    pub rpc_url: String,
    #[serde(default)]
    pub contract_address: Option<String>,
}

/// Age window, inclusive on both ends.
#[derive(Debug, Clone, Deserialize)]
pub struct EligibilitySettings {
    pub min_age: i32,
    pub max_age: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub issuer: IssuerSettings,
    pub content_store: ContentStoreSettings,
    pub biometrics: BiometricSettings,
    pub ledger: LedgerSettings,
    pub eligibility: EligibilitySettings,
}

impl Settings {
    /// Loads settings from defaults, `agetrust.toml` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("server.bind_addr", "127.0.0.1:3001")?
            .set_default("content_store.backend", "ipfs")?
            .set_default("content_store.api_url", "http://localhost:5001")?
            .set_default("biometrics.service_url", "http://localhost:5050")?
            .set_default("biometrics.match_threshold", 10.0)?
            .set_default("ledger.backend", "evm")?
            .set_default("ledger.rpc_url", "https://alfajores-forno.celo-testnet.org")?
            .set_default("eligibility.min_age", 5)?
            .set_default("eligibility.max_age", 18)?
            .add_source(File::with_name("agetrust").required(false))
            .add_source(Environment::with_prefix("AGETRUST").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.private_key.trim().is_empty() {
            return Err(ConfigError::Message("issuer.private_key must be set".into()));
        }
        if self.eligibility.min_age > self.eligibility.max_age {
            return Err(ConfigError::Message(format!(
                "eligibility.min_age ({}) exceeds eligibility.max_age ({})",
                self.eligibility.min_age, self.eligibility.max_age
            )));
        }
        if !(self.biometrics.match_threshold > 0.0) {
            return Err(ConfigError::Message("biometrics.match_threshold must be positive".into()));
        }
        if self.ledger.backend == LedgerBackend::Evm {
            let address = self.ledger.contract_address.as_deref().ok_or_else(|| {
                ConfigError::Message("ledger.contract_address is required for the evm backend".into())
            })?;
            address.parse::<Address>().map_err(|e| {
                ConfigError::Message(format!("ledger.contract_address is invalid: {}", e))
            })?;
        }
        Ok(())
    }
}
