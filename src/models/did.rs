// src/models/did.rs
//! Decentralized Identifier (DID) model for athletes and the issuer.
//!
//! Identities use the `did:ethr` method: the method-specific id is the
//! checksummed secp256k1 address controlled by the identity's signing key.
//! That address doubles as the owner of the athlete's ledger credential.

use ethers::types::Address;
use ethers::utils::{hex, secret_key_to_address, to_checksum};
use k256::ecdsa::SigningKey;
use std::fmt;

/// Method prefix shared by every DID this system mints.
pub const DID_METHOD_PREFIX: &str = "did:ethr:";

/// Builds the DID for an address.
pub fn did_from_address(address: Address) -> String {
    format!("{}{}", DID_METHOD_PREFIX, to_checksum(&address, None))
}

/// Recovers the controlling address from a `did:ethr` DID.
///
/// Returns `None` for any other method or a malformed address.
pub fn address_from_did(did: &str) -> Option<Address> {
    let raw = did.strip_prefix(DID_METHOD_PREFIX)?;
    if raw.len() != 42 || !raw.starts_with("0x") {
        return None;
    }
    raw.parse::<Address>().ok()
}

/// A freshly generated athlete identity: DID plus the private key that
/// controls it.
///
/// Generated exactly once per registration and handed to the athlete; the
/// key is never written to the directory and never printed.
pub struct AthleteIdentity {
    /// `did:ethr:<address>`
    pub did: String,
    /// Address recovered from the signing key
    pub address: Address,
    signing_key: SigningKey,
}

impl AthleteIdentity {
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = secret_key_to_address(&signing_key);
        Self {
            did: did_from_address(address),
            address,
            signing_key,
        }
    }

    /// Hex-encoded private key (`0x`-prefixed) for one-time handover.
    pub fn export_signing_key(&self) -> String {
        format!("0x{}", hex::encode(self.signing_key.to_bytes()))
    }
}

impl fmt::Debug for AthleteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AthleteIdentity")
            .field("did", &self.did)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}
