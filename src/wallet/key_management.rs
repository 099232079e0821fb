// src/wallet/key_management.rs
//! Key management for the issuer and for newly registered athletes.
//!
//! Uses the following cryptographic primitives:
//! - secp256k1 curve (via `k256` crate)
//! - ES256K JWS signatures (ECDSA over SHA-256, 64-byte `r || s`)
//! - Keccak-256 address derivation (via `ethers` crate)

use crate::error::SigningError;
use crate::models::credential::CredentialClaims;
use crate::models::did::{did_from_address, AthleteIdentity};
use chrono::{DateTime, Utc};
use ethers::signers::LocalWallet;
use ethers::utils::{hex, secret_key_to_address};
use ethers::types::Address;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

const JWT_HEADER: &str = r#"{"alg":"ES256K","typ":"JWT"}"#;
const VC_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

/// `vc` claim of a credential token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VerifiableCredentialBody {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    #[serde(rename = "credentialSubject")]
    pub credential_subject: CredentialClaims,
}

/// Decoded payload of a credential token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CredentialPayload {
    pub iss: String,
    pub sub: String,
    pub nbf: i64,
    pub iat: i64,
    pub vc: VerifiableCredentialBody,
}

/// Generates a fresh athlete identity from the system RNG.
pub fn generate_identity() -> AthleteIdentity {
    AthleteIdentity::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
}

/// The credential issuer's signing identity.
///
/// One key serves both roles: it signs credential tokens and it is the
/// ledger account allowed to mint and change credential status.
#[derive(Clone)]
pub struct IssuerSigner {
    signing_key: SigningKey,
    /// Ledger address of the issuer
    pub address: Address,
    /// `did:ethr` form of `address`, used as the token `iss`
    pub did: String,
}

impl IssuerSigner {
    /// Loads the issuer from a hex private key (with or without `0x`).
    ///
    /// # Errors
    /// Returns `InvalidKey` if the string is not hex or not a valid
    /// secp256k1 scalar. The key itself never appears in the error.
    pub fn from_hex(private_key: &str) -> Result<Self, SigningError> {
        let raw = private_key.trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = hex::decode(raw).map_err(|_| SigningError::InvalidKey("not hex".into()))?;
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|_| SigningError::InvalidKey("not a secp256k1 secret key".into()))?;
        Ok(Self::from_signing_key(signing_key))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = secret_key_to_address(&signing_key);
        Self {
            signing_key,
            address,
            did: did_from_address(address),
        }
    }

    /// Wallet for submitting ledger transactions as the issuer.
    pub fn wallet(&self) -> LocalWallet {
        LocalWallet::from(self.signing_key.clone())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }

    /// Signs `claims` about `subject_did` into a compact ES256K JWT.
    ///
    /// # Arguments
    /// * `subject_did` - DID the credential is about (`sub`)
    /// * `claims` - Versioned claim set, embedded as `vc.credentialSubject`
    /// * `issued_at` - Issuance instant (`iat` and `nbf`)
    ///
    /// # Errors
    /// Returns `InvalidClaims` if the claim set fails validation; nothing is
    /// signed in that case.
    pub fn issue_token(
        &self,
        subject_did: &str,
        claims: &CredentialClaims,
        issued_at: DateTime<Utc>,
    ) -> Result<String, SigningError> {
        claims.validate(subject_did).map_err(SigningError::InvalidClaims)?;

        let payload = CredentialPayload {
            iss: self.did.clone(),
            sub: subject_did.to_string(),
            nbf: issued_at.timestamp(),
            iat: issued_at.timestamp(),
            vc: VerifiableCredentialBody {
                context: vec![VC_CONTEXT.to_string()],
                types: vec!["VerifiableCredential".into(), "SportsCredential".into()],
                credential_subject: claims.clone(),
            },
        };

        let signing_input = format!(
            "{}.{}",
            encode_segment(JWT_HEADER.as_bytes()),
            encode_segment(&serde_json::to_vec(&payload)?)
        );
        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        Ok(format!("{}.{}", signing_input, encode_segment(&signature.to_bytes())))
    }
}

impl std::fmt::Debug for IssuerSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerSigner")
            .field("did", &self.did)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

/// Checks a token's ES256K signature against `key` and decodes its payload.
pub fn verify_token(token: &str, key: &VerifyingKey) -> Result<CredentialPayload, SigningError> {
    let mut parts = token.split('.');
    let (header, payload, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) => (h, p, s),
        _ => return Err(SigningError::MalformedToken("expected three segments".into())),
    };

    let header_json: serde_json::Value = serde_json::from_slice(&decode_segment(header)?)?;
    if header_json["alg"] != "ES256K" {
        return Err(SigningError::MalformedToken(format!("unsupported alg {}", header_json["alg"])));
    }

    let signature = Signature::from_slice(&decode_segment(signature)?)
        .map_err(|_| SigningError::MalformedToken("signature is not 64 bytes".into()))?;
    key.verify(format!("{}.{}", header, payload).as_bytes(), &signature)
        .map_err(|_| SigningError::BadSignature)?;

    Ok(serde_json::from_slice(&decode_segment(payload)?)?)
}

fn encode_segment(bytes: &[u8]) -> String {
    base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, SigningError> {
    base64::decode_config(segment, base64::URL_SAFE_NO_PAD)
        .map_err(|e| SigningError::MalformedToken(e.to_string()))
}
