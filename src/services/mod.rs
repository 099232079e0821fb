// src/services/mod.rs
pub mod api_server;
pub mod audit_log;
pub mod credential_issuer;
pub mod registration;
pub mod verifier;
