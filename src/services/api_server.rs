// src/services/api_server.rs
//! HTTP API for the athlete credential registry.
//!
//! The API is built using Axum and includes endpoints for:
//! - Athlete registration with base64-encoded documents
//! - Eligibility verification by DID
//! - Revoking or flagging a credential
//! - Retrying a failed credential mint
//! - Audit history and integrity checks
//! - Offline credential token checks

use crate::error::{LedgerError, RegistryError};
use crate::models::athlete::UploadedDocument;
use crate::services::audit_log::AuditLog;
use crate::services::credential_issuer::{CredentialAdmin, StatusChange};
use crate::services::registration::{Registrar, RegistrationRequest};
use crate::services::verifier::Verifier;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

// API request and response structures

/// A document upload inside a registration request
#[derive(Deserialize)]
struct EncodedDocument {
    file_name: String,
    /// Standard base64 of the file contents
    content_base64: String,
}

/// Request payload for registering an athlete.
///
/// Every field defaults so that missing ones surface as validation errors
/// rather than body rejections.
#[derive(Deserialize, Default)]
#[serde(default)]
struct RegisterAthleteRequest {
    name: String,
    dob: String,
    gender: Option<String>,
    school_id: String,
    sport: String,
    birth_certificate: Option<EncodedDocument>,
    selfie: Option<EncodedDocument>,
    consent: bool,
}

/// Response for a successful registration
#[derive(Serialize)]
struct RegisterAthleteResponse {
    athlete: crate::models::athlete::AthleteRecord,
    /// Signed credential (JWT)
    credential_token: String,
    /// Athlete's private key; returned exactly once
    signing_key: String,
}

/// Optional verification date, defaulting to today
#[derive(Deserialize)]
struct VerifyQuery {
    on: Option<NaiveDate>,
}

/// Request payload for checking a credential token
#[derive(Deserialize)]
struct CheckTokenRequest {
    token: String,
}

fn decode_document(
    field: &str,
    document: Option<EncodedDocument>,
) -> Result<Option<UploadedDocument>, RegistryError> {
    document
        .map(|doc| {
            let bytes = base64::decode(doc.content_base64.trim())
                .map_err(|_| RegistryError::Validation(format!("{} is not valid base64", field)))?;
            Ok(UploadedDocument {
                file_name: doc.file_name,
                bytes,
            })
        })
        .transpose()
}

impl RegisterAthleteRequest {
    fn into_registration(self) -> Result<RegistrationRequest, RegistryError> {
        Ok(RegistrationRequest {
            birth_certificate: decode_document("birth_certificate", self.birth_certificate)?,
            selfie: decode_document("selfie", self.selfie)?,
            name: self.name,
            dob: self.dob,
            gender: self.gender,
            school_id: self.school_id,
            sport: self.sport,
            consent: self.consent,
        })
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistryError::Validation(_) => StatusCode::BAD_REQUEST,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::Authorization(_) => StatusCode::FORBIDDEN,
            RegistryError::Conflict { .. } | RegistryError::Integrity(_) => StatusCode::CONFLICT,
            RegistryError::Ledger(
                LedgerError::AlreadyFinal { .. } | LedgerError::InvalidTransition(_) | LedgerError::NotMinted(_),
            ) => StatusCode::CONFLICT,
            RegistryError::Ledger(_) | RegistryError::Dependency { .. } => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            error!("request failed: {}", self);
        }

        let body = match &self {
            RegistryError::Conflict {
                matched_did,
                matched_name,
                score,
            } => json!({
                "message": "A biometric match was found with an existing athlete.",
                "matched": { "did": matched_did, "name": matched_name },
                "score": score,
            }),
            other => json!({ "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

/// Main API server structure holding the registry services
#[derive(Clone)]
pub struct ApiServer {
    registrar: Arc<Registrar>,
    verifier: Arc<Verifier>,
    admin: Arc<CredentialAdmin>,
    audit: Arc<AuditLog>,
}

impl ApiServer {
    /// Creates a new ApiServer over already-wired services
    pub fn new(
        registrar: Arc<Registrar>,
        verifier: Arc<Verifier>,
        admin: Arc<CredentialAdmin>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            registrar,
            verifier,
            admin,
            audit,
        }
    }

    /// Builds the route table with permissive CORS.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(Self::health_handler))
            .route("/api/register-athlete", post(Self::register_athlete_handler))
            .route("/api/verify/:did", get(Self::verify_handler))
            .route("/api/athletes/:did/status", post(Self::set_status_handler))
            .route("/api/athletes/:did/mint", post(Self::retry_mint_handler))
            .route("/api/logs/:did", get(Self::logs_handler))
            .route("/api/audit/:id/verify", get(Self::verify_audit_handler))
            .route("/api/verify-token", post(Self::check_token_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(self.clone()))
    }

    /// Binds `addr` and serves until the process stops.
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API listening on {}", addr);
        axum::serve(listener, self.router()).await
    }

    async fn health_handler() -> impl IntoResponse {
        Json(json!({ "message": "Age Verification System API is running!" }))
    }

    /// Handler for athlete registration
    ///
    /// # Responses
    /// - 201 with the athlete, credential token and signing key
    /// - 400 for missing fields or documents
    /// - 409 when the selfie matches an existing athlete
    async fn register_athlete_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<RegisterAthleteRequest>,
    ) -> Result<impl IntoResponse, RegistryError> {
        let request = payload.into_registration()?;
        let registration = state.registrar.register(request).await?;
        Ok((
            StatusCode::CREATED,
            Json(RegisterAthleteResponse {
                athlete: registration.athlete,
                credential_token: registration.credential_token,
                signing_key: registration.signing_key,
            }),
        ))
    }

    async fn verify_handler(
        State(state): State<Arc<ApiServer>>,
        Path(did): Path<String>,
        Query(query): Query<VerifyQuery>,
    ) -> Result<impl IntoResponse, RegistryError> {
        let on_date = query.on.unwrap_or_else(|| Utc::now().date_naive());
        let report = state.verifier.verify(&did, on_date).await?;
        Ok(Json(report))
    }

    /// Handler for revoking or flagging a credential
    async fn set_status_handler(
        State(state): State<Arc<ApiServer>>,
        Path(did): Path<String>,
        Json(change): Json<StatusChange>,
    ) -> Result<impl IntoResponse, RegistryError> {
        let athlete = state.admin.set_status(&did, change).await?;
        Ok(Json(athlete))
    }

    async fn retry_mint_handler(
        State(state): State<Arc<ApiServer>>,
        Path(did): Path<String>,
    ) -> Result<impl IntoResponse, RegistryError> {
        let athlete = state.registrar.retry_mint(&did).await?;
        Ok(Json(athlete))
    }

    async fn logs_handler(
        State(state): State<Arc<ApiServer>>,
        Path(did): Path<String>,
    ) -> Result<impl IntoResponse, RegistryError> {
        let history = state.audit.history(&did).await?;
        Ok(Json(history))
    }

    async fn verify_audit_handler(
        State(state): State<Arc<ApiServer>>,
        Path(id): Path<u64>,
    ) -> Result<impl IntoResponse, RegistryError> {
        let status = state.audit.verify(id).await?;
        Ok(Json(status))
    }

    async fn check_token_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CheckTokenRequest>,
    ) -> Result<impl IntoResponse, RegistryError> {
        let credential = state.verifier.check_token(&payload.token)?;
        Ok(Json(credential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn server(harness: &Harness) -> ApiServer {
        ApiServer::new(
            Arc::new(harness.registrar()),
            Arc::new(harness.verifier()),
            Arc::new(harness.admin()),
            harness.audit.clone(),
        )
    }

    async fn call(router: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn registration_body(name: &str, face: u8) -> Value {
        json!({
            "name": name,
            "dob": "2012-03-14",
            "school_id": "3",
            "sport": "Soccer",
            "consent": true,
            "birth_certificate": {
                "file_name": "birth.pdf",
                "content_base64": base64::encode(format!("certificate of {}", name)),
            },
            "selfie": {
                "file_name": "selfie.jpg",
                "content_base64": base64::encode(vec![face; 16]),
            },
        })
    }

    #[tokio::test]
    async fn health_check() {
        let harness = Harness::new();
        let (status, body) = call(server(&harness).router(), "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Age Verification System API is running!");
    }

    #[tokio::test]
    async fn register_verify_revoke_flow() {
        let harness = Harness::new();
        let router = server(&harness).router();

        let (status, body) = call(
            router.clone(),
            "POST",
            "/api/register-athlete",
            Some(registration_body("Tariro Moyo", 10)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let did = body["athlete"]["did"].as_str().unwrap().to_string();
        assert!(body["credential_token"].as_str().unwrap().split('.').count() == 3);
        assert!(body["signing_key"].as_str().unwrap().starts_with("0x"));
        assert_eq!(body["athlete"]["mint"]["state"], "minted");

        let (status, body) = call(router.clone(), "GET", &format!("/api/verify/{}?on=2026-06-01", did), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["age"], 14);
        assert_eq!(body["eligibility"]["result"], "eligible");

        let (status, _) = call(
            router.clone(),
            "POST",
            &format!("/api/athletes/{}/status", did),
            Some(json!({ "status": "Revoked", "reason": "forged document", "actor": "league-admin" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(router.clone(), "GET", &format!("/api/verify/{}?on=2026-06-01", did), None).await;
        assert_eq!(body["eligibility"]["result"], "revoked");
        assert_eq!(body["eligibility"]["reason"], "forged document");

        let (status, body) = call(
            router.clone(),
            "POST",
            &format!("/api/athletes/{}/status", did),
            Some(json!({ "status": "Revoked", "reason": "again", "actor": "league-admin" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["message"].as_str().unwrap().contains("forged document"));

        let (status, body) = call(router.clone(), "GET", &format!("/api/logs/{}", did), None).await;
        assert_eq!(status, StatusCode::OK);
        let first_id = body[0]["id"].as_u64().unwrap();

        let (status, body) = call(router, "GET", &format!("/api/audit/{}/verify", first_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], "valid");
    }

    #[tokio::test]
    async fn duplicate_face_is_conflict_without_embedding() {
        let harness = Harness::new();
        let router = server(&harness).router();
        call(router.clone(), "POST", "/api/register-athlete", Some(registration_body("Tariro Moyo", 10))).await;

        let (status, body) = call(
            router,
            "POST",
            "/api/register-athlete",
            Some(registration_body("Someone Else", 10)),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["matched"]["name"], "Tariro Moyo");
        assert!(body["score"].is_number());
        assert!(body.get("embedding").is_none());
    }

    #[tokio::test]
    async fn missing_fields_and_unknown_dids() {
        let harness = Harness::new();
        let router = server(&harness).router();

        let (status, _) = call(router.clone(), "POST", "/api/register-athlete", Some(json!({ "name": "Rudo" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut bad_base64 = registration_body("Rudo", 3);
        bad_base64["selfie"]["content_base64"] = json!("***");
        let (status, _) = call(router.clone(), "POST", "/api/register-athlete", Some(bad_base64)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(router.clone(), "GET", "/api/verify/did:ethr:0xnobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(router, "GET", "/api/audit/99/verify", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn token_check_endpoint() {
        let harness = Harness::new();
        let router = server(&harness).router();
        let (_, body) = call(router.clone(), "POST", "/api/register-athlete", Some(registration_body("Nyasha Dube", 20))).await;
        let token = body["credential_token"].as_str().unwrap().to_string();

        let (status, payload) = call(router.clone(), "POST", "/api/verify-token", Some(json!({ "token": token }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["vc"]["credentialSubject"]["schema"], "athlete-age/v1");

        let (status, _) = call(router, "POST", "/api/verify-token", Some(json!({ "token": "x.y.z" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
