// src/biometrics/face_client.rs
//! HTTP client for the face embedding service.
//!
//! The service exposes two endpoints:
//! - `POST /extract-embedding` (multipart field `image`) → `{"embedding": [..]}`
//! - `POST /compare-embedding` (JSON) → `{"match", "best_score", "best_idx"}`
//!
//! Failures carry the service's message or the transport error, never the
//! image or the embedding.

use crate::biometrics::{BiometricGateway, Comparison};
use crate::error::BiometricError;
use async_trait::async_trait;
use log::debug;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct ExtractResponse {
    embedding: Option<Vec<f32>>,
    error: Option<String>,
}

#[derive(Serialize)]
struct CompareRequest<'a> {
    new_embedding: &'a [f32],
    existing_embeddings: &'a [Vec<f32>],
    threshold: f64,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone)]
pub struct FaceServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl FaceServiceClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn rejection(response: reqwest::Response) -> BiometricError {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => BiometricError::Rejected(format!("{}: {}", status, body.error)),
            Err(_) => BiometricError::Rejected(status.to_string()),
        }
    }
}

#[async_trait]
impl BiometricGateway for FaceServiceClient {
    async fn extract_embedding(&self, image: &[u8]) -> Result<Vec<f32>, BiometricError> {
        let form = Form::new().part("image", Part::bytes(image.to_vec()).file_name("selfie"));
        let response = self
            .http
            .post(self.endpoint("extract-embedding"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let body: ExtractResponse = response.json().await?;
        match (body.embedding, body.error) {
            (Some(embedding), _) if !embedding.is_empty() => {
                debug!("extracted embedding of dimension {}", embedding.len());
                Ok(embedding)
            }
            (_, Some(error)) => Err(BiometricError::Rejected(error)),
            _ => Err(BiometricError::Malformed("no embedding in response".into())),
        }
    }

    async fn compare_embedding(
        &self,
        candidate: &[f32],
        existing: &[Vec<f32>],
        threshold: f64,
    ) -> Result<Comparison, BiometricError> {
        let request = CompareRequest {
            new_embedding: candidate,
            existing_embeddings: existing,
            threshold,
        };
        let response = self
            .http
            .post(self.endpoint("compare-embedding"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }
        Ok(response.json::<Comparison>().await?)
    }
}
