use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::types::{ChallengeResponse, ValidateRequest, VerifyRequest};
use super::{
    AssertionPayload, AttestationPayload, ChallengeClient, VerifierClient, VerifierError,
    VerifierResult,
};
use crate::challenge::Challenge;

pub const CHALLENGE_PATH: &str = "/attest/challenge";
pub const VALIDATE_PATH: &str = "/attest/validate";
pub const VERIFY_PATH: &str = "/attest/verify";

/// Server certificate validation policy for the verifier channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrustPolicy {
    #[default]
    PlatformDefault,
    /// Accepts any server certificate. Only compiled with `insecure-trust`.
    #[cfg(feature = "insecure-trust")]
    AcceptAnyCertificate,
}

/// JSON-over-HTTPS verifier.
#[derive(Debug, Clone)]
pub struct HttpVerifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVerifier {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        trust: TrustPolicy,
    ) -> Result<Self, VerifierError> {
        let builder = reqwest::Client::builder().timeout(timeout);
        let builder = match trust {
            TrustPolicy::PlatformDefault => builder,
            #[cfg(feature = "insecure-trust")]
            TrustPolicy::AcceptAnyCertificate => {
                tracing::warn!("Verifier TLS certificate validation is DISABLED");
                builder.danger_accept_invalid_certs(true)
            }
        };
        let client = builder
            .build()
            .map_err(|e| VerifierError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, VerifierError> {
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| VerifierError::Transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| VerifierError::Decoding(e.to_string()))
    }

    /// Like `read_json`, but a non-2xx reply whose body carries an `error`
    /// is the verifier's verdict and is handed back as such.
    async fn read_verdict(response: reqwest::Response) -> Result<VerifierResult, VerifierError> {
        let status = response.status();
        if status.is_success() {
            return Self::read_json(response).await;
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| VerifierError::Transport(e.to_string()))?;
        match serde_json::from_slice::<VerifierResult>(&body) {
            Ok(verdict) if verdict.error.is_some() => {
                tracing::debug!(status = status.as_u16(), "Verifier rejected request");
                Ok(verdict)
            }
            _ => Err(status_error(status)),
        }
    }

    async fn post<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<VerifierResult, VerifierError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| VerifierError::Transport(e.to_string()))?;
        Self::read_verdict(response).await
    }
}

fn status_error(status: reqwest::StatusCode) -> VerifierError {
    VerifierError::Transport(format!(
        "HTTP {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown error")
    ))
}

#[async_trait]
impl ChallengeClient for HttpVerifier {
    async fn request_challenge(&self) -> Result<Challenge, VerifierError> {
        tracing::debug!(url = %self.url(CHALLENGE_PATH), "Requesting challenge");
        let response = self
            .client
            .get(self.url(CHALLENGE_PATH))
            .send()
            .await
            .map_err(|e| VerifierError::Transport(e.to_string()))?;
        let body: ChallengeResponse = Self::read_json(response).await?;
        Ok(Challenge::new(body.challenge))
    }
}

#[async_trait]
impl VerifierClient for HttpVerifier {
    async fn validate_attestation(
        &self,
        payload: &AttestationPayload,
    ) -> Result<VerifierResult, VerifierError> {
        tracing::debug!(key_id = %payload.key_id, "Submitting attestation");
        self.post(VALIDATE_PATH, &ValidateRequest::from(payload)).await
    }

    async fn verify_assertion(
        &self,
        payload: &AssertionPayload,
    ) -> Result<VerifierResult, VerifierError> {
        tracing::debug!(key_id = %payload.key_id, "Submitting assertion");
        self.post(VERIFY_PATH, &VerifyRequest::from(payload)).await
    }
}
