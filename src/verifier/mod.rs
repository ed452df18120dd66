pub mod http;
pub mod types;

use async_trait::async_trait;

use crate::challenge::Challenge;

pub use http::{HttpVerifier, TrustPolicy};
pub use types::{AssertionPayload, AttestationPayload, VerifierResult};

#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("decoding: {0}")]
    Decoding(String),
}

#[async_trait]
pub trait ChallengeClient: Send + Sync {
    async fn request_challenge(&self) -> Result<Challenge, VerifierError>;
}

/// Remote verifier. Each call is a single request/response exchange; callers
/// never retry.
#[async_trait]
pub trait VerifierClient: Send + Sync {
    async fn validate_attestation(
        &self,
        payload: &AttestationPayload,
    ) -> Result<VerifierResult, VerifierError>;

    async fn verify_assertion(
        &self,
        payload: &AssertionPayload,
    ) -> Result<VerifierResult, VerifierError>;
}
