use serde::{Deserialize, Serialize};

use crate::challenge::{Challenge, ClientDataHash};
use crate::config::AppId;
use crate::primitive::{AssertionBlob, AttestationBlob, KeyId};

/// Submitted once, to validate a freshly generated key.
#[derive(Debug, Clone)]
pub struct AttestationPayload {
    pub blob: AttestationBlob,
    pub key_id: KeyId,
    pub digest: ClientDataHash,
    pub app_id: AppId,
    pub principal: String,
}

/// Submitted on every assert.
#[derive(Debug, Clone)]
pub struct AssertionPayload {
    pub blob: AssertionBlob,
    pub key_id: KeyId,
    pub digest: ClientDataHash,
    pub app_id: AppId,
    pub challenge: Challenge,
}

/// Response of `/attest/validate` and `/attest/verify`. Both fields absent
/// counts as a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifierResult {
    pub fn ok(result: impl Into<String>) -> Self {
        Self { result: Some(result.into()), error: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { result: None, error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub challenge: String,
}

// Wire bodies. Binary fields are standard base64.

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub attestation: String,
    pub key_id: String,
    pub client_data_hash: String,
    pub app_id: String,
    pub user_id: String,
}

impl From<&AttestationPayload> for ValidateRequest {
    fn from(p: &AttestationPayload) -> Self {
        Self {
            attestation: p.blob.to_base64(),
            key_id: p.key_id.to_string(),
            client_data_hash: p.digest.to_base64(),
            app_id: p.app_id.to_string(),
            user_id: p.principal.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub assertion: String,
    pub key_id: String,
    pub client_data_hash: String,
    pub app_id: String,
    pub challenge: String,
}

impl From<&AssertionPayload> for VerifyRequest {
    fn from(p: &AssertionPayload) -> Self {
        Self {
            assertion: p.blob.to_base64(),
            key_id: p.key_id.to_string(),
            client_data_hash: p.digest.to_base64(),
            app_id: p.app_id.to_string(),
            challenge: p.challenge.as_str().to_string(),
        }
    }
}
