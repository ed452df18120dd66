//! Platform key-attestation capability.
//!
//! The hardware/OS layer that generates device-bound keys and signs over
//! client data hashes. The flow never inspects the blobs it returns.

use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::challenge::ClientDataHash;

#[derive(Debug, thiserror::Error)]
pub enum PrimitiveError {
    #[error("key attestation is not supported on this device")]
    Unsupported,
    #[error("attestation: {0}")]
    Attestation(String),
    #[error("assertion: {0}")]
    Assertion(String),
}

/// Opaque key identifier assigned by the primitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationBlob(pub Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionBlob(pub Vec<u8>);

impl AttestationBlob {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

impl AssertionBlob {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }
}

#[async_trait]
pub trait KeyAttestation: Send + Sync {
    /// Synchronous capability probe, no side effects.
    fn is_supported(&self) -> bool;

    /// Create a fresh device-bound key. Fails with `Unsupported` on devices
    /// without the capability.
    async fn generate_key(&self) -> Result<KeyId, PrimitiveError>;

    /// Bind `hash` to a key previously returned by `generate_key`.
    async fn attest_key(
        &self,
        key_id: &KeyId,
        hash: &ClientDataHash,
    ) -> Result<AttestationBlob, PrimitiveError>;

    /// Prove possession of an attested key over `hash`.
    async fn generate_assertion(
        &self,
        key_id: &KeyId,
        hash: &ClientDataHash,
    ) -> Result<AssertionBlob, PrimitiveError>;

    /// Drop any local material kept for `key_id`. Unknown keys are not an
    /// error.
    fn discard_key(&self, _key_id: &KeyId) -> Result<(), PrimitiveError> {
        Ok(())
    }
}

/// Stand-in for hosts without any attestation backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unavailable;

#[async_trait]
impl KeyAttestation for Unavailable {
    fn is_supported(&self) -> bool {
        false
    }

    async fn generate_key(&self) -> Result<KeyId, PrimitiveError> {
        Err(PrimitiveError::Unsupported)
    }

    async fn attest_key(
        &self,
        _key_id: &KeyId,
        _hash: &ClientDataHash,
    ) -> Result<AttestationBlob, PrimitiveError> {
        Err(PrimitiveError::Unsupported)
    }

    async fn generate_assertion(
        &self,
        _key_id: &KeyId,
        _hash: &ClientDataHash,
    ) -> Result<AssertionBlob, PrimitiveError> {
        Err(PrimitiveError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_rejects_everything() {
        let p = Unavailable;
        let id = KeyId::new("k");
        let hash = ClientDataHash::from([0u8; 32]);
        assert!(!p.is_supported());
        assert!(matches!(p.generate_key().await, Err(PrimitiveError::Unsupported)));
        assert!(matches!(p.attest_key(&id, &hash).await, Err(PrimitiveError::Unsupported)));
        assert!(matches!(
            p.generate_assertion(&id, &hash).await,
            Err(PrimitiveError::Unsupported)
        ));
    }

    #[test]
    fn test_key_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&KeyId::new("abc123")).unwrap();
        assert_eq!(json, "\"abc123\"");
    }
}
