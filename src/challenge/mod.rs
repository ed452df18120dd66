use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("empty challenge")]
    Empty,
}

/// Server-issued nonce. Valid for a single protocol round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge(String);

impl Challenge {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-256 over the UTF-8 bytes of the token.
    pub fn digest(&self) -> Result<ClientDataHash, ChallengeError> {
        if self.0.is_empty() {
            return Err(ChallengeError::Empty);
        }
        Ok(ClientDataHash(Sha256::digest(self.0.as_bytes()).into()))
    }
}

/// Fixed-size digest bound into attestation and assertion payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientDataHash([u8; 32]);

impl ClientDataHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }
}

impl From<[u8; 32]> for ClientDataHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}
