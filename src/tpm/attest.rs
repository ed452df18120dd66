use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::authdata::{
    build_assertion_auth_data, build_assertion_object, build_attestation_object,
    build_attested_auth_data, encode_der_ecdsa,
};
use super::blob::{self, KeyBlob};
use super::{TpmContext, TpmError, counter, keys};
use crate::challenge::ClientDataHash;
use crate::config::AppId;
use crate::primitive::{AssertionBlob, AttestationBlob, KeyAttestation, KeyId, PrimitiveError};

/// `KeyAttestation` on a TPM 2.0. Key material is wrapped by the TPM's
/// owner primary and kept under `keys_dir`; the blobs are useless elsewhere.
pub struct TpmKeyAttestation {
    tpm: Option<TpmContext>,
    keys_dir: PathBuf,
    app_id_hash: [u8; 32],
}

impl TpmKeyAttestation {
    /// Probe the TPM. A device that cannot be opened makes this backend
    /// report itself unsupported rather than failing construction.
    pub fn probe(device: &str, nv_index: u32, keys_dir: PathBuf, app_id: &AppId) -> Self {
        let tpm = match std::fs::create_dir_all(&keys_dir)
            .map_err(|e| TpmError::Blob(e.to_string()))
            .and_then(|()| TpmContext::open(device, nv_index))
        {
            Ok(tpm) => {
                tracing::info!(device, "TPM context initialized");
                Some(tpm)
            }
            Err(e) => {
                tracing::warn!(device, error = %e, "TPM unavailable");
                None
            }
        };
        Self::with_context(tpm, keys_dir, app_id)
    }

    pub fn with_context(tpm: Option<TpmContext>, keys_dir: PathBuf, app_id: &AppId) -> Self {
        Self {
            tpm,
            keys_dir,
            app_id_hash: Sha256::digest(app_id.to_string().as_bytes()).into(),
        }
    }

    fn tpm(&self) -> Result<&TpmContext, PrimitiveError> {
        self.tpm.as_ref().ok_or(PrimitiveError::Unsupported)
    }
}

#[async_trait]
impl KeyAttestation for TpmKeyAttestation {
    fn is_supported(&self) -> bool {
        self.tpm.is_some()
    }

    async fn generate_key(&self) -> Result<KeyId, PrimitiveError> {
        let tpm = self.tpm()?;
        let (private, public) = tpm
            .run(|ctx, primary| keys::create_signing_key(ctx, primary))
            .await
            .map_err(|e| PrimitiveError::Attestation(e.to_string()))?;
        let key = KeyBlob { private, public };
        blob::write(&self.keys_dir, &key).map_err(|e| PrimitiveError::Attestation(e.to_string()))?;
        Ok(key.key_id())
    }

    async fn attest_key(
        &self,
        key_id: &KeyId,
        hash: &ClientDataHash,
    ) -> Result<AttestationBlob, PrimitiveError> {
        let tpm = self.tpm()?;
        let key = blob::read(&self.keys_dir, key_id)
            .map_err(|e| PrimitiveError::Attestation(e.to_string()))?
            .ok_or_else(|| PrimitiveError::Attestation(format!("unknown key {key_id}")))?;

        let app_id_hash = self.app_id_hash;
        let cdh = *hash.as_bytes();
        let encoded = tpm
            .run(move |ctx, primary| {
                let (x, y) = keys::ecc_public_coords(&key.public)?;
                let auth_data = build_attested_auth_data(&app_id_hash, &key.fingerprint(), &x, &y)?;
                let mut to_sign = auth_data.clone();
                to_sign.extend_from_slice(&cdh);
                let raw = keys::sign_with(ctx, primary, &key.private, &key.public, &to_sign)?;
                build_attestation_object(&auth_data, &encode_der_ecdsa(&raw))
            })
            .await
            .map_err(|e| PrimitiveError::Attestation(e.to_string()))?;
        Ok(AttestationBlob(encoded))
    }

    async fn generate_assertion(
        &self,
        key_id: &KeyId,
        hash: &ClientDataHash,
    ) -> Result<AssertionBlob, PrimitiveError> {
        let tpm = self.tpm()?;
        let key = blob::read(&self.keys_dir, key_id)
            .map_err(|e| PrimitiveError::Assertion(e.to_string()))?
            .ok_or_else(|| PrimitiveError::Assertion(format!("unknown key {key_id}")))?;

        let app_id_hash = self.app_id_hash;
        let cdh = *hash.as_bytes();
        let nv_index = tpm.nv_index();
        let encoded = tpm
            .run(move |ctx, primary| {
                let count = counter::increment_and_read(ctx, nv_index)?;
                tracing::debug!(count, "TPM counter incremented");
                let count = assertion_count(count)?;
                let auth_data = build_assertion_auth_data(&app_id_hash, count);
                let mut to_sign = auth_data.clone();
                to_sign.extend_from_slice(&cdh);
                let raw = keys::sign_with(ctx, primary, &key.private, &key.public, &to_sign)?;
                build_assertion_object(&auth_data, &encode_der_ecdsa(&raw))
            })
            .await
            .map_err(|e| PrimitiveError::Assertion(e.to_string()))?;
        Ok(AssertionBlob(encoded))
    }

    fn discard_key(&self, key_id: &KeyId) -> Result<(), PrimitiveError> {
        blob::remove(&self.keys_dir, key_id).map_err(|e| PrimitiveError::Assertion(e.to_string()))?;
        tracing::debug!(key_id = %key_id, "Key blob removed");
        Ok(())
    }
}

/// authData carries a 32-bit sign count; a wider NV counter is an error.
fn assertion_count(count: u64) -> Result<u32, TpmError> {
    u32::try_from(count)
        .map_err(|_| TpmError::Counter(format!("counter {count} exceeds the 32-bit sign count")))
}
