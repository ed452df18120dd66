use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use super::TpmError;
use crate::primitive::KeyId;

/// TPM-wrapped key material. Useless outside the TPM that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBlob {
    pub private: Vec<u8>,
    pub public: Vec<u8>,
}

impl KeyBlob {
    /// SHA-256 of the marshalled public area.
    pub fn fingerprint(&self) -> [u8; 32] {
        Sha256::digest(&self.public).into()
    }

    pub fn key_id(&self) -> KeyId {
        KeyId::new(STANDARD.encode(self.fingerprint()))
    }

    /// `be32(private_len) || private || public`
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.private.len() + self.public.len());
        out.extend_from_slice(&(self.private.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.private);
        out.extend_from_slice(&self.public);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TpmError> {
        let (len, rest) = bytes
            .split_first_chunk::<4>()
            .ok_or_else(|| TpmError::Blob("truncated header".into()))?;
        let private_len = u32::from_be_bytes(*len) as usize;
        if rest.len() < private_len {
            return Err(TpmError::Blob("private section truncated".into()));
        }
        let (private, public) = rest.split_at(private_len);
        if public.is_empty() {
            return Err(TpmError::Blob("public section missing".into()));
        }
        Ok(Self {
            private: private.to_vec(),
            public: public.to_vec(),
        })
    }
}

fn blob_path(dir: &Path, fingerprint: &[u8; 32]) -> PathBuf {
    let hex: String = fingerprint.iter().map(|b| format!("{b:02x}")).collect();
    dir.join(format!("{hex}.blob"))
}

pub fn write(dir: &Path, blob: &KeyBlob) -> Result<(), TpmError> {
    let path = blob_path(dir, &blob.fingerprint());
    std::fs::write(&path, blob.encode()).map_err(|e| TpmError::Blob(e.to_string()))
}

fn fingerprint_of(key_id: &KeyId) -> Option<[u8; 32]> {
    let raw = STANDARD.decode(key_id.as_str()).ok()?;
    <[u8; 32]>::try_from(raw.as_slice()).ok()
}

/// Look up the blob for `key_id`. `Ok(None)` when this TPM never created it.
pub fn read(dir: &Path, key_id: &KeyId) -> Result<Option<KeyBlob>, TpmError> {
    let Some(fingerprint) = fingerprint_of(key_id) else {
        return Ok(None);
    };
    let bytes = match std::fs::read(blob_path(dir, &fingerprint)) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(TpmError::Blob(e.to_string())),
    };
    let blob = KeyBlob::decode(&bytes)?;
    if blob.fingerprint() != fingerprint {
        return Err(TpmError::Blob("public area does not match key id".into()));
    }
    Ok(Some(blob))
}

/// Delete the blob for `key_id`. Missing blobs are fine.
pub fn remove(dir: &Path, key_id: &KeyId) -> Result<(), TpmError> {
    let Some(fingerprint) = fingerprint_of(key_id) else {
        return Ok(());
    };
    match std::fs::remove_file(blob_path(dir, &fingerprint)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TpmError::Blob(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KeyBlob {
        KeyBlob { private: vec![1; 10], public: vec![2; 20] }
    }

    #[test]
    fn test_encode_layout() {
        let enc = sample().encode();
        assert_eq!(&enc[..4], &10u32.to_be_bytes());
        assert_eq!(enc.len(), 34);
        assert_eq!(KeyBlob::decode(&enc).unwrap(), sample());
    }

    #[test]
    fn test_decode_rejects_truncation() {
        assert!(KeyBlob::decode(&[0, 0]).is_err());
        assert!(KeyBlob::decode(&[0, 0, 0, 9, 1, 2]).is_err());
        assert!(KeyBlob::decode(&[0, 0, 0, 2, 1, 2]).is_err());
    }

    #[test]
    fn test_read_by_key_id() {
        let dir = tempfile::tempdir().unwrap();
        let blob = sample();
        write(dir.path(), &blob).unwrap();
        assert_eq!(read(dir.path(), &blob.key_id()).unwrap(), Some(blob));
        assert_eq!(read(dir.path(), &KeyId::new("not-base64!")).unwrap(), None);
        assert_eq!(read(dir.path(), &KeyId::new(STANDARD.encode([0u8; 32]))).unwrap(), None);
    }

    #[test]
    fn test_remove_blob() {
        let dir = tempfile::tempdir().unwrap();
        let blob = sample();
        write(dir.path(), &blob).unwrap();
        remove(dir.path(), &blob.key_id()).unwrap();
        assert_eq!(read(dir.path(), &blob.key_id()).unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        // Already gone, or never a blob id
        remove(dir.path(), &blob.key_id()).unwrap();
        remove(dir.path(), &KeyId::new("not-base64!")).unwrap();
    }
}
