//! Enroll / assert orchestration over the primitive, the verifier and the
//! key store.
//!
//! The flow is the only writer of the `KeyStore`. At most one operation runs
//! at a time: a second caller gets `Error::Busy` instead of waiting.

pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

pub use state::FlowState;

use crate::challenge::ClientDataHash;
use crate::config::AppId;
use crate::error::{Error, Result};
use crate::primitive::{KeyAttestation, KeyId};
use crate::store::{KeyRecord, KeyStore};
use crate::verifier::{
    AssertionPayload, AttestationPayload, ChallengeClient, VerifierClient, VerifierResult,
};

pub struct AttestationFlow<P, V> {
    primitive: P,
    verifier: V,
    store: Mutex<KeyStore>,
    state: Mutex<FlowState>,
    busy: AtomicBool,
    app_id: AppId,
    principal: String,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<P, V> AttestationFlow<P, V>
where
    P: KeyAttestation,
    V: ChallengeClient + VerifierClient,
{
    pub fn new(
        primitive: P,
        verifier: V,
        store: KeyStore,
        app_id: AppId,
        principal: impl Into<String>,
    ) -> Self {
        let state = FlowState::initial(store.load().is_some());
        tracing::debug!(%state, "Attestation flow ready");
        Self {
            primitive,
            verifier,
            store: Mutex::new(store),
            state: Mutex::new(state),
            busy: AtomicBool::new(false),
            app_id,
            principal: principal.into(),
        }
    }

    pub fn state(&self) -> FlowState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn key_record(&self) -> Option<KeyRecord> {
        self.store().load()
    }

    /// Generate a key, attest it and persist it once the verifier echoes
    /// back its identifier.
    pub async fn enroll(&self) -> Result<KeyRecord> {
        let _busy = self.begin()?;
        self.require_supported()?;
        if self.store().load().is_some() {
            return Err(Error::AlreadyEnrolled);
        }

        self.set_state(FlowState::Enrolling);
        let outcome = self.run_enroll().await;
        match &outcome {
            Ok(record) => {
                tracing::info!(key_id = %record.id, "Key enrolled");
                self.set_state(FlowState::HasKey);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Enrollment failed");
                self.set_state(FlowState::NoKey);
            }
        }
        outcome
    }

    /// Prove possession of the enrolled key. On success the stored counter
    /// becomes whatever the verifier reports.
    pub async fn assert(&self) -> Result<KeyRecord> {
        let _busy = self.begin()?;
        self.require_supported()?;
        let record = self.store().load().ok_or(Error::MissingKey)?;

        self.set_state(FlowState::Asserting);
        let outcome = self.run_assert(&record).await;
        match &outcome {
            Ok(updated) => {
                tracing::info!(key_id = %updated.id, count = updated.count, "Assertion verified");
            }
            Err(e) => tracing::warn!(key_id = %record.id, error = %e, "Assertion failed"),
        }
        self.set_state(FlowState::HasKey);
        outcome
    }

    /// Forget the enrolled key locally. The verifier is not told.
    pub fn clear(&self) -> Result<()> {
        let _busy = self.begin()?;
        let previous = self.store().load();
        self.store().clear()?;
        self.set_state(FlowState::NoKey);
        if let Some(record) = previous {
            self.discard(&record.id);
        }
        tracing::info!("Key cleared");
        Ok(())
    }

    async fn run_enroll(&self) -> Result<KeyRecord> {
        let challenge = self.verifier.request_challenge().await?;
        let digest = challenge.digest()?;

        let key_id = self.primitive.generate_key().await?;
        tracing::debug!(key_id = %key_id, "Key generated");
        let enrolled = self.attest_and_save(key_id.clone(), digest).await;
        if enrolled.is_err() {
            self.discard(&key_id);
        }
        enrolled
    }

    async fn attest_and_save(&self, key_id: KeyId, digest: ClientDataHash) -> Result<KeyRecord> {
        let blob = self.primitive.attest_key(&key_id, &digest).await?;

        let payload = AttestationPayload {
            blob,
            key_id,
            digest,
            app_id: self.app_id.clone(),
            principal: self.principal.clone(),
        };
        let response = self.verifier.validate_attestation(&payload).await?;
        check_binding(&payload.key_id, response)?;

        let record = KeyRecord::enrolled(payload.key_id);
        self.store().save(record.clone())?;
        Ok(record)
    }

    async fn run_assert(&self, record: &KeyRecord) -> Result<KeyRecord> {
        let challenge = self.verifier.request_challenge().await?;
        let digest = challenge.digest()?;

        let blob = self.primitive.generate_assertion(&record.id, &digest).await?;
        let payload = AssertionPayload {
            blob,
            key_id: record.id.clone(),
            digest,
            app_id: self.app_id.clone(),
            challenge,
        };
        let response = self.verifier.verify_assertion(&payload).await?;
        let count = parse_counter(response)?;
        if count <= record.count {
            tracing::warn!(previous = record.count, count, "Verifier counter did not advance");
        }

        let updated = KeyRecord { id: record.id.clone(), count };
        self.store().save(updated.clone())?;
        Ok(updated)
    }

    fn begin(&self) -> Result<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;
        Ok(BusyGuard(&self.busy))
    }

    fn discard(&self, key_id: &KeyId) {
        if let Err(e) = self.primitive.discard_key(key_id) {
            tracing::warn!(key_id = %key_id, error = %e, "Failed to discard key material");
        }
    }

    fn require_supported(&self) -> Result<()> {
        if self.primitive.is_supported() {
            Ok(())
        } else {
            tracing::warn!("Key attestation unsupported on this device");
            Err(Error::UnsupportedDevice)
        }
    }

    fn store(&self) -> MutexGuard<'_, KeyStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: FlowState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        tracing::debug!(from = %*state, to = %next, "State transition");
        *state = next;
    }
}

/// The verifier must echo the exact key identifier it validated.
fn check_binding(key_id: &KeyId, response: VerifierResult) -> Result<()> {
    if let Some(error) = response.error {
        return Err(Error::Server(error));
    }
    match response.result {
        Some(echo) if echo == key_id.as_str() => Ok(()),
        Some(echo) => Err(Error::Server(format!(
            "verifier validated key {echo:?}, expected {key_id:?}",
            key_id = key_id.as_str()
        ))),
        None => Err(Error::Server("empty verifier response".into())),
    }
}

fn parse_counter(response: VerifierResult) -> Result<u64> {
    if let Some(error) = response.error {
        return Err(Error::Server(error));
    }
    let raw = response
        .result
        .ok_or_else(|| Error::Server("verifier returned no usage counter".into()))?;
    raw.trim()
        .parse::<u64>()
        .map_err(|_| Error::Server(format!("unparsable usage counter {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_requires_exact_echo() {
        let id = KeyId::new("abc123");
        assert!(check_binding(&id, VerifierResult::ok("abc123")).is_ok());
        assert!(matches!(
            check_binding(&id, VerifierResult::ok("ABC123")),
            Err(Error::Server(_))
        ));
        assert!(matches!(
            check_binding(&id, VerifierResult::ok("abc123 ")),
            Err(Error::Server(_))
        ));
        assert!(matches!(
            check_binding(&id, VerifierResult::default()),
            Err(Error::Server(_))
        ));
    }

    #[test]
    fn test_binding_error_wins_over_result() {
        let id = KeyId::new("abc123");
        let resp = VerifierResult {
            result: Some("abc123".into()),
            error: Some("revoked".into()),
        };
        match check_binding(&id, resp) {
            Err(Error::Server(m)) => assert_eq!(m, "revoked"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_counter() {
        assert_eq!(parse_counter(VerifierResult::ok("7")).unwrap(), 7);
        assert!(matches!(parse_counter(VerifierResult::ok("-1")), Err(Error::Server(_))));
        assert!(matches!(parse_counter(VerifierResult::ok("seven")), Err(Error::Server(_))));
        assert!(matches!(parse_counter(VerifierResult::default()), Err(Error::Server(_))));
        match parse_counter(VerifierResult::err("stale challenge")) {
            Err(Error::Server(m)) => assert_eq!(m, "stale challenge"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_initial_state() {
        assert_eq!(FlowState::initial(true), FlowState::HasKey);
        assert_eq!(FlowState::initial(false), FlowState::NoKey);
        assert!(FlowState::Enrolling.is_busy());
        assert!(!FlowState::HasKey.is_busy());
    }
}
