use crate::challenge::ChallengeError;
use crate::primitive::PrimitiveError;
use crate::store::StoreError;
use crate::verifier::VerifierError;

/// Outcome of a failed enroll, assert or clear. Persisted state is left as it
/// was before the attempt.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("this device does not support key attestation")]
    UnsupportedDevice,
    #[error("network error: {0}")]
    Transport(String),
    #[error("malformed verifier response: {0}")]
    Decoding(String),
    #[error("invalid challenge: {0}")]
    InvalidChallenge(String),
    #[error("no enrolled key; enroll first")]
    MissingKey,
    #[error("verifier rejected the request: {0}")]
    Server(String),
    #[error("key attestation failed: {0}")]
    Attestation(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
    #[error("a key is already enrolled; clear it first")]
    AlreadyEnrolled,
    #[error("another operation is in progress")]
    Busy,
    #[error("Store: {0}")]
    Store(#[from] StoreError),
}

impl From<VerifierError> for Error {
    fn from(e: VerifierError) -> Self {
        match e {
            VerifierError::Transport(m) => Error::Transport(m),
            VerifierError::Decoding(m) => Error::Decoding(m),
        }
    }
}

impl From<PrimitiveError> for Error {
    fn from(e: PrimitiveError) -> Self {
        match e {
            PrimitiveError::Unsupported => Error::UnsupportedDevice,
            PrimitiveError::Attestation(m) => Error::Attestation(m),
            PrimitiveError::Assertion(m) => Error::Assertion(m),
        }
    }
}

impl From<ChallengeError> for Error {
    fn from(e: ChallengeError) -> Self {
        Error::InvalidChallenge(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
