use serde::{Deserialize, Serialize};

use crate::primitive::KeyId;

/// The device's single attested key and its server-reported usage count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub id: KeyId,
    pub count: u64,
}

impl KeyRecord {
    /// Record for a key that has just passed attestation.
    pub fn enrolled(id: KeyId) -> Self {
        Self { id, count: 0 }
    }
}
