use std::path::{Path, PathBuf};

use super::{KeyRecord, StoreError, disk};

pub const RECORD_FILE: &str = "key_record.json";

/// Single-slot durable store for the active `KeyRecord`.
///
/// The file on disk is the source of truth; the in-memory copy is only
/// updated after a mutation has been persisted.
pub struct KeyStore {
    path: PathBuf,
    current: Option<KeyRecord>,
}

impl KeyStore {
    /// Open (creating if needed) the store rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(RECORD_FILE);
        let current = match disk::read_record(&path) {
            Ok(r) => r,
            Err(StoreError::Corrupt(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt key record");
                None
            }
            Err(e) => return Err(e),
        };
        Ok(Self { path, current })
    }

    pub fn load(&self) -> Option<KeyRecord> {
        self.current.clone()
    }

    /// Replace whatever record is stored with `record`.
    pub fn save(&mut self, record: KeyRecord) -> Result<(), StoreError> {
        disk::write_record(&self.path, &record)?;
        tracing::debug!(key_id = %record.id, count = record.count, "Key record saved");
        self.current = Some(record);
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        disk::delete_record(&self.path)?;
        self.current = None;
        tracing::debug!("Key record cleared");
        Ok(())
    }
}
