use std::io::Write;
use std::path::Path;

use super::{KeyRecord, StoreError};

/// Serialize `record` to `path`. The bytes go to a temp file in the same
/// directory which is then renamed over `path`.
pub(crate) fn write_record(path: &Path, record: &KeyRecord) -> Result<(), StoreError> {
    let buf = serde_json::to_vec(record).map_err(|e| StoreError::Serialization(e.to_string()))?;

    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Corrupt(format!("no parent dir for {}", path.display())))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&buf)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

/// Read + deserialize the record at `path`. `Ok(None)` if the file is absent.
pub(crate) fn read_record(path: &Path) -> Result<Option<KeyRecord>, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let record: KeyRecord = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok(Some(record))
}

/// Delete the record file. Idempotent.
pub(crate) fn delete_record(path: &Path) -> Result<(), StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
