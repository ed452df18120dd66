pub mod disk;
pub mod record;
pub mod slot;

pub use record::KeyRecord;
pub use slot::KeyStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialize: {0}")]
    Serialization(String),
    #[error("Corrupt: {0}")]
    Corrupt(String),
}
