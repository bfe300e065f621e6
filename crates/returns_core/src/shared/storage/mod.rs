//! Долговременное key/value хранилище.
//!
//! Ядро не знает, где лежат данные: снимок и пометки пишутся через
//! [`KeyValueStore`], а реализация подставляется снаружи
//! (в памяти для тестов, файлы на диске для бинарника).

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;

/// Ошибки хранилища
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Трейт для key/value хранилища со строковыми значениями (JSON)
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
