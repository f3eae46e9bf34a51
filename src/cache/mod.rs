//! Device-local key/value storage for the open working set.
//!
//! The cache is injected as a [`LocalCache`] so the carry-over and completion
//! logic can run against [`MemoryCache`] in tests and [`FileCache`] on disk.

pub mod file;
pub mod memory;
pub mod tasks;

use thiserror::Error;

pub use file::FileCache;
pub use memory::MemoryCache;
pub use tasks::TaskCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid key '{0}'")]
    InvalidKey(String),

    #[error("gave up on {key} after {attempts} concurrent modifications")]
    Contention { key: String, attempts: usize },
}

/// Keyed blob storage. Writes are whole-value replacements.
pub trait LocalCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Write `value` only if the current value equals `expected`
    /// (`None` meaning absent). Returns whether the write happened.
    fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, CacheError>;
}

pub(crate) fn validate_key(key: &str) -> Result<(), CacheError> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}
