//! Durable key-value storage abstraction.
//!
//! Mirrors the small synchronous surface of browser-style client storage:
//! string keys, string values, and failures that the caller decides how to
//! tolerate.

/// Storage operation errors.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// Storage is disabled or cannot be opened
    Unavailable(String),
    /// The medium refused the write because it is full
    QuotaExceeded,
    /// IO error
    Io(String),
    /// Serialization/deserialization error
    Serialization(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Unavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            StorageError::QuotaExceeded => write!(f, "Storage quota exceeded"),
            StorageError::Io(msg) => write!(f, "IO error: {}", msg),
            StorageError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Trait for durable client storage.
///
/// All operations are synchronous; implementations must not perform
/// network I/O.
pub trait KeyValueStorage: Send + Sync {
    /// Read a value.
    ///
    /// # Returns
    /// - `Ok(Some(value))` if the key exists
    /// - `Ok(None)` if it does not
    /// - `Err(error)` if the medium could not be read
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
