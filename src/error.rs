use std::fmt::Display;

use anyhow::{anyhow, Context, Result};
use thiserror::Error;

/// Typed failures the cache surfaces to callers. Every variant is cheap to
/// clone so it can travel inside the metadata of an emitted result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("Serialisation error: {0}")]
    SerialisationError(String),
    #[error("Deserialisation error: {0}")]
    DeserialisationError(String),
    #[error("Could not hash request: {0}")]
    HashingError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Persistence error: {0}")]
    PersistenceError(String),
    #[error("Encryption error: {0}")]
    EncryptionError(String),
    #[error("Invalid cache key: {0}")]
    InvalidCacheKey(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Time conversion error: {0}")]
    TimeConversionError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Configuration not found")]
    ConfigurationNotFound,
    #[error("Cache location does not exist: {0}")]
    CacheLocationDoesNotExist(String),
    #[error("Cache location is not a directory: {0}")]
    CacheLocationIsNotADirectory(String),
    #[error("Cache location is not writeable: {0}")]
    CacheLocationIsNotWriteable(String),
    #[error("Cache location write test failed: {0}")]
    CacheLocationWriteTestFailed(String),
}

impl CacheError {
    /// Wraps an arbitrary error as a network failure unless it already is a
    /// `CacheError`, in which case it is kept as is.
    pub fn network(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<CacheError>() {
            Some(cache_err) => cache_err.clone(),
            None => CacheError::NetworkError(format!("{err:#}")),
        }
    }

    /// Same as `network` but for failures while serialising a response or
    /// writing it to the store.
    pub fn serialisation(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<CacheError>() {
            Some(CacheError::SerialisationError(msg)) => {
                CacheError::SerialisationError(msg.clone())
            }
            _ => CacheError::SerialisationError(format!("{err:#}")),
        }
    }
}

pub trait AddContext<T, E>: Context<T, E> {
    fn err_context<C: Display + Send + Sync + 'static>(self, msg: C) -> Result<T, anyhow::Error>
    where
        Self: Sized,
    {
        self.with_context(|| msg.to_string())
    }
}

impl<U, T, E> AddContext<T, E> for U where U: Context<T, E> {}

pub fn gen<T: AsRef<str>>(msg: T) -> anyhow::Error {
    anyhow!(msg.as_ref().to_string())
}
