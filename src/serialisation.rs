//! Turns responses into the bytes kept in the store and back.
//!
//! Payloads go through a serialiser and then through a chain of decorators,
//! applied in order on write and in reverse order on read. Which decorators
//! act on a given entry depends on the flags persisted with it.

use std::any::{Any, TypeId};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;
use crate::persistence::CacheDataHolder;
use crate::Result;

pub mod compression;
pub mod encryption;
pub mod storage;

pub use compression::CompressionDecorator;
pub use encryption::{EncryptionDecorator, Encryptor, KeystreamEncryptor};
pub use storage::StorageWrapDecorator;

/// Model serialiser. Works on `serde_json::Value` so implementations can be
/// swapped at runtime behind a trait object.
pub trait Serialiser: Send + Sync {
    fn can_handle_type(&self, response_type: &str) -> bool;
    fn serialise(&self, value: &serde_json::Value) -> Result<Vec<u8>>;
    fn deserialise(&self, data: &[u8]) -> Result<serde_json::Value>;
}

pub struct JsonSerialiser;

impl Serialiser for JsonSerialiser {
    fn can_handle_type(&self, _response_type: &str) -> bool {
        true
    }

    fn serialise(&self, value: &serde_json::Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialise(&self, data: &[u8]) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Per entry switches for the decorators plus the response type the payload
/// belongs to.
#[derive(Clone, Copy, Debug)]
pub struct DecorationContext<'a> {
    pub response_type: &'a str,
    pub compress: bool,
    pub encrypt: bool,
}

pub trait SerialisationDecorator: Send + Sync {
    fn decorate(&self, payload: Vec<u8>, context: &DecorationContext) -> Result<Vec<u8>>;
    fn undecorate(&self, payload: Vec<u8>, context: &DecorationContext) -> Result<Vec<u8>>;
    /// Response type recorded by this decorator, if it records one.
    fn response_type(&self, _payload: &[u8]) -> Option<String> {
        None
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreType {
    #[default]
    File,
    Memory,
}

impl FromStr for StoreType {
    type Err = CacheError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StoreType::File),
            "memory" => Ok(StoreType::Memory),
            _ => Err(CacheError::ConfigurationError(format!(
                "Unknown store type {s} - valid values are file, memory"
            ))),
        }
    }
}

impl Display for StoreType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreType::File => write!(f, "file"),
            StoreType::Memory => write!(f, "memory"),
        }
    }
}

pub struct SerialisationManager {
    serialiser: Box<dyn Serialiser>,
    decorators: Vec<Box<dyn SerialisationDecorator>>,
}

impl SerialisationManager {
    pub fn new(
        serialiser: Box<dyn Serialiser>,
        decorators: Vec<Box<dyn SerialisationDecorator>>,
    ) -> Self {
        SerialisationManager {
            serialiser,
            decorators,
        }
    }

    /// Default chain for a store: file stores record the response type in
    /// front of the payload, then encrypt and compress. Memory stores skip the
    /// type record.
    pub fn for_store(
        store_type: StoreType,
        serialiser: Box<dyn Serialiser>,
        encryptor: Option<Arc<dyn Encryptor>>,
    ) -> Self {
        let mut decorators: Vec<Box<dyn SerialisationDecorator>> = Vec::new();
        if store_type == StoreType::File {
            decorators.push(Box::new(StorageWrapDecorator));
        }
        decorators.push(Box::new(EncryptionDecorator::new(encryptor)));
        decorators.push(Box::new(CompressionDecorator));
        SerialisationManager::new(serialiser, decorators)
    }

    /// Strings are stored raw, any other type has to be supported by the
    /// serialiser.
    pub fn serialise<R: Serialize + 'static>(
        &self,
        response: &R,
        context: &DecorationContext,
    ) -> Result<Vec<u8>> {
        self.serialise_payload(response, context)
            .map_err(|err| CacheError::serialisation(&err).into())
    }

    fn serialise_payload<R: Serialize + 'static>(
        &self,
        response: &R,
        context: &DecorationContext,
    ) -> Result<Vec<u8>> {
        let mut serialised = match (response as &dyn Any).downcast_ref::<String>() {
            Some(raw) => raw.as_bytes().to_vec(),
            None => {
                if !self.serialiser.can_handle_type(context.response_type) {
                    return Err(CacheError::SerialisationError(format!(
                        "The serialiser cannot handle responses of type {}",
                        context.response_type
                    ))
                    .into());
                }
                self.serialiser.serialise(&serde_json::to_value(response)?)?
            }
        };
        for decorator in &self.decorators {
            serialised = decorator.decorate(serialised, context)?;
        }
        Ok(serialised)
    }

    pub fn deserialise<R: DeserializeOwned + 'static>(
        &self,
        data: &[u8],
        context: &DecorationContext,
    ) -> Result<R> {
        self.deserialise_payload(data, context).map_err(|err| {
            CacheError::DeserialisationError(format!(
                "Could not read cached {}: {:#}",
                context.response_type, err
            ))
            .into()
        })
    }

    fn deserialise_payload<R: DeserializeOwned + 'static>(
        &self,
        data: &[u8],
        context: &DecorationContext,
    ) -> Result<R> {
        let mut deserialised = data.to_vec();
        for decorator in self.decorators.iter().rev() {
            deserialised = decorator.undecorate(deserialised, context)?;
        }
        if TypeId::of::<R>() == TypeId::of::<String>() {
            let raw: Box<dyn Any> = Box::new(String::from_utf8(deserialised)?);
            return raw
                .downcast::<R>()
                .map(|response| *response)
                .map_err(|_| CacheError::DeserialisationError("String payload".to_string()).into());
        }
        let value = self.serialiser.deserialise(&deserialised)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Response type name recorded in a stored entry, when the chain records
    /// one. Used for statistics where only the type hash is known.
    pub fn response_type_name(&self, holder: &CacheDataHolder) -> Option<String> {
        let context = DecorationContext {
            response_type: "",
            compress: holder.is_compressed,
            encrypt: holder.is_encrypted,
        };
        let mut payload = holder.data.clone();
        for decorator in self.decorators.iter().rev() {
            if let Some(response_type) = decorator.response_type(&payload) {
                return Some(response_type);
            }
            payload = decorator.undecorate(payload, &context).ok()?;
        }
        None
    }
}
