use super::{DecorationContext, SerialisationDecorator};
use crate::error::CacheError;
use crate::Result;

const SEPARATOR: u8 = b'\n';

/// Prefixes the payload with the response type name and a newline. On read
/// the recorded name must match the requested type.
pub struct StorageWrapDecorator;

impl SerialisationDecorator for StorageWrapDecorator {
    fn decorate(&self, payload: Vec<u8>, context: &DecorationContext) -> Result<Vec<u8>> {
        let mut wrapped = Vec::with_capacity(context.response_type.len() + 1 + payload.len());
        wrapped.extend_from_slice(context.response_type.as_bytes());
        wrapped.push(SEPARATOR);
        wrapped.extend(payload);
        Ok(wrapped)
    }

    fn undecorate(&self, payload: Vec<u8>, context: &DecorationContext) -> Result<Vec<u8>> {
        let position = payload
            .iter()
            .position(|byte| *byte == SEPARATOR)
            .ok_or_else(|| {
                CacheError::DeserialisationError("Could not extract the payload".to_string())
            })?;
        let stored_type = String::from_utf8_lossy(&payload[..position]);
        if stored_type != context.response_type {
            return Err(CacheError::DeserialisationError(format!(
                "Stored entry holds {} instead of {}",
                stored_type, context.response_type
            ))
            .into());
        }
        Ok(payload[position + 1..].to_vec())
    }

    fn response_type(&self, payload: &[u8]) -> Option<String> {
        let position = payload.iter().position(|byte| *byte == SEPARATOR)?;
        String::from_utf8(payload[..position].to_vec()).ok()
    }
}
