use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{DecorationContext, SerialisationDecorator};
use crate::error::AddContext;
use crate::log_debug;
use crate::Result;

/// Gzip compression of entries flagged as compressed.
pub struct CompressionDecorator;

impl SerialisationDecorator for CompressionDecorator {
    fn decorate(&self, payload: Vec<u8>, context: &DecorationContext) -> Result<Vec<u8>> {
        if !context.compress {
            return Ok(payload);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload)?;
        let compressed = encoder.finish()?;
        log_debug!(
            "Compressed {} payload from {} to {} bytes",
            context.response_type,
            payload.len(),
            compressed.len()
        );
        Ok(compressed)
    }

    fn undecorate(&self, payload: Vec<u8>, context: &DecorationContext) -> Result<Vec<u8>> {
        if !context.compress {
            return Ok(payload);
        }
        let mut decoder = GzDecoder::new(payload.as_slice());
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .err_context("Could not decompress cached payload")?;
        Ok(decompressed)
    }
}
