use std::sync::Arc;

use rand::Rng;
use sha2::{Digest, Sha256};

use super::{DecorationContext, SerialisationDecorator};
use crate::error::CacheError;
use crate::Result;

const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 32;

pub trait Encryptor: Send + Sync {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// At rest obfuscation of cached payloads: a SHA-256 counter mode keystream
/// keyed by a passphrase, a random nonce per entry and a keyed SHA-256 tag.
/// It detects a wrong key and tampered entries. It is not a vetted AEAD,
/// provide another `Encryptor` when confidentiality matters.
///
/// Layout: `nonce (16) | ciphertext | tag (32)`.
pub struct KeystreamEncryptor {
    key: [u8; 32],
}

impl KeystreamEncryptor {
    pub fn new(passphrase: &str) -> Self {
        KeystreamEncryptor {
            key: Sha256::digest(passphrase.as_bytes()).into(),
        }
    }

    fn apply_keystream(&self, nonce: &[u8], data: &[u8]) -> Vec<u8> {
        data.chunks(32)
            .enumerate()
            .flat_map(|(counter, chunk)| {
                let block = Sha256::new()
                    .chain_update(self.key)
                    .chain_update(nonce)
                    .chain_update((counter as u64).to_be_bytes())
                    .finalize();
                chunk
                    .iter()
                    .zip(block)
                    .map(|(byte, key_byte)| byte ^ key_byte)
                    .collect::<Vec<u8>>()
            })
            .collect()
    }

    fn tag(&self, nonce: &[u8], ciphertext: &[u8]) -> [u8; TAG_LEN] {
        let inner = Sha256::new()
            .chain_update(self.key)
            .chain_update(nonce)
            .chain_update(ciphertext)
            .finalize();
        Sha256::new()
            .chain_update(self.key)
            .chain_update(inner)
            .finalize()
            .into()
    }
}

impl Encryptor for KeystreamEncryptor {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce);
        let ciphertext = self.apply_keystream(&nonce, data);
        let tag = self.tag(&nonce, &ciphertext);
        let mut encrypted = Vec::with_capacity(NONCE_LEN + ciphertext.len() + TAG_LEN);
        encrypted.extend_from_slice(&nonce);
        encrypted.extend(ciphertext);
        encrypted.extend_from_slice(&tag);
        Ok(encrypted)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(CacheError::EncryptionError(format!(
                "Encrypted payload too short: {} bytes",
                data.len()
            ))
            .into());
        }
        let (nonce, rest) = data.split_at(NONCE_LEN);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);
        if self.tag(nonce, ciphertext) != tag {
            return Err(CacheError::EncryptionError(
                "Integrity check failed, wrong key or corrupted entry".to_string(),
            )
            .into());
        }
        Ok(self.apply_keystream(nonce, ciphertext))
    }
}

/// Encrypts entries flagged as encrypted. Without an encryptor, writing an
/// encrypted entry fails rather than storing it in the clear.
pub struct EncryptionDecorator {
    encryptor: Option<Arc<dyn Encryptor>>,
}

impl EncryptionDecorator {
    pub fn new(encryptor: Option<Arc<dyn Encryptor>>) -> Self {
        EncryptionDecorator { encryptor }
    }

    fn encryptor(&self) -> Result<&Arc<dyn Encryptor>> {
        self.encryptor.as_ref().ok_or_else(|| {
            CacheError::EncryptionError("Encryption requested but no key is configured".to_string())
                .into()
        })
    }
}

impl SerialisationDecorator for EncryptionDecorator {
    fn decorate(&self, payload: Vec<u8>, context: &DecorationContext) -> Result<Vec<u8>> {
        if !context.encrypt {
            return Ok(payload);
        }
        self.encryptor()?.encrypt(&payload)
    }

    fn undecorate(&self, payload: Vec<u8>, context: &DecorationContext) -> Result<Vec<u8>> {
        if !context.encrypt {
            return Ok(payload);
        }
        self.encryptor()?.decrypt(&payload)
    }
}
