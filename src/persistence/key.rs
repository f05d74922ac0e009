use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use regex::Regex;

use super::CacheDataHolder;
use crate::error::CacheError;
use crate::time::Milliseconds;

lazy_static! {
    static ref KEY_FORMAT: Regex = Regex::new(r"^([^_]+_){5}[^_]+$").unwrap();
}

const SEPARATOR: char = '_';

/// Storage key of an entry. Everything but the payload is encoded in it:
/// `urlHash_cacheDate_expiryDate_typeHash_compressed_encrypted`, flags being
/// `1` or `0`. Entries are looked up by the `urlHash_` prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKey {
    pub url_hash: String,
    pub cache_date: Milliseconds,
    pub expiry_date: Milliseconds,
    pub type_hash: String,
    pub is_compressed: bool,
    pub is_encrypted: bool,
}

impl CacheKey {
    pub fn prefix(url_hash: &str) -> String {
        format!("{url_hash}{SEPARATOR}")
    }

    /// Same key with the expiry moved to epoch zero.
    pub fn invalidated(&self) -> Self {
        CacheKey {
            expiry_date: Milliseconds::new(0),
            ..self.clone()
        }
    }

    pub fn into_holder(self, data: Vec<u8>) -> CacheDataHolder {
        CacheDataHolder {
            url_hash: self.url_hash,
            type_hash: self.type_hash,
            cache_date: self.cache_date,
            expiry_date: self.expiry_date,
            data,
            is_compressed: self.is_compressed,
            is_encrypted: self.is_encrypted,
        }
    }
}

impl From<&CacheDataHolder> for CacheKey {
    fn from(holder: &CacheDataHolder) -> Self {
        CacheKey {
            url_hash: holder.url_hash.clone(),
            cache_date: holder.cache_date,
            expiry_date: holder.expiry_date,
            type_hash: holder.type_hash.clone(),
            is_compressed: holder.is_compressed,
            is_encrypted: holder.is_encrypted,
        }
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}_{}",
            self.url_hash,
            self.cache_date,
            self.expiry_date,
            self.type_hash,
            flag(self.is_compressed),
            flag(self.is_encrypted)
        )
    }
}

fn parse_flag(value: &str, key: &str) -> Result<bool, CacheError> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(CacheError::InvalidCacheKey(format!(
            "{key}: flag must be 1 or 0, got {value}"
        ))),
    }
}

fn parse_date(value: &str, key: &str) -> Result<Milliseconds, CacheError> {
    value
        .parse::<u64>()
        .map(Milliseconds::new)
        .map_err(|err| CacheError::InvalidCacheKey(format!("{key}: {err}")))
}

impl FromStr for CacheKey {
    type Err = CacheError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        if !KEY_FORMAT.is_match(key) {
            return Err(CacheError::InvalidCacheKey(key.to_string()));
        }
        let fields: Vec<&str> = key.split(SEPARATOR).collect();
        Ok(CacheKey {
            url_hash: fields[0].to_string(),
            cache_date: parse_date(fields[1], key)?,
            expiry_date: parse_date(fields[2], key)?,
            type_hash: fields[3].to_string(),
            is_compressed: parse_flag(fields[4], key)?,
            is_encrypted: parse_flag(fields[5], key)?,
        })
    }
}
