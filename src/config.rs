//! Config file parsing and validation.
//!
//! The config file holds `profile.key=value` lines. Only the lines of the
//! selected profile are read, blank lines and `#` comments are ignored.

use crate::error::CacheError;
use crate::operation::{CachePriority, Operation};
use crate::request::HashAlgorithm;
use crate::serialisation::StoreType;
use crate::time::Seconds;
use crate::Result;
use std::str::FromStr;
use std::sync::Arc;
use std::{collections::HashMap, io::Read};

pub const DEFAULT_CACHE_DURATION: Seconds = Seconds::new(3600);
pub const DEFAULT_MEMORY_CAPACITY: usize = 20;

pub trait ConfigProperties: Send + Sync {
    fn cache_location(&self) -> Option<&str> {
        None
    }
    fn cache_enabled(&self) -> bool {
        true
    }
    fn default_cache_duration(&self) -> Seconds {
        DEFAULT_CACHE_DURATION
    }
    fn connectivity_timeout(&self) -> Option<Seconds> {
        None
    }
    fn compress(&self) -> bool {
        false
    }
    fn encrypt(&self) -> bool {
        false
    }
    fn encryption_key(&self) -> Option<&str> {
        None
    }
    fn store_type(&self) -> StoreType {
        StoreType::File
    }
    fn memory_capacity(&self) -> usize {
        DEFAULT_MEMORY_CAPACITY
    }
    fn hash_algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha256
    }
    fn cache_all(&self) -> bool {
        false
    }
    /// Operation for calls that do not carry one.
    fn default_operation(&self) -> Operation {
        if self.cache_all() {
            Operation::cache(
                CachePriority::CACHED_OR_NETWORK,
                self.default_cache_duration(),
            )
        } else {
            Operation::DoNotCache
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    cache_location: Option<String>,
    cache_enabled: bool,
    default_cache_duration: Seconds,
    connectivity_timeout: Option<Seconds>,
    compress: bool,
    encrypt: bool,
    encryption_key: Option<String>,
    store_type: StoreType,
    memory_capacity: usize,
    hash_algorithm: HashAlgorithm,
    cache_all: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cache_location: None,
            cache_enabled: true,
            default_cache_duration: DEFAULT_CACHE_DURATION,
            connectivity_timeout: None,
            compress: false,
            encrypt: false,
            encryption_key: None,
            store_type: StoreType::File,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            hash_algorithm: HashAlgorithm::Sha256,
            cache_all: false,
        }
    }
}

impl Config {
    pub fn new<T: Read>(reader: T, profile: &str) -> Result<Self> {
        let data = Config::parse(reader, profile)?;
        let defaults = Config::default();
        Ok(Config {
            cache_location: data.get("cache_location").cloned(),
            cache_enabled: parse_or(&data, "cache_enabled", defaults.cache_enabled)?,
            default_cache_duration: match data.get("default_cache_duration") {
                Some(duration) => Seconds::try_from(duration.as_str())?,
                None => defaults.default_cache_duration,
            },
            connectivity_timeout: data
                .get("connectivity_timeout")
                .map(|timeout| Seconds::try_from(timeout.as_str()))
                .transpose()?,
            compress: parse_or(&data, "compress", defaults.compress)?,
            encrypt: parse_or(&data, "encrypt", defaults.encrypt)?,
            encryption_key: data.get("encryption_key").cloned(),
            store_type: parse_or(&data, "store_type", defaults.store_type)?,
            memory_capacity: parse_or(&data, "memory_capacity", defaults.memory_capacity)?,
            hash_algorithm: parse_or(&data, "hash_algorithm", defaults.hash_algorithm)?,
            cache_all: parse_or(&data, "cache_all", defaults.cache_all)?,
        })
    }

    pub fn with_cache_location<T: Into<String>>(self, cache_location: T) -> Self {
        Config {
            cache_location: Some(cache_location.into()),
            ..self
        }
    }

    fn parse<T: Read>(mut reader: T, profile: &str) -> Result<HashMap<String, String>> {
        let mut config_data = String::new();
        reader.read_to_string(&mut config_data)?;
        let mut profile_config = HashMap::new();

        let regex = regex::Regex::new(&format!(
            r"^{}\.(?P<key>\w+)=(?P<value>.*)",
            regex::escape(profile)
        ))?;
        for line in config_data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(captured_names) = regex.captures(line) {
                let key = &captured_names["key"];
                let value = captured_names["value"].trim();
                profile_config.insert(key.to_string(), value.to_string());
            }
        }

        if profile_config.is_empty() {
            return Err(CacheError::ConfigurationError(format!(
                "No config data found for profile {profile}"
            ))
            .into());
        }
        Ok(profile_config)
    }
}

fn parse_or<T: FromStr>(data: &HashMap<String, String>, key: &str, default: T) -> Result<T> {
    match data.get(key) {
        Some(value) => value.parse::<T>().map_err(|_| {
            CacheError::ConfigurationError(format!("Invalid value {value} for {key}")).into()
        }),
        None => Ok(default),
    }
}

impl ConfigProperties for Config {
    fn cache_location(&self) -> Option<&str> {
        self.cache_location.as_deref()
    }

    fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    fn default_cache_duration(&self) -> Seconds {
        self.default_cache_duration
    }

    fn connectivity_timeout(&self) -> Option<Seconds> {
        self.connectivity_timeout
    }

    fn compress(&self) -> bool {
        self.compress
    }

    fn encrypt(&self) -> bool {
        self.encrypt
    }

    fn encryption_key(&self) -> Option<&str> {
        self.encryption_key.as_deref()
    }

    fn store_type(&self) -> StoreType {
        self.store_type
    }

    fn memory_capacity(&self) -> usize {
        self.memory_capacity
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    fn cache_all(&self) -> bool {
        self.cache_all
    }
}

impl ConfigProperties for Arc<Config> {
    fn cache_location(&self) -> Option<&str> {
        self.as_ref().cache_location()
    }

    fn cache_enabled(&self) -> bool {
        self.as_ref().cache_enabled()
    }

    fn default_cache_duration(&self) -> Seconds {
        self.as_ref().default_cache_duration()
    }

    fn connectivity_timeout(&self) -> Option<Seconds> {
        self.as_ref().connectivity_timeout()
    }

    fn compress(&self) -> bool {
        self.as_ref().compress()
    }

    fn encrypt(&self) -> bool {
        self.as_ref().encrypt()
    }

    fn encryption_key(&self) -> Option<&str> {
        self.as_ref().encryption_key()
    }

    fn store_type(&self) -> StoreType {
        self.as_ref().store_type()
    }

    fn memory_capacity(&self) -> usize {
        self.as_ref().memory_capacity()
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.as_ref().hash_algorithm()
    }

    fn cache_all(&self) -> bool {
        self.as_ref().cache_all()
    }
}
