//! Request identity. A request is keyed by a hash of its normalised URL and
//! body plus a hash of the response type it expects.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::CacheError;
use crate::{log_error, log_warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlainRequestMetadata {
    pub response_type: String,
    pub url: String,
    pub body: Option<String>,
}

impl PlainRequestMetadata {
    pub fn new<T: Into<String>, U: Into<String>>(response_type: T, url: U) -> Self {
        PlainRequestMetadata {
            response_type: response_type.into(),
            url: url.into(),
            body: None,
        }
    }

    /// Uses the Rust type name of `R` as the response type. Type names are not
    /// guaranteed stable across compiler releases; pass an explicit name with
    /// `new` when entries must survive toolchain upgrades.
    pub fn for_type<R, U: Into<String>>(url: U) -> Self {
        Self::new(std::any::type_name::<R>(), url)
    }

    pub fn with_body<T: Into<String>>(self, body: T) -> Self {
        PlainRequestMetadata {
            body: Some(body.into()),
            ..self
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashedRequestMetadata {
    pub plain: PlainRequestMetadata,
    pub url_hash: String,
    pub type_hash: String,
}

impl HashedRequestMetadata {
    pub fn response_type(&self) -> &str {
        &self.plain.response_type
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RequestMetadata {
    Hashed(HashedRequestMetadata),
    /// The request identity could not be computed. Such a request is never
    /// read from or written to the cache.
    Invalid {
        plain: PlainRequestMetadata,
        cause: CacheError,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// Upper case hex SHA-256. Keys are 64 characters and do not match
    /// those of stores keyed with SHA-1 or MD5, so such entries are never
    /// found. They are not migrated and stay until the cache is cleared.
    #[default]
    Sha256,
    /// `h = 7; h = h * 31 + byte`. Not collision resistant: two different
    /// requests can share a cache entry. Only for stores written by older
    /// clients that used it.
    Weak,
}

impl FromStr for HashAlgorithm {
    type Err = CacheError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "weak" => Ok(HashAlgorithm::Weak),
            _ => Err(CacheError::ConfigurationError(format!(
                "Unknown hash algorithm {s} - valid values are sha256, weak"
            ))),
        }
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "sha256"),
            HashAlgorithm::Weak => write!(f, "weak"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Hasher {
    algorithm: HashAlgorithm,
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        if algorithm == HashAlgorithm::Weak {
            log_warn!("Using the weak request hash, cache keys are not collision resistant");
        }
        Hasher { algorithm }
    }

    pub fn hash(&self, plain: PlainRequestMetadata) -> RequestMetadata {
        match normalise(&plain) {
            Ok(normalised) => {
                let url_hash = self.hash_str(&normalised);
                let type_hash = self.hash_str(&plain.response_type);
                RequestMetadata::Hashed(HashedRequestMetadata {
                    plain,
                    url_hash,
                    type_hash,
                })
            }
            Err(cause) => {
                log_error!("{}", cause);
                RequestMetadata::Invalid { plain, cause }
            }
        }
    }

    /// Hash used for response types, for instance when clearing every entry
    /// of one type.
    pub fn hash_str(&self, value: &str) -> String {
        match self.algorithm {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(value);
                format!("{:X}", hasher.finalize())
            }
            HashAlgorithm::Weak => {
                let hash = value
                    .bytes()
                    .fold(7u64, |hash, byte| hash.wrapping_mul(31).wrapping_add(byte as u64));
                format!("{hash:X}")
            }
        }
    }
}

/// Builds `scheme://host[:port]/path?sorted=params` followed by `||body` when
/// the request has one, so that parameter order does not change the key.
fn normalise(plain: &PlainRequestMetadata) -> std::result::Result<String, CacheError> {
    let url = Url::parse(&plain.url)
        .map_err(|err| CacheError::HashingError(format!("{}: {}", plain.url, err)))?;
    let host = url
        .host_str()
        .ok_or_else(|| CacheError::HashingError(format!("{}: no host", plain.url)))?;
    let mut normalised = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        normalised.push_str(&format!(":{port}"));
    }
    normalised.push_str(url.path());

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if !params.is_empty() {
        params.sort();
        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<String>>()
            .join("&");
        normalised.push('?');
        normalised.push_str(&query);
    }
    if let Some(body) = &plain.body {
        normalised.push_str("||");
        normalised.push_str(body);
    }
    Ok(normalised)
}
