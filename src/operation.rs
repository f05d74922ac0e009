//! What the caller wants done with a request: the operation and, for cached
//! calls, the priority bundle that drives the fetch vs serve decision.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::CacheError;
use crate::status::CacheStatus;
use crate::time::Seconds;

use CacheStatus::*;

/// Policy flags for a `Cache` operation. The seven constants below are the
/// only values the engine branches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePriority {
    name: &'static str,
    pub uses_network: bool,
    pub invalidates_existing_data: bool,
    /// Emit the cached data while it is stale, before refreshing it.
    pub emits_cached_stale: bool,
    /// Fall back to the stale cached data when the refresh fails.
    pub emits_network_stale: bool,
    pub has_single_response: bool,
    pub statuses: &'static [CacheStatus],
}

impl CachePriority {
    /// Serve cached data, stale or not. Stale data is refreshed after being
    /// emitted.
    pub const CACHED_OR_NETWORK: CachePriority = CachePriority {
        name: "CACHED_OR_NETWORK",
        uses_network: true,
        invalidates_existing_data: false,
        emits_cached_stale: true,
        emits_network_stale: true,
        has_single_response: false,
        statuses: &[Fresh, Stale, Network, Refreshed, Empty, CouldNotRefresh],
    };

    /// Serve fresh cached data, otherwise go to the network and fall back to
    /// stale data only if the network fails.
    pub const FRESH_OR_NETWORK: CachePriority = CachePriority {
        name: "FRESH_OR_NETWORK",
        uses_network: true,
        invalidates_existing_data: false,
        emits_cached_stale: false,
        emits_network_stale: true,
        has_single_response: true,
        statuses: &[Fresh, Network, Refreshed, Empty, CouldNotRefresh],
    };

    pub const FRESH_ONLY: CachePriority = CachePriority {
        name: "FRESH_ONLY",
        uses_network: true,
        invalidates_existing_data: false,
        emits_cached_stale: false,
        emits_network_stale: false,
        has_single_response: true,
        statuses: &[Fresh, Network, Refreshed, Empty],
    };

    pub const INVALIDATED: CachePriority = CachePriority {
        name: "INVALIDATED",
        uses_network: true,
        invalidates_existing_data: true,
        emits_cached_stale: true,
        emits_network_stale: true,
        has_single_response: false,
        statuses: &[Stale, Network, Refreshed, Empty, CouldNotRefresh],
    };

    pub const INVALIDATED_FRESH_ONLY: CachePriority = CachePriority {
        name: "INVALIDATED_FRESH_ONLY",
        uses_network: true,
        invalidates_existing_data: true,
        emits_cached_stale: false,
        emits_network_stale: false,
        has_single_response: true,
        statuses: &[Network, Refreshed, Empty],
    };

    pub const OFFLINE: CachePriority = CachePriority {
        name: "OFFLINE",
        uses_network: false,
        invalidates_existing_data: false,
        emits_cached_stale: true,
        emits_network_stale: false,
        has_single_response: true,
        statuses: &[Fresh, Stale, Empty],
    };

    pub const OFFLINE_FRESH_ONLY: CachePriority = CachePriority {
        name: "OFFLINE_FRESH_ONLY",
        uses_network: false,
        invalidates_existing_data: false,
        emits_cached_stale: false,
        emits_network_stale: false,
        has_single_response: true,
        statuses: &[Fresh, Empty],
    };

    pub const ALL: [CachePriority; 7] = [
        CachePriority::CACHED_OR_NETWORK,
        CachePriority::FRESH_OR_NETWORK,
        CachePriority::FRESH_ONLY,
        CachePriority::INVALIDATED,
        CachePriority::INVALIDATED_FRESH_ONLY,
        CachePriority::OFFLINE,
        CachePriority::OFFLINE_FRESH_ONLY,
    ];

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fresh only priorities never hand out stale data, not even when the
    /// network fails.
    pub fn is_fresh_only(&self) -> bool {
        !self.emits_cached_stale && !self.emits_network_stale
    }

    pub fn allows(&self, status: CacheStatus) -> bool {
        self.statuses.contains(&status)
    }
}

impl Display for CachePriority {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl FromStr for CachePriority {
    type Err = CacheError;

    /// Accepts both the constant name and its kebab case form,
    /// `CACHED_OR_NETWORK` and `cached-or-network`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_uppercase().replace('-', "_");
        CachePriority::ALL
            .into_iter()
            .find(|priority| priority.name == name)
            .ok_or_else(|| CacheError::InvalidOperation(format!("Unknown cache priority: {s}")))
    }
}

#[derive(Clone, Debug, PartialEq, Builder)]
pub struct CacheOperation {
    pub priority: CachePriority,
    pub duration: Seconds,
    #[builder(default)]
    pub connectivity_timeout: Option<Seconds>,
    /// Unset means the global configuration decides.
    #[builder(default)]
    pub encrypt: Option<bool>,
    #[builder(default)]
    pub compress: Option<bool>,
}

impl CacheOperation {
    pub fn builder() -> CacheOperationBuilder {
        CacheOperationBuilder::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationType {
    Cache,
    Invalidate,
    Clear,
    DoNotCache,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Cache => "CACHE",
            OperationType::Invalidate => "INVALIDATE",
            OperationType::Clear => "CLEAR",
            OperationType::DoNotCache => "DO_NOT_CACHE",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Cache(CacheOperation),
    /// Mark the stored entry as stale without deleting it.
    Invalidate,
    Clear {
        clear_stale_only: bool,
    },
    /// Pass the network result through untouched.
    DoNotCache,
}

impl Operation {
    pub fn cache(priority: CachePriority, duration: Seconds) -> Self {
        Operation::Cache(CacheOperation {
            priority,
            duration,
            connectivity_timeout: None,
            encrypt: None,
            compress: None,
        })
    }

    pub fn operation_type(&self) -> OperationType {
        match self {
            Operation::Cache(_) => OperationType::Cache,
            Operation::Invalidate => OperationType::Invalidate,
            Operation::Clear { .. } => OperationType::Clear,
            Operation::DoNotCache => OperationType::DoNotCache,
        }
    }

    /// Whether a lookup for this operation has to force the stored entry
    /// stale before reading it.
    pub fn invalidates_existing_data(&self) -> bool {
        match self {
            Operation::Invalidate => true,
            Operation::Cache(cache) => cache.priority.invalidates_existing_data,
            Operation::Clear { .. } | Operation::DoNotCache => false,
        }
    }
}

const SEPARATOR: char = ':';

fn optional<T: Display>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let op_type = self.operation_type().as_str();
        match self {
            Operation::Cache(cache) => write!(
                f,
                "{op_type}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
                cache.priority,
                cache.duration,
                optional(&cache.connectivity_timeout),
                optional(&cache.encrypt),
                optional(&cache.compress),
            ),
            Operation::Clear { clear_stale_only } => {
                write!(f, "{op_type}{SEPARATOR}{clear_stale_only}")
            }
            Operation::Invalidate | Operation::DoNotCache => write!(f, "{op_type}"),
        }
    }
}

fn parse_field<T: FromStr>(
    field: &str,
    name: &str,
    serialised: &str,
) -> Result<Option<T>, CacheError> {
    if field.is_empty() {
        return Ok(None);
    }
    field.parse::<T>().map(Some).map_err(|_| {
        CacheError::InvalidOperation(format!("Invalid {name} '{field}' in operation {serialised}"))
    })
}

impl FromStr for Operation {
    type Err = CacheError;

    /// Parses the form produced by `Display`, for instance
    /// `CACHE:FRESH_ONLY:3600::true:` or `CLEAR:true`.
    fn from_str(serialised: &str) -> Result<Self, Self::Err> {
        let params: Vec<&str> = serialised.trim().split(SEPARATOR).collect();
        let invalid = || CacheError::InvalidOperation(serialised.to_string());
        match params.as_slice() {
            ["DO_NOT_CACHE"] => Ok(Operation::DoNotCache),
            ["INVALIDATE"] => Ok(Operation::Invalidate),
            ["CLEAR"] => Ok(Operation::Clear {
                clear_stale_only: false,
            }),
            ["CLEAR", stale_only] => Ok(Operation::Clear {
                clear_stale_only: parse_field(stale_only, "clear_stale_only", serialised)?
                    .unwrap_or(false),
            }),
            ["CACHE", priority, duration, timeout, encrypt, compress] => {
                let duration = parse_field::<u64>(duration, "duration", serialised)?
                    .ok_or_else(invalid)?;
                Ok(Operation::Cache(CacheOperation {
                    priority: priority.parse()?,
                    duration: Seconds::new(duration),
                    connectivity_timeout: parse_field::<u64>(timeout, "timeout", serialised)?
                        .map(Seconds::new),
                    encrypt: parse_field(encrypt, "encrypt", serialised)?,
                    compress: parse_field(compress, "compress", serialised)?,
                }))
            }
            _ => Err(invalid()),
        }
    }
}
