//! Lifecycle tag attached to every emitted result.

use std::fmt::{self, Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheStatus {
    /// The call has been resolved to an operation but not dispatched yet.
    Instruction,
    NotCached,
    Fresh,
    Stale,
    Network,
    Refreshed,
    CouldNotRefresh,
    Empty,
    Done,
}

impl CacheStatus {
    /// Final statuses are never followed by another emission for the same
    /// call. `Stale` is the only non final emitted status.
    pub fn is_final(&self) -> bool {
        !matches!(self, CacheStatus::Instruction | CacheStatus::Stale)
    }

    /// Statuses that are always the one and only emission of a call.
    pub fn is_single_response(&self) -> bool {
        matches!(
            self,
            CacheStatus::NotCached | CacheStatus::Network | CacheStatus::Fresh | CacheStatus::Done
        )
    }

    pub fn is_fresh(&self) -> bool {
        matches!(
            self,
            CacheStatus::NotCached
                | CacheStatus::Network
                | CacheStatus::Fresh
                | CacheStatus::Refreshed
                | CacheStatus::Empty
        )
    }

    pub fn is_from_cache(&self) -> bool {
        matches!(
            self,
            CacheStatus::Fresh | CacheStatus::Stale | CacheStatus::CouldNotRefresh
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CacheStatus::CouldNotRefresh | CacheStatus::Empty)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Instruction => "INSTRUCTION",
            CacheStatus::NotCached => "NOT_CACHED",
            CacheStatus::Fresh => "FRESH",
            CacheStatus::Stale => "STALE",
            CacheStatus::Network => "NETWORK",
            CacheStatus::Refreshed => "REFRESHED",
            CacheStatus::CouldNotRefresh => "COULD_NOT_REFRESH",
            CacheStatus::Empty => "EMPTY",
            CacheStatus::Done => "DONE",
        }
    }
}

impl Display for CacheStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
