//! Values delivered to the caller.

use crate::error::CacheError;
use crate::status::CacheStatus;
use crate::time::Milliseconds;
use crate::token::ResponseToken;

/// Time spent on a call. `disk` covers the cache lookup, `network` the rest of
/// the call and `total` the whole of it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallDuration {
    pub disk: Milliseconds,
    pub network: Milliseconds,
    pub total: Milliseconds,
}

impl CallDuration {
    pub fn from_disk(disk: Milliseconds) -> Self {
        CallDuration {
            disk,
            network: Milliseconds::new(0),
            total: disk,
        }
    }

    pub fn from_network(disk: Milliseconds, total: Milliseconds) -> Self {
        let total = total.max(disk);
        CallDuration {
            disk,
            network: total - disk,
            total,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResponseMetadata {
    pub token: ResponseToken,
    pub exception: Option<CacheError>,
    pub call_duration: CallDuration,
}

impl ResponseMetadata {
    pub fn new(token: ResponseToken, call_duration: CallDuration) -> Self {
        ResponseMetadata {
            token,
            exception: None,
            call_duration,
        }
    }

    pub fn with_exception(self, exception: CacheError) -> Self {
        ResponseMetadata {
            exception: Some(exception),
            ..self
        }
    }

    pub fn status(&self) -> CacheStatus {
        self.token.status
    }
}

/// Working value passed between the engine stages: an optional payload and the
/// metadata describing what happened to it.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseWrapper<R> {
    pub response: Option<R>,
    pub metadata: ResponseMetadata,
}

impl<R> ResponseWrapper<R> {
    pub fn new(response: Option<R>, metadata: ResponseMetadata) -> Self {
        ResponseWrapper { response, metadata }
    }

    pub fn status(&self) -> CacheStatus {
        self.metadata.status()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CacheResult<R> {
    Response {
        payload: R,
        metadata: ResponseMetadata,
    },
    /// No payload: nothing cached and no network, or the network failed.
    Empty { metadata: ResponseMetadata },
    /// Outcome of a clear or an invalidation.
    Done { metadata: ResponseMetadata },
}

impl<R> CacheResult<R> {
    pub fn metadata(&self) -> &ResponseMetadata {
        match self {
            CacheResult::Response { metadata, .. }
            | CacheResult::Empty { metadata }
            | CacheResult::Done { metadata } => metadata,
        }
    }

    pub fn status(&self) -> CacheStatus {
        self.metadata().status()
    }

    pub fn exception(&self) -> Option<&CacheError> {
        self.metadata().exception.as_ref()
    }

    pub fn payload(&self) -> Option<&R> {
        match self {
            CacheResult::Response { payload, .. } => Some(payload),
            CacheResult::Empty { .. } | CacheResult::Done { .. } => None,
        }
    }

    pub fn into_payload(self) -> Option<R> {
        match self {
            CacheResult::Response { payload, .. } => Some(payload),
            CacheResult::Empty { .. } | CacheResult::Done { .. } => None,
        }
    }
}

impl<R> From<ResponseWrapper<R>> for CacheResult<R> {
    fn from(wrapper: ResponseWrapper<R>) -> Self {
        let metadata = wrapper.metadata;
        match wrapper.response {
            Some(payload) => CacheResult::Response { payload, metadata },
            None if metadata.status() == CacheStatus::Done => CacheResult::Done { metadata },
            None => CacheResult::Empty { metadata },
        }
    }
}
