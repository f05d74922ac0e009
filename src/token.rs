//! Immutable records binding an instruction to a lifecycle status and the
//! dates the cache reasons about.

use crate::error::CacheError;
use crate::operation::Operation;
use crate::request::{HashedRequestMetadata, RequestMetadata};
use crate::status::CacheStatus;
use crate::time::Milliseconds;

/// An operation resolved for one request.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheInstruction {
    pub operation: Operation,
    pub request: RequestMetadata,
}

impl CacheInstruction {
    pub fn new(operation: Operation, request: RequestMetadata) -> Self {
        CacheInstruction { operation, request }
    }

    pub fn url(&self) -> &str {
        match &self.request {
            RequestMetadata::Hashed(hashed) => &hashed.plain.url,
            RequestMetadata::Invalid { plain, .. } => &plain.url,
        }
    }

    /// The hashed request identity, or the reason it could not be computed.
    pub fn hashed(&self) -> Result<&HashedRequestMetadata, CacheError> {
        match &self.request {
            RequestMetadata::Hashed(hashed) => Ok(hashed),
            RequestMetadata::Invalid { cause, .. } => Err(cause.clone()),
        }
    }
}

pub trait CacheToken {
    fn instruction(&self) -> &CacheInstruction;
    fn status(&self) -> CacheStatus;
    fn request_date(&self) -> Milliseconds;
}

/// Token for a call that has not been dispatched yet. Its status is always
/// `INSTRUCTION`.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestToken {
    pub instruction: CacheInstruction,
    pub request_date: Milliseconds,
}

impl RequestToken {
    pub fn new(instruction: CacheInstruction, request_date: Milliseconds) -> Self {
        RequestToken {
            instruction,
            request_date,
        }
    }

    /// Response token with no cache or expiry date.
    pub fn respond(&self, status: CacheStatus, fetch_date: Milliseconds) -> ResponseToken {
        ResponseToken {
            instruction: self.instruction.clone(),
            status,
            request_date: self.request_date,
            fetch_date,
            cache_date: None,
            expiry_date: None,
        }
    }
}

impl CacheToken for RequestToken {
    fn instruction(&self) -> &CacheInstruction {
        &self.instruction
    }

    fn status(&self) -> CacheStatus {
        CacheStatus::Instruction
    }

    fn request_date(&self) -> Milliseconds {
        self.request_date
    }
}

/// Token of an emitted result. `expiry_date` is only set when the entry is
/// actually in the store.
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseToken {
    pub instruction: CacheInstruction,
    pub status: CacheStatus,
    pub request_date: Milliseconds,
    pub fetch_date: Milliseconds,
    pub cache_date: Option<Milliseconds>,
    pub expiry_date: Option<Milliseconds>,
}

impl ResponseToken {
    pub fn with_status(self, status: CacheStatus) -> Self {
        ResponseToken { status, ..self }
    }

    pub fn with_dates(
        self,
        cache_date: Option<Milliseconds>,
        expiry_date: Option<Milliseconds>,
    ) -> Self {
        ResponseToken {
            cache_date,
            expiry_date,
            ..self
        }
    }
}

impl CacheToken for ResponseToken {
    fn instruction(&self) -> &CacheInstruction {
        &self.instruction
    }

    fn status(&self) -> CacheStatus {
        self.status
    }

    fn request_date(&self) -> Milliseconds {
        self.request_date
    }
}
