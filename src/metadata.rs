//! Stamps statuses, dates and durations on results once the network has
//! answered, or once caching the answer failed.

use std::any::Any;
use std::sync::Arc;

use crate::error::CacheError;
use crate::operation::CacheOperation;
use crate::response::{CallDuration, ResponseMetadata, ResponseWrapper};
use crate::status::CacheStatus;
use crate::time::{Clock, Milliseconds, Seconds};
use crate::token::RequestToken;
use crate::log_error;

/// Per response override of the time to live. Only consulted for fresh
/// statuses.
pub type DurationPredicate = Arc<dyn Fn(&dyn Any) -> Option<Seconds> + Send + Sync>;

pub struct CacheMetadataManager {
    clock: Arc<dyn Clock>,
    duration_predicate: Option<DurationPredicate>,
}

impl CacheMetadataManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        CacheMetadataManager {
            clock,
            duration_predicate: None,
        }
    }

    pub fn with_duration_predicate(self, duration_predicate: DurationPredicate) -> Self {
        CacheMetadataManager {
            duration_predicate: Some(duration_predicate),
            ..self
        }
    }

    /// Builds the result of a network call made for a `Cache` operation.
    ///
    /// A failed call yields `EMPTY` when the priority is fresh only or nothing
    /// was cached before, and `COULD_NOT_REFRESH` with the previous payload
    /// otherwise. The dates of the previous entry are kept on failure since
    /// that entry stays in the store. A successful call yields `REFRESHED` or
    /// `NETWORK` with an expiry of `fetch date + time to live`.
    pub fn set_network_call_metadata<R: 'static>(
        &self,
        network_result: crate::Result<R>,
        operation: &CacheOperation,
        previous: Option<ResponseWrapper<R>>,
        request_token: &RequestToken,
        disk_duration: Milliseconds,
    ) -> ResponseWrapper<R> {
        let fetch_date = self.clock.now();
        let call_duration =
            CallDuration::from_network(disk_duration, fetch_date - request_token.request_date);

        match network_result {
            Ok(response) => {
                let status = if previous.is_some() {
                    CacheStatus::Refreshed
                } else {
                    CacheStatus::Network
                };
                let time_to_live = self.time_to_live(&response, status, operation);
                let token = request_token
                    .respond(status, fetch_date)
                    .with_dates(Some(fetch_date), Some(fetch_date + time_to_live.to_millis()));
                ResponseWrapper::new(Some(response), ResponseMetadata::new(token, call_duration))
            }
            Err(err) => {
                let exception = CacheError::network(&err);
                let (previous_payload, cache_date, expiry_date) = match previous {
                    Some(previous) => (
                        previous.response,
                        previous.metadata.token.cache_date,
                        previous.metadata.token.expiry_date,
                    ),
                    None => (None, None, None),
                };
                let status = if operation.priority.is_fresh_only() || previous_payload.is_none() {
                    CacheStatus::Empty
                } else {
                    CacheStatus::CouldNotRefresh
                };
                let response = match status {
                    CacheStatus::CouldNotRefresh => previous_payload,
                    _ => None,
                };
                let token = request_token
                    .respond(status, fetch_date)
                    .with_dates(cache_date, expiry_date);
                ResponseWrapper::new(
                    response,
                    ResponseMetadata::new(token, call_duration).with_exception(exception),
                )
            }
        }
    }

    /// Marks a fetched response that could not be cached. The payload is
    /// still delivered, tagged `NOT_CACHED` and without cache dates.
    pub fn set_serialisation_failed_metadata<R>(
        &self,
        wrapper: ResponseWrapper<R>,
        cause: &anyhow::Error,
    ) -> ResponseWrapper<R> {
        let exception = CacheError::serialisation(cause);
        log_error!(
            "Could not cache {}, the response will not be cached: {}",
            wrapper
                .metadata
                .token
                .instruction
                .hashed()
                .map(|hashed| hashed.response_type().to_string())
                .unwrap_or_default(),
            exception
        );
        let token = wrapper
            .metadata
            .token
            .with_status(CacheStatus::NotCached)
            .with_dates(None, None);
        ResponseWrapper::new(
            wrapper.response,
            ResponseMetadata::new(token, wrapper.metadata.call_duration).with_exception(exception),
        )
    }

    fn time_to_live<R: 'static>(
        &self,
        response: &R,
        status: CacheStatus,
        operation: &CacheOperation,
    ) -> Seconds {
        if !status.is_fresh() {
            return operation.duration;
        }
        match &self.duration_predicate {
            Some(predicate) => match predicate(response as &dyn Any) {
                Some(duration) => duration,
                None => operation.duration,
            },
            None => operation.duration,
        }
    }
}
