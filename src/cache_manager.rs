//! The decision engine. Given a cache operation, what is in the store and an
//! upstream network source, it decides whether to serve the cached entry,
//! fetch, or both, and drives the store accordingly.
//!
//! The engine never fails: every error ends up in the metadata of an emitted
//! result.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;
use crate::metadata::CacheMetadataManager;
use crate::network::{wait_for_network, AlwaysConnected, Connectivity, NetworkSource, ResultSink};
use crate::operation::{CacheOperation, CachePriority};
use crate::persistence::{CacheDataHolder, PersistenceManager};
use crate::request::HashedRequestMetadata;
use crate::response::{CacheResult, CallDuration, ResponseMetadata, ResponseWrapper};
use crate::serialisation::{DecorationContext, SerialisationManager};
use crate::status::CacheStatus;
use crate::time::{Clock, Milliseconds};
use crate::token::RequestToken;
use crate::Result;
use crate::{log_debug, log_error, log_warn};

/// Anything the cache can store and hand back.
pub trait Cacheable: Serialize + DeserializeOwned + Clone + 'static {}

impl<T> Cacheable for T where T: Serialize + DeserializeOwned + Clone + 'static {}

/// A cached response together with the flags it was written with.
struct CachedEntry<R> {
    wrapper: ResponseWrapper<R>,
    is_compressed: bool,
    is_encrypted: bool,
}

impl<R> CachedEntry<R> {
    fn status(&self) -> CacheStatus {
        self.wrapper.status()
    }
}

pub struct CacheManager {
    persistence: Arc<dyn PersistenceManager>,
    serialisation: SerialisationManager,
    metadata: CacheMetadataManager,
    connectivity: Arc<dyn Connectivity>,
    clock: Arc<dyn Clock>,
    compress: bool,
    encrypt: bool,
}

impl CacheManager {
    pub fn new(
        persistence: Arc<dyn PersistenceManager>,
        serialisation: SerialisationManager,
        metadata: CacheMetadataManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        CacheManager {
            persistence,
            serialisation,
            metadata,
            connectivity: Arc::new(AlwaysConnected),
            clock,
            compress: false,
            encrypt: false,
        }
    }

    pub fn with_connectivity(self, connectivity: Arc<dyn Connectivity>) -> Self {
        CacheManager {
            connectivity,
            ..self
        }
    }

    /// Compression and encryption applied to new entries whose operation
    /// leaves them unset.
    pub fn with_defaults(self, compress: bool, encrypt: bool) -> Self {
        CacheManager {
            compress,
            encrypt,
            ..self
        }
    }

    pub fn persistence(&self) -> &Arc<dyn PersistenceManager> {
        &self.persistence
    }

    pub fn serialisation(&self) -> &SerialisationManager {
        &self.serialisation
    }

    pub fn now(&self) -> Milliseconds {
        self.clock.now()
    }

    /// Serves a `Cache` operation. Emits one result, or two when a stale
    /// entry is served before being refreshed. The stale result is pushed to
    /// the sink before the network source is called. If the sink reports the
    /// consumer gone at that point, nothing is fetched nor written.
    pub fn get_cached_response<R, N, S>(
        &self,
        operation: &CacheOperation,
        token: &RequestToken,
        network: &mut N,
        sink: &mut S,
    ) where
        R: Cacheable,
        N: NetworkSource<R>,
        S: ResultSink<R>,
    {
        let priority = operation.priority;
        let hashed = match token.instruction.hashed() {
            Ok(hashed) => hashed.clone(),
            Err(cause) => {
                self.fetch_not_cached(token, network, sink, Some(cause));
                return;
            }
        };

        log_debug!("Checking for cached {}", hashed.response_type());
        let cached = self.lookup::<R>(token, &hashed);
        let disk_duration = self.clock.now() - token.request_date;

        if !priority.uses_network {
            let result = match cached {
                Some(entry)
                    if entry.status() == CacheStatus::Fresh || priority.emits_cached_stale =>
                {
                    entry.wrapper
                }
                _ => self.empty(token, disk_duration),
            };
            self.emit(priority, sink, result);
            return;
        }

        if let Some(entry) = &cached {
            if entry.status() == CacheStatus::Fresh {
                log_debug!("Delivering fresh cached {}", hashed.response_type());
                self.emit(priority, sink, entry.wrapper.clone());
                return;
            }
            if priority.emits_cached_stale {
                log_debug!("Delivering stale cached {}", hashed.response_type());
                if !self.emit(priority, sink, entry.wrapper.clone()) {
                    log_debug!(
                        "Consumer gone after stale {}, not refreshing",
                        hashed.response_type()
                    );
                    return;
                }
            }
        }

        let result =
            self.fetch_and_cache(operation, token, &hashed, cached, network, disk_duration);
        self.emit(priority, sink, result);
    }

    /// Forces the stored entry stale. Emits exactly one `DONE`, whether or not
    /// there was an entry.
    pub fn invalidate<R, S: ResultSink<R>>(&self, token: &RequestToken, sink: &mut S) {
        let exception = match token.instruction.hashed() {
            Ok(hashed) => match self.persistence.invalidate(&hashed.url_hash) {
                Ok(true) => {
                    log_debug!("Invalidated cached {}", hashed.response_type());
                    None
                }
                Ok(false) => {
                    log_debug!("Nothing cached to invalidate for {}", hashed.plain.url);
                    None
                }
                Err(err) => Some(persistence_error(&err)),
            },
            Err(cause) => Some(cause),
        };
        sink.emit(self.done(token, exception));
    }

    /// Deletes the entries of the request's response type, or only the stale
    /// ones. Emits exactly one `DONE`.
    pub fn clear_cache<R, S: ResultSink<R>>(
        &self,
        token: &RequestToken,
        clear_stale_only: bool,
        sink: &mut S,
    ) {
        let exception = match token.instruction.hashed() {
            Ok(hashed) => match self
                .persistence
                .clear(Some(&hashed.type_hash), clear_stale_only)
            {
                Ok(()) => None,
                Err(err) => Some(persistence_error(&err)),
            },
            Err(cause) => Some(cause),
        };
        sink.emit(self.done(token, exception));
    }

    /// Calls the network and delivers its answer as `NOT_CACHED`, never
    /// touching the store. A failed call is delivered as `EMPTY`.
    pub fn fetch_not_cached<R, N, S>(
        &self,
        token: &RequestToken,
        network: &mut N,
        sink: &mut S,
        exception: Option<CacheError>,
    ) where
        N: NetworkSource<R>,
        S: ResultSink<R>,
    {
        let network_result = network.fetch(None);
        let fetch_date = self.clock.now();
        let call_duration =
            CallDuration::from_network(Milliseconds::new(0), fetch_date - token.request_date);
        let (response, status, exception) = match network_result {
            Ok(response) => (Some(response), CacheStatus::NotCached, exception),
            Err(err) => (None, CacheStatus::Empty, Some(CacheError::network(&err))),
        };
        let mut metadata = ResponseMetadata::new(token.respond(status, fetch_date), call_duration);
        if let Some(exception) = exception {
            metadata = metadata.with_exception(exception);
        }
        sink.emit(ResponseWrapper::new(response, metadata).into());
    }

    fn lookup<R: Cacheable>(
        &self,
        token: &RequestToken,
        hashed: &HashedRequestMetadata,
    ) -> Option<CachedEntry<R>> {
        let holder = match self.persistence.get_cached(&token.instruction) {
            Ok(Some(holder)) => holder,
            Ok(None) => return None,
            Err(err) => {
                log_error!("Could not read cached {}: {:#}", hashed.response_type(), err);
                return None;
            }
        };
        if holder.type_hash != hashed.type_hash {
            log_debug!(
                "Cached entry for {} holds another response type, ignoring it",
                hashed.plain.url
            );
            return None;
        }

        let context = DecorationContext {
            response_type: hashed.response_type(),
            compress: holder.is_compressed,
            encrypt: holder.is_encrypted,
        };
        match self.serialisation.deserialise::<R>(&holder.data, &context) {
            Ok(response) => {
                let now = self.clock.now();
                let status = holder.status(now);
                log_debug!("Found cached {}, status: {}", hashed.response_type(), status);
                let response_token = token
                    .respond(status, holder.cache_date)
                    .with_dates(Some(holder.cache_date), Some(holder.expiry_date));
                let call_duration = CallDuration::from_disk(now - token.request_date);
                Some(CachedEntry {
                    wrapper: ResponseWrapper::new(
                        Some(response),
                        ResponseMetadata::new(response_token, call_duration),
                    ),
                    is_compressed: holder.is_compressed,
                    is_encrypted: holder.is_encrypted,
                })
            }
            Err(err) => {
                log_warn!(
                    "{:#}, clearing every cached {}",
                    err,
                    hashed.response_type()
                );
                if let Err(err) = self.persistence.clear(Some(&hashed.type_hash), false) {
                    log_error!("Could not clear cached {}: {:#}", hashed.response_type(), err);
                }
                None
            }
        }
    }

    fn fetch_and_cache<R, N>(
        &self,
        operation: &CacheOperation,
        token: &RequestToken,
        hashed: &HashedRequestMetadata,
        cached: Option<CachedEntry<R>>,
        network: &mut N,
        disk_duration: Milliseconds,
    ) -> ResponseWrapper<R>
    where
        R: Cacheable,
        N: NetworkSource<R>,
    {
        if !wait_for_network(self.connectivity.as_ref(), operation.connectivity_timeout) {
            log_warn!("Network unavailable, attempting to fetch {} anyway", hashed.plain.url);
        }
        log_debug!("Fetching {}", hashed.plain.url);

        let (flags, previous) = match cached {
            Some(entry) => (
                Some((entry.is_compressed, entry.is_encrypted)),
                Some(entry.wrapper),
            ),
            None => (None, None),
        };
        let network_result = network.fetch(operation.connectivity_timeout);
        let wrapper = self.metadata.set_network_call_metadata(
            network_result,
            operation,
            previous,
            token,
            disk_duration,
        );
        if let Some(exception) = &wrapper.metadata.exception {
            log_warn!("Could not fetch {}: {}", hashed.plain.url, exception);
            return wrapper;
        }

        let (compress, encrypt) = flags.unwrap_or((
            operation.compress.unwrap_or(self.compress),
            operation.encrypt.unwrap_or(self.encrypt),
        ));
        match self.persist(&wrapper, hashed, compress, encrypt) {
            Ok(()) => {
                log_debug!("Cached {}", hashed.response_type());
                wrapper
            }
            Err(err) => self.metadata.set_serialisation_failed_metadata(wrapper, &err),
        }
    }

    fn persist<R: Cacheable>(
        &self,
        wrapper: &ResponseWrapper<R>,
        hashed: &HashedRequestMetadata,
        compress: bool,
        encrypt: bool,
    ) -> Result<()> {
        let response = wrapper.response.as_ref().ok_or_else(|| {
            CacheError::SerialisationError("Nothing to cache".to_string())
        })?;
        let context = DecorationContext {
            response_type: hashed.response_type(),
            compress,
            encrypt,
        };
        let data = self.serialisation.serialise(response, &context)?;
        let token = &wrapper.metadata.token;
        self.persistence.put(CacheDataHolder {
            url_hash: hashed.url_hash.clone(),
            type_hash: hashed.type_hash.clone(),
            cache_date: token.cache_date.unwrap_or(token.fetch_date),
            expiry_date: token.expiry_date.unwrap_or(token.fetch_date),
            data,
            is_compressed: compress,
            is_encrypted: encrypt,
        })
    }

    fn empty<R>(&self, token: &RequestToken, disk_duration: Milliseconds) -> ResponseWrapper<R> {
        let response_token = token.respond(CacheStatus::Empty, self.clock.now());
        ResponseWrapper::new(
            None,
            ResponseMetadata::new(response_token, CallDuration::from_disk(disk_duration)),
        )
    }

    fn done<R>(&self, token: &RequestToken, exception: Option<CacheError>) -> CacheResult<R> {
        let now = self.clock.now();
        let mut metadata = ResponseMetadata::new(
            token.respond(CacheStatus::Done, now),
            CallDuration::from_disk(now - token.request_date),
        );
        if let Some(exception) = exception {
            metadata = metadata.with_exception(exception);
        }
        CacheResult::Done { metadata }
    }

    /// Pushes a result after checking its status against what the priority
    /// allows. A write failure turns any status into `NOT_CACHED`, which is
    /// accepted.
    fn emit<R, S: ResultSink<R>>(
        &self,
        priority: CachePriority,
        sink: &mut S,
        wrapper: ResponseWrapper<R>,
    ) -> bool {
        let status = wrapper.status();
        let write_failed = status == CacheStatus::NotCached
            && matches!(
                wrapper.metadata.exception,
                Some(CacheError::SerialisationError(_))
            );
        if !priority.allows(status) && !write_failed {
            log_error!("Status {} is not allowed for priority {}", status, priority);
        }
        sink.emit(wrapper.into())
    }
}

fn persistence_error(err: &anyhow::Error) -> CacheError {
    match err.downcast_ref::<CacheError>() {
        Some(cache_err) => cache_err.clone(),
        None => CacheError::PersistenceError(format!("{err:#}")),
    }
}
