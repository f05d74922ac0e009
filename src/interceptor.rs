//! Entry point of the cache. Resolves which operation applies to a call,
//! computes the request identity and dispatches to the engine.

use std::sync::Arc;

use crate::cache_manager::{CacheManager, Cacheable};
use crate::config::ConfigProperties;
use crate::metadata::{CacheMetadataManager, DurationPredicate};
use crate::network::{Connectivity, NetworkSource, ResultSink};
use crate::operation::Operation;
use crate::persistence::{
    FileStore, KeyValuePersistenceManager, MemoryStore, PersistenceManager,
};
use crate::request::{Hasher, PlainRequestMetadata};
use crate::response::CacheResult;
use crate::serialisation::{
    Encryptor, JsonSerialiser, KeystreamEncryptor, SerialisationManager, Serialiser, StoreType,
};
use crate::statistics::CacheStatistics;
use crate::time::{Clock, SystemClock};
use crate::token::{CacheInstruction, RequestToken};
use crate::Result;
use crate::log_debug;

pub struct CacheInterceptor {
    engine: CacheManager,
    hasher: Hasher,
    config: Arc<dyn ConfigProperties>,
    clock: Arc<dyn Clock>,
}

impl CacheInterceptor {
    pub fn new(
        engine: CacheManager,
        hasher: Hasher,
        config: Arc<dyn ConfigProperties>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        CacheInterceptor {
            engine,
            hasher,
            config,
            clock,
        }
    }

    pub fn builder(config: Arc<dyn ConfigProperties>) -> CacheInterceptorBuilder {
        CacheInterceptorBuilder::new(config)
    }

    /// Serves one call. Results are pushed to `sink` in emission order.
    pub fn intercept<R, N, S>(
        &self,
        operation: Option<Operation>,
        request: PlainRequestMetadata,
        network: &mut N,
        sink: &mut S,
    ) where
        R: Cacheable,
        N: NetworkSource<R>,
        S: ResultSink<R>,
    {
        let operation = self.resolve(operation);
        let request = self.hasher.hash(request);
        let token = RequestToken::new(
            CacheInstruction::new(operation.clone(), request),
            self.clock.now(),
        );
        log_debug!("Intercepted {} with {}", token.instruction.url(), operation);

        match operation {
            Operation::Cache(cache_operation) => {
                self.engine
                    .get_cached_response(&cache_operation, &token, network, sink)
            }
            Operation::Invalidate => self.engine.invalidate(&token, sink),
            Operation::Clear { clear_stale_only } => {
                self.engine.clear_cache(&token, clear_stale_only, sink)
            }
            Operation::DoNotCache => {
                let exception = token.instruction.hashed().err();
                self.engine.fetch_not_cached(&token, network, sink, exception)
            }
        }
    }

    /// Same as `intercept`, collecting the results.
    pub fn execute<R, N>(
        &self,
        operation: Option<Operation>,
        request: PlainRequestMetadata,
        network: &mut N,
    ) -> Vec<CacheResult<R>>
    where
        R: Cacheable,
        N: NetworkSource<R>,
    {
        let mut results = Vec::new();
        self.intercept(operation, request, network, &mut results);
        results
    }

    /// Clears every response type.
    pub fn clear_all(&self, stale_only: bool) -> Result<()> {
        self.engine.persistence().clear(None, stale_only)
    }

    pub fn statistics(&self) -> Result<CacheStatistics> {
        CacheStatistics::compile(
            self.engine.persistence().as_ref(),
            self.engine.serialisation(),
            self.clock.now(),
        )
    }

    pub fn engine(&self) -> &CacheManager {
        &self.engine
    }

    /// Calls without an operation get the configured default. With caching
    /// disabled, cache operations are downgraded to `DoNotCache` while
    /// invalidations and clears still go through.
    fn resolve(&self, operation: Option<Operation>) -> Operation {
        let operation = operation.unwrap_or_else(|| self.config.default_operation());
        match operation {
            Operation::Cache(_) if !self.config.cache_enabled() => {
                log_debug!("Caching disabled, not caching");
                Operation::DoNotCache
            }
            Operation::Cache(mut cache_operation) => {
                if cache_operation.connectivity_timeout.is_none() {
                    cache_operation.connectivity_timeout = self.config.connectivity_timeout();
                }
                Operation::Cache(cache_operation)
            }
            other => other,
        }
    }
}

/// Wires an interceptor from the configuration. Every collaborator can be
/// replaced before `build`.
pub struct CacheInterceptorBuilder {
    config: Arc<dyn ConfigProperties>,
    clock: Arc<dyn Clock>,
    persistence: Option<Arc<dyn PersistenceManager>>,
    serialiser: Option<Box<dyn Serialiser>>,
    encryptor: Option<Arc<dyn Encryptor>>,
    connectivity: Option<Arc<dyn Connectivity>>,
    duration_predicate: Option<DurationPredicate>,
}

impl CacheInterceptorBuilder {
    fn new(config: Arc<dyn ConfigProperties>) -> Self {
        let encryptor = config
            .encryption_key()
            .map(|key| Arc::new(KeystreamEncryptor::new(key)) as Arc<dyn Encryptor>);
        CacheInterceptorBuilder {
            config,
            clock: Arc::new(SystemClock),
            persistence: None,
            serialiser: None,
            encryptor,
            connectivity: None,
            duration_predicate: None,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn PersistenceManager>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn serialiser(mut self, serialiser: Box<dyn Serialiser>) -> Self {
        self.serialiser = Some(serialiser);
        self
    }

    pub fn encryptor(mut self, encryptor: Arc<dyn Encryptor>) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn duration_predicate(mut self, duration_predicate: DurationPredicate) -> Self {
        self.duration_predicate = Some(duration_predicate);
        self
    }

    pub fn build(mut self) -> Result<CacheInterceptor> {
        let store_type = self.config.store_type();
        let persistence = match self.persistence.take() {
            Some(persistence) => persistence,
            None => self.default_persistence(store_type)?,
        };
        let serialisation = SerialisationManager::for_store(
            store_type,
            self.serialiser.unwrap_or_else(|| Box::new(JsonSerialiser)),
            self.encryptor,
        );
        let mut metadata = CacheMetadataManager::new(self.clock.clone());
        if let Some(duration_predicate) = self.duration_predicate {
            metadata = metadata.with_duration_predicate(duration_predicate);
        }
        let mut engine = CacheManager::new(persistence, serialisation, metadata, self.clock.clone())
            .with_defaults(self.config.compress(), self.config.encrypt());
        if let Some(connectivity) = self.connectivity {
            engine = engine.with_connectivity(connectivity);
        }
        Ok(CacheInterceptor::new(
            engine,
            Hasher::new(self.config.hash_algorithm()),
            self.config,
            self.clock,
        ))
    }

    fn default_persistence(&self, store_type: StoreType) -> Result<Arc<dyn PersistenceManager>> {
        Ok(match store_type {
            StoreType::File => {
                let store = FileStore::new(self.config.clone())?;
                store.validate_cache_location()?;
                Arc::new(KeyValuePersistenceManager::new(store, self.clock.clone()))
            }
            StoreType::Memory => Arc::new(KeyValuePersistenceManager::new(
                MemoryStore::new(self.config.memory_capacity()),
                self.clock.clone(),
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::operation::CachePriority;
    use crate::status::CacheStatus;
    use crate::test::utils::{ConfigMock, MockClock, MockNetwork};
    use crate::time::{Milliseconds, Seconds};

    fn interceptor(config: ConfigMock) -> CacheInterceptor {
        CacheInterceptor::builder(Arc::new(config.with_store_type(StoreType::Memory)))
            .clock(Arc::new(MockClock::new(1_000_000)))
            .build()
            .unwrap()
    }

    fn request() -> PlainRequestMetadata {
        PlainRequestMetadata::new("User", "http://localhost/users?page=1")
    }

    fn statuses(results: &[CacheResult<String>]) -> Vec<CacheStatus> {
        results.iter().map(|result| result.status()).collect()
    }

    #[test]
    fn test_default_operation_resolution() {
        // cache all, cache enabled, expected statuses of two identical calls
        let test_table = vec![
            (false, true, vec![CacheStatus::NotCached, CacheStatus::NotCached]),
            (true, true, vec![CacheStatus::Network, CacheStatus::Fresh]),
            (true, false, vec![CacheStatus::NotCached, CacheStatus::NotCached]),
        ];
        for (cache_all, cache_enabled, expected) in test_table {
            let interceptor = interceptor(
                ConfigMock::default()
                    .with_cache_all(cache_all)
                    .with_cache_enabled(cache_enabled),
            );
            let mut network =
                MockNetwork::new(vec![Ok("one".to_string()), Ok("two".to_string())]);
            let mut results = interceptor.execute(None, request(), &mut network);
            results.extend(interceptor.execute(None, request(), &mut network));
            assert_eq!(expected, statuses(&results), "cache all {cache_all}");
        }
    }

    #[test]
    fn test_do_not_cache_has_no_cache_dates() {
        let interceptor = interceptor(ConfigMock::default());
        let mut network = MockNetwork::new(vec![Ok("one".to_string())]);
        let results = interceptor.execute(Some(Operation::DoNotCache), request(), &mut network);
        let token = &results[0].metadata().token;
        assert_eq!(CacheStatus::NotCached, token.status);
        assert_eq!(Milliseconds::new(1_000_000), token.fetch_date);
        assert_eq!(None, token.cache_date);
        assert_eq!(None, token.expiry_date);
        assert_eq!(None, results[0].exception());
    }

    #[test]
    fn test_do_not_cache_network_failure_is_empty() {
        let interceptor = interceptor(ConfigMock::default());
        let mut network: MockNetwork<String> =
            MockNetwork::new(vec![Err(crate::error::gen("timeout"))]);
        let results = interceptor.execute(Some(Operation::DoNotCache), request(), &mut network);
        assert_eq!(vec![CacheStatus::Empty], statuses(&results));
        match results[0].exception() {
            Some(CacheError::NetworkError(_)) => (),
            other => panic!("Expected NetworkError, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_request_never_touches_the_store() {
        let interceptor = interceptor(ConfigMock::default());
        let invalid = PlainRequestMetadata::new("User", "no scheme here");
        let cache = Operation::cache(CachePriority::CACHED_OR_NETWORK, Seconds::new(60));
        let test_table = vec![
            (cache, CacheStatus::NotCached),
            (Operation::DoNotCache, CacheStatus::NotCached),
            (Operation::Invalidate, CacheStatus::Done),
            (
                Operation::Clear {
                    clear_stale_only: false,
                },
                CacheStatus::Done,
            ),
        ];
        for (operation, expected) in test_table {
            let mut network = MockNetwork::new(vec![Ok("body".to_string())]);
            let results =
                interceptor.execute(Some(operation.clone()), invalid.clone(), &mut network);
            assert_eq!(vec![expected], statuses(&results), "{operation}");
            match results[0].exception() {
                Some(CacheError::HashingError(_)) => (),
                other => panic!("Expected HashingError for {operation}, got {other:?}"),
            }
        }
        assert_eq!(0, interceptor.statistics().unwrap().total());
    }

    #[test]
    fn test_configured_connectivity_timeout_applies() {
        let interceptor =
            interceptor(ConfigMock::default().with_connectivity_timeout(Seconds::new(7)));
        let mut network = MockNetwork::new(vec![Ok("body".to_string())]);
        let operation = Operation::cache(CachePriority::FRESH_ONLY, Seconds::new(60));
        interceptor.execute(Some(operation), request(), &mut network);
        assert_eq!(vec![Some(Seconds::new(7))], network.timeouts());
    }

    #[test]
    fn test_clear_all() {
        let interceptor = interceptor(ConfigMock::default().with_cache_all(true));
        let mut network = MockNetwork::new(vec![Ok("users".to_string()), Ok("repos".to_string())]);
        interceptor.execute(None, request(), &mut network);
        interceptor.execute(
            None,
            PlainRequestMetadata::new("Repo", "http://localhost/repos"),
            &mut network,
        );
        assert_eq!(2, interceptor.statistics().unwrap().total());
        interceptor.clear_all(false).unwrap();
        assert_eq!(0, interceptor.statistics().unwrap().total());
    }
}
