#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rcache::config::ConfigProperties;
use rcache::error;
use rcache::request::PlainRequestMetadata;
use rcache::serialisation::StoreType;
use rcache::time::{Clock, Milliseconds, Seconds};
use rcache::{CacheInterceptor, CacheResult, CacheStatus, Result};

pub const START: u64 = 1_700_000_000_000;
pub const USERS_URL: &str = "https://api.example.com/users?page=1";

pub struct TestClock(AtomicU64);

impl TestClock {
    pub fn new(now: u64) -> Self {
        TestClock(AtomicU64::new(now))
    }

    pub fn advance(&self, seconds: u64) {
        self.0.fetch_add(seconds * 1000, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Milliseconds {
        Milliseconds::new(self.0.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct TestConfig {
    pub cache_location: Option<String>,
    pub store_type: StoreType,
    pub compress: bool,
    pub encrypt: bool,
    pub encryption_key: Option<String>,
}

impl TestConfig {
    pub fn memory() -> Self {
        TestConfig {
            store_type: StoreType::Memory,
            ..Default::default()
        }
    }
}

impl ConfigProperties for TestConfig {
    fn cache_location(&self) -> Option<&str> {
        self.cache_location.as_deref()
    }

    fn store_type(&self) -> StoreType {
        self.store_type
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
}

pub fn interceptor(config: TestConfig, clock: Arc<TestClock>) -> CacheInterceptor {
    CacheInterceptor::builder(Arc::new(config))
        .clock(clock)
        .build()
        .unwrap()
}

pub fn users_request() -> PlainRequestMetadata {
    PlainRequestMetadata::new("String", USERS_URL)
}

/// Network source answering with `body`, or failing when `body` is None.
/// Counts how many times it was called.
pub struct CountingNetwork {
    body: Option<String>,
    pub calls: usize,
    pub timeouts: Vec<Option<Seconds>>,
}

impl CountingNetwork {
    pub fn ok(body: &str) -> Self {
        CountingNetwork {
            body: Some(body.to_string()),
            calls: 0,
            timeouts: Vec::new(),
        }
    }

    pub fn failing() -> Self {
        CountingNetwork {
            body: None,
            calls: 0,
            timeouts: Vec::new(),
        }
    }
}

impl rcache::network::NetworkSource<String> for CountingNetwork {
    fn fetch(&mut self, connectivity_timeout: Option<Seconds>) -> Result<String> {
        self.calls += 1;
        self.timeouts.push(connectivity_timeout);
        match &self.body {
            Some(body) => Ok(body.clone()),
            None => Err(error::gen("connection refused")),
        }
    }
}

pub fn statuses<R>(results: &[CacheResult<R>]) -> Vec<CacheStatus> {
    results.iter().map(|result| result.status()).collect()
}
