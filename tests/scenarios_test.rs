mod common;

use std::sync::{mpsc, Arc};

use common::{
    interceptor, statuses, users_request, CountingNetwork, TestClock, TestConfig, START, USERS_URL,
};
use rcache::error::{self, CacheError};
use rcache::request::PlainRequestMetadata;
use rcache::serialisation::Serialiser;
use rcache::time::{Milliseconds, Seconds};
use rcache::{CacheInterceptor, CachePriority, CacheResult, CacheStatus, Operation, Result};
use serde::{Deserialize, Serialize};

const TTL: Seconds = Seconds::new(60);

fn cached_or_network() -> Option<Operation> {
    Some(Operation::cache(CachePriority::CACHED_OR_NETWORK, TTL))
}

fn seed(interceptor: &CacheInterceptor, body: &str) {
    let results: Vec<CacheResult<String>> =
        interceptor.execute(cached_or_network(), users_request(), &mut CountingNetwork::ok(body));
    assert_eq!(vec![CacheStatus::Network], statuses(&results));
}

#[test]
fn test_miss_fetches_and_persists_with_expiry() {
    let clock = Arc::new(TestClock::new(START));
    let interceptor = interceptor(TestConfig::memory(), clock);
    let mut network = CountingNetwork::ok("users");

    let results = interceptor.execute(cached_or_network(), users_request(), &mut network);

    assert_eq!(vec![CacheStatus::Network], statuses(&results));
    assert_eq!(Some(&"users".to_string()), results[0].payload());
    let token = &results[0].metadata().token;
    assert_eq!(Some(Milliseconds::new(START)), token.cache_date);
    assert_eq!(Some(Milliseconds::new(START + 60_000)), token.expiry_date);
    let entries = interceptor.engine().persistence().entries().unwrap();
    assert_eq!(1, entries.len());
    assert_eq!(Milliseconds::new(START), entries[0].cache_date);
    assert_eq!(Milliseconds::new(START + 60_000), entries[0].expiry_date);
}

#[test]
fn test_entry_expired_a_second_ago_is_served_then_refreshed() {
    let clock = Arc::new(TestClock::new(START));
    let interceptor = interceptor(TestConfig::memory(), clock.clone());
    seed(&interceptor, "old users");
    clock.advance(61);

    let mut network = CountingNetwork::ok("new users");
    let results = interceptor.execute(cached_or_network(), users_request(), &mut network);

    assert_eq!(
        vec![CacheStatus::Stale, CacheStatus::Refreshed],
        statuses(&results)
    );
    assert_eq!(Some(&"old users".to_string()), results[0].payload());
    assert_eq!(Some(&"new users".to_string()), results[1].payload());
    let refreshed = &results[1].metadata().token;
    assert_eq!(Some(Milliseconds::new(START + 61_000 + 60_000)), refreshed.expiry_date);
}

#[test]
fn test_expired_entry_with_fresh_only_and_failing_network_is_empty() {
    let clock = Arc::new(TestClock::new(START));
    let interceptor = interceptor(TestConfig::memory(), clock.clone());
    seed(&interceptor, "old users");
    clock.advance(61);

    let mut network = CountingNetwork::failing();
    let results = interceptor.execute(
        Some(Operation::cache(CachePriority::FRESH_ONLY, TTL)),
        users_request(),
        &mut network,
    );

    assert_eq!(vec![CacheStatus::Empty], statuses(&results));
    assert_eq!(None, results[0].payload());
    match results[0].exception() {
        Some(CacheError::NetworkError(msg)) => assert!(msg.contains("connection refused")),
        other => panic!("Expected NetworkError, got {other:?}"),
    }
}

#[test]
fn test_offline_without_entry_never_calls_the_network() {
    let clock = Arc::new(TestClock::new(START));
    let interceptor = interceptor(TestConfig::memory(), clock);
    let mut network = CountingNetwork::ok("users");

    let results = interceptor.execute(
        Some(Operation::cache(CachePriority::OFFLINE, TTL)),
        users_request(),
        &mut network,
    );

    assert_eq!(vec![CacheStatus::Empty], statuses(&results));
    assert_eq!(0, network.calls);
}

#[test]
fn test_invalidate_turns_a_fresh_entry_stale() {
    let clock = Arc::new(TestClock::new(START));
    let interceptor = interceptor(TestConfig::memory(), clock.clone());
    seed(&interceptor, "users");
    clock.advance(10);

    let mut network = CountingNetwork::ok("unused");
    let results = interceptor.execute(Some(Operation::Invalidate), users_request(), &mut network);
    assert_eq!(vec![CacheStatus::Done], statuses(&results));
    assert_eq!(None, results[0].exception());
    assert_eq!(0, network.calls);

    let entries = interceptor.engine().persistence().entries().unwrap();
    assert_eq!(Milliseconds::new(0), entries[0].expiry_date);
    assert_eq!(Milliseconds::new(START), entries[0].cache_date);

    let results = interceptor.execute(
        Some(Operation::cache(CachePriority::OFFLINE, TTL)),
        users_request(),
        &mut network,
    );
    assert_eq!(vec![CacheStatus::Stale], statuses(&results));
    assert_eq!(Some(&"users".to_string()), results[0].payload());
}

#[test]
fn test_invalidate_and_clear_without_entries_emit_done() {
    let clock = Arc::new(TestClock::new(START));
    let interceptor = interceptor(TestConfig::memory(), clock);
    let test_table = vec![
        Operation::Invalidate,
        Operation::Clear {
            clear_stale_only: false,
        },
        Operation::Clear {
            clear_stale_only: true,
        },
    ];
    for operation in test_table {
        let mut network = CountingNetwork::ok("unused");
        let results = interceptor.execute(Some(operation.clone()), users_request(), &mut network);
        assert_eq!(vec![CacheStatus::Done], statuses(&results), "{operation}");
        assert_eq!(None, results[0].exception(), "{operation}");
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
}

struct BrokenSerialiser;

impl Serialiser for BrokenSerialiser {
    fn can_handle_type(&self, _response_type: &str) -> bool {
        true
    }

    fn serialise(&self, _value: &serde_json::Value) -> Result<Vec<u8>> {
        Err(error::gen("serialiser broke"))
    }

    fn deserialise(&self, _data: &[u8]) -> Result<serde_json::Value> {
        Err(error::gen("serialiser broke"))
    }
}

#[test]
fn test_failed_write_still_delivers_the_response() {
    let clock = Arc::new(TestClock::new(START));
    let interceptor = CacheInterceptor::builder(Arc::new(TestConfig::memory()))
        .clock(clock)
        .serialiser(Box::new(BrokenSerialiser))
        .build()
        .unwrap();
    let mut calls = 0;
    let mut network = |_: Option<Seconds>| -> Result<User> {
        calls += 1;
        Ok(User {
            name: "jordi".to_string(),
        })
    };

    let results = interceptor.execute(
        cached_or_network(),
        PlainRequestMetadata::new("User", USERS_URL),
        &mut network,
    );

    assert_eq!(1, calls);
    assert_eq!(vec![CacheStatus::NotCached], statuses(&results));
    assert_eq!(
        Some(&User {
            name: "jordi".to_string()
        }),
        results[0].payload()
    );
    match results[0].exception() {
        Some(CacheError::SerialisationError(_)) => (),
        other => panic!("Expected SerialisationError, got {other:?}"),
    }
    assert_eq!(None, results[0].metadata().token.expiry_date);
    assert!(interceptor.engine().persistence().entries().unwrap().is_empty());
}

#[test]
fn test_consumer_gone_after_stale_cancels_the_refresh() {
    let clock = Arc::new(TestClock::new(START));
    let interceptor = interceptor(TestConfig::memory(), clock.clone());
    seed(&interceptor, "old users");
    clock.advance(61);

    let (mut sender, receiver) = mpsc::channel::<CacheResult<String>>();
    drop(receiver);
    let mut network = CountingNetwork::ok("new users");
    interceptor.intercept(cached_or_network(), users_request(), &mut network, &mut sender);

    assert_eq!(0, network.calls);
    let entries = interceptor.engine().persistence().entries().unwrap();
    assert_eq!(Milliseconds::new(START + 60_000), entries[0].expiry_date);
}

#[test]
fn test_stale_result_is_received_before_the_refresh() {
    let clock = Arc::new(TestClock::new(START));
    let interceptor = interceptor(TestConfig::memory(), clock.clone());
    seed(&interceptor, "old users");
    clock.advance(61);

    let (mut sender, receiver) = mpsc::channel::<CacheResult<String>>();
    let mut network = CountingNetwork::ok("new users");
    interceptor.intercept(cached_or_network(), users_request(), &mut network, &mut sender);
    drop(sender);

    let received: Vec<CacheStatus> = receiver.iter().map(|result| result.status()).collect();
    assert_eq!(vec![CacheStatus::Stale, CacheStatus::Refreshed], received);
}

#[test]
fn test_invalid_url_is_fetched_but_not_cached() {
    let clock = Arc::new(TestClock::new(START));
    let interceptor = interceptor(TestConfig::memory(), clock);
    let mut network = CountingNetwork::ok("body");

    let results = interceptor.execute(
        cached_or_network(),
        PlainRequestMetadata::new("String", "not a url"),
        &mut network,
    );

    assert_eq!(1, network.calls);
    assert_eq!(vec![CacheStatus::NotCached], statuses(&results));
    match results[0].exception() {
        Some(CacheError::HashingError(_)) => (),
        other => panic!("Expected HashingError, got {other:?}"),
    }
    assert!(interceptor.engine().persistence().entries().unwrap().is_empty());
}
