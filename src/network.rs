//! Collaborators on the network side of the engine: where responses come
//! from, whether the network is reachable, and where results are pushed to.

use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use crate::response::CacheResult;
use crate::time::Seconds;
use crate::Result;
use crate::{log_debug, log_warn};

const CONNECTIVITY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Upstream producer of a response. Called at most once per logical call.
pub trait NetworkSource<R> {
    fn fetch(&mut self, connectivity_timeout: Option<Seconds>) -> Result<R>;
}

impl<R, F> NetworkSource<R> for F
where
    F: FnMut(Option<Seconds>) -> Result<R>,
{
    fn fetch(&mut self, connectivity_timeout: Option<Seconds>) -> Result<R> {
        self(connectivity_timeout)
    }
}

pub trait Connectivity: Send + Sync {
    fn is_connected(&self) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysConnected;

impl Connectivity for AlwaysConnected {
    fn is_connected(&self) -> bool {
        true
    }
}

/// Waits up to `timeout` for the network to become reachable. This is a
/// bounded wait, the caller goes ahead with the fetch either way.
pub fn wait_for_network(connectivity: &dyn Connectivity, timeout: Option<Seconds>) -> bool {
    if connectivity.is_connected() {
        return true;
    }
    let Some(timeout) = timeout else {
        return false;
    };
    let deadline = Instant::now() + timeout.to_duration();
    log_debug!("Waiting up to {}s for network connectivity", timeout);
    while Instant::now() < deadline {
        thread::sleep(CONNECTIVITY_POLL_INTERVAL.min(deadline - Instant::now()));
        if connectivity.is_connected() {
            return true;
        }
    }
    log_warn!("No network connectivity after {}s", timeout);
    false
}

/// Receiver of the results of one call, in emission order. `emit` returns
/// false once the consumer has gone away.
pub trait ResultSink<R> {
    fn emit(&mut self, result: CacheResult<R>) -> bool;
}

impl<R> ResultSink<R> for Vec<CacheResult<R>> {
    fn emit(&mut self, result: CacheResult<R>) -> bool {
        self.push(result);
        true
    }
}

impl<R> ResultSink<R> for Sender<CacheResult<R>> {
    fn emit(&mut self, result: CacheResult<R>) -> bool {
        self.send(result).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ConnectsAfter {
        probes: AtomicUsize,
        after: usize,
    }

    impl Connectivity for ConnectsAfter {
        fn is_connected(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst) >= self.after
        }
    }

    #[test]
    fn test_wait_for_network() {
        // probes needed, timeout, expected
        let test_table = vec![
            (0, None, true),
            (1, None, false),
            (2, Some(Seconds::new(5)), true),
            (usize::MAX, Some(Seconds::new(0)), false),
        ];
        for (after, timeout, expected) in test_table {
            let connectivity = ConnectsAfter {
                probes: AtomicUsize::new(0),
                after,
            };
            assert_eq!(expected, wait_for_network(&connectivity, timeout));
        }
    }

    #[test]
    fn test_closure_is_a_network_source() {
        let mut calls = 0;
        let mut source = |timeout: Option<Seconds>| -> Result<String> {
            calls += 1;
            Ok(format!("timeout {timeout:?}"))
        };
        assert_eq!(
            "timeout Some(Seconds(3))",
            source.fetch(Some(Seconds::new(3))).unwrap()
        );
        drop(source);
        assert_eq!(1, calls);
    }

    #[test]
    fn test_sender_sink_reports_dropped_receiver() {
        let (mut sender, receiver) = std::sync::mpsc::channel::<CacheResult<String>>();
        drop(receiver);
        let metadata = crate::test::utils::empty_metadata();
        assert!(!sender.emit(CacheResult::Empty { metadata }));
    }
}
