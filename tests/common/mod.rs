//! Shared test utilities for integration tests.
//!
//! This module provides:
//! - Tracing setup (opt in with `RUST_LOG`)
//! - A deterministic clock for reproducible last-write-wins scenarios
//! - Helpers for building replica pairs and waiting for convergence

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_sync::{Clock, JsonCodec, SyncConfig, Synchronizer, Timestamp};

/// Install a tracing subscriber honoring `RUST_LOG`. Idempotent.
#[allow(dead_code)]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A deterministic clock: every call returns the next counter value.
///
/// Seed replicas with disjoint ranges to script who wins a conflict.
pub struct ManualClock {
    next: AtomicU64,
}

impl ManualClock {
    pub fn starting_at(first: u64) -> Arc<Self> {
        Arc::new(Self {
            next: AtomicU64::new(first),
        })
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// A replica over string keys and values with a scripted clock.
pub fn replica(clock_start: u64) -> Arc<Synchronizer<String, String>> {
    let config = SyncConfig::for_testing();
    Arc::new(Synchronizer::with_codec(
        JsonCodec::with_max_frame_len(config.max_frame_len),
        ManualClock::starting_at(clock_start),
        config,
    ))
}

/// Connect two replicas with an in-memory duplex stream.
///
/// Each side runs a full bidirectional session on its own task; the
/// returned handles resolve when the underlying stream dies.
pub fn link(
    a: &Arc<Synchronizer<String, String>>,
    b: &Arc<Synchronizer<String, String>>,
) -> (
    tokio::task::JoinHandle<strata_sync::Result<()>>,
    tokio::task::JoinHandle<strata_sync::Result<()>>,
) {
    let (a_stream, b_stream) = tokio::io::duplex(4096);
    let a = Arc::clone(a);
    let b = Arc::clone(b);
    (
        tokio::spawn(async move { a.attach(a_stream).await }),
        tokio::spawn(async move { b.attach(b_stream).await }),
    )
}

/// Build a string key path from literals.
pub fn path(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

/// Wait until `sync.get(path)` equals `expected`, or panic after 2 seconds.
pub async fn await_value(
    sync: &Synchronizer<String, String>,
    path: &[String],
    expected: &str,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if sync.get(path).as_deref() == Some(expected) {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "value at {path:?} never became {expected:?}; last seen {:?}",
                sync.get(path)
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
