// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Integration tests for the replication mesh.
//!
//! Peers are real `Synchronizer` replicas wired together with in-memory
//! duplex streams - no sockets, no external services.
//!
//! # Test Organization
//! - `two_peer_*` - one link, both directions
//! - `three_peer_*` - flood relay through a middle node
//! - `conflict_*` - cross-peer last-write-wins
//! - `session_*` - failure isolation and termination
//!
//! # Flood semantics
//!
//! The mesh has no history transfer: a record published before a session
//! attaches is never retransmitted on that session. Tests therefore confirm
//! a link is live (via a sentinel write) before asserting on propagation,
//! and use fresh keys per scenario.

mod common;

use common::{await_value, init_tracing, link, path, replica};
use std::time::Duration;
use strata_sync::{ApplyOutcome, SyncError};

/// Write `value` at `path` on `origin` until `target` observes it.
///
/// The first set can race session startup (its record is published before
/// the outbound side has subscribed, and flood replication never resends),
/// so re-stamp and re-publish until the link demonstrably carries it.
async fn set_until_visible(
    origin: &std::sync::Arc<strata_sync::Synchronizer<String, String>>,
    target: &std::sync::Arc<strata_sync::Synchronizer<String, String>>,
    value: &str,
    at: &[String],
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        origin.set(value.to_string(), at).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        if target.get(at).as_deref() == Some(value) {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("{value:?} never propagated to target at {at:?}");
        }
    }
}

// =============================================================================
// Two-Peer Convergence
// =============================================================================

#[tokio::test]
async fn two_peer_set_propagates() {
    init_tracing();
    let a = replica(1_000);
    let b = replica(2_000);
    let _links = link(&a, &b);

    set_until_visible(&a, &b, "on", &path(&["lights", "porch"])).await;
    assert_eq!(b.get(&path(&["lights", "porch"])).as_deref(), Some("on"));
}

#[tokio::test]
async fn two_peer_link_is_bidirectional() {
    init_tracing();
    let a = replica(1_000);
    let b = replica(2_000);
    let _links = link(&a, &b);

    set_until_visible(&a, &b, "from-a", &path(&["a-key"])).await;
    set_until_visible(&b, &a, "from-b", &path(&["b-key"])).await;

    assert_eq!(a.get(&path(&["b-key"])).as_deref(), Some("from-b"));
    assert_eq!(b.get(&path(&["a-key"])).as_deref(), Some("from-a"));
}

#[tokio::test]
async fn two_peer_nested_paths_propagate_independently() {
    init_tracing();
    let a = replica(1_000);
    let b = replica(2_000);
    let _links = link(&a, &b);

    set_until_visible(&a, &b, "21.5", &path(&["sensors", "kitchen", "temp"])).await;
    set_until_visible(&a, &b, "ajar", &path(&["sensors", "door"])).await;

    assert_eq!(
        b.get(&path(&["sensors", "kitchen", "temp"])).as_deref(),
        Some("21.5")
    );
    assert_eq!(b.get(&path(&["sensors", "door"])).as_deref(), Some("ajar"));
    // Interior path never written: still absent.
    assert_eq!(b.get(&path(&["sensors"])), None);
}

#[tokio::test]
async fn late_peer_receives_no_history() {
    init_tracing();
    let a = replica(1_000);
    let b = replica(2_000);
    let c = replica(3_000);
    let _ab = link(&a, &b);

    set_until_visible(&a, &b, "early", &path(&["old-news"])).await;

    // C joins after the fact; flood replication carries no history.
    let _bc = link(&b, &c);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(c.get(&path(&["old-news"])), None);
}

// =============================================================================
// Three-Peer Relay
// =============================================================================

#[tokio::test]
async fn three_peer_update_relays_through_middle() {
    init_tracing();
    let a = replica(1_000);
    let b = replica(2_000);
    let c = replica(3_000);

    // A↔B and B↔C, no direct A↔C link.
    let _ab = link(&a, &b);
    let _bc = link(&b, &c);

    // Drive from A until the update has crossed both hops.
    set_until_visible(&a, &c, "hello", &path(&["broadcasted"])).await;
    // The middle peer converged on the way through.
    await_value(&b, &path(&["broadcasted"]), "hello").await;
}

#[tokio::test]
async fn three_peer_relay_works_both_ways() {
    init_tracing();
    let a = replica(1_000);
    let b = replica(2_000);
    let c = replica(3_000);
    let _ab = link(&a, &b);
    let _bc = link(&b, &c);

    set_until_visible(&c, &a, "upstream", &path(&["from-c"])).await;
    await_value(&b, &path(&["from-c"]), "upstream").await;
}

// =============================================================================
// Cross-Peer Conflicts
// =============================================================================

#[tokio::test]
async fn conflict_resolves_to_newest_stamp_on_both_peers() {
    init_tracing();
    // B's clock is far behind A's.
    let a = replica(1_000_000);
    let b = replica(1_000);
    let _links = link(&a, &b);

    let key = path(&["thermostat"]);
    set_until_visible(&b, &a, "18", &key).await;

    // A's write carries a much newer stamp and must win everywhere.
    set_until_visible(&a, &b, "22", &key).await;
    assert_eq!(a.get(&key).as_deref(), Some("22"));
    assert_eq!(b.get(&key).as_deref(), Some("22"));

    // B's clock is still behind the winning stamp: its next local write
    // loses the LWW gate immediately and is not published.
    assert_eq!(
        b.set("16".to_string(), &key).await,
        ApplyOutcome::Stale
    );
    assert_eq!(b.get(&key).as_deref(), Some("22"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(a.get(&key).as_deref(), Some("22"));
}

// =============================================================================
// Session Failure Isolation
// =============================================================================

#[tokio::test]
async fn session_loss_leaves_other_sessions_and_state_intact() {
    init_tracing();
    let a = replica(1_000);
    let b = replica(2_000);
    let c = replica(3_000);
    let (a_task, b_task) = link(&a, &b);
    let _bc = link(&b, &c);

    set_until_visible(&a, &b, "kept", &path(&["pre-failure"])).await;

    // Kill A's side of the A↔B link. B's session must terminate - cleanly
    // (EOF on the read side) or with a connection loss (write side died
    // first), but never with a data fault.
    a_task.abort();
    let b_result = tokio::time::timeout(Duration::from_secs(2), b_task)
        .await
        .expect("B's session should terminate once the stream dies")
        .unwrap();
    if let Err(e) = b_result {
        assert!(e.is_connection_loss(), "unexpected session error: {e:?}");
    }

    // B's state survived, and the untouched B↔C session still replicates.
    assert_eq!(b.get(&path(&["pre-failure"])).as_deref(), Some("kept"));
    set_until_visible(&b, &c, "still-flowing", &path(&["post-failure"])).await;
}

#[tokio::test]
async fn session_garbage_fails_decode_without_poisoning_replica() {
    init_tracing();
    let b = replica(2_000);

    let (mut wire, peer_side) = tokio::io::duplex(256);
    let session = {
        let b = std::sync::Arc::clone(&b);
        tokio::spawn(async move { b.attach_inbound(peer_side).await })
    };

    // A length prefix far past any frame limit.
    use tokio::io::AsyncWriteExt;
    wire.write_all(&[0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), session)
        .await
        .unwrap()
        .unwrap();
    match result {
        Err(SyncError::Decode(msg)) => assert!(msg.contains("exceeds limit")),
        other => panic!("expected a decode error, got {other:?}"),
    }

    // The failed session never touched replica state.
    assert_eq!(b.get(&path(&["anything"])), None);
    b.set("fine".to_string(), &path(&["anything"])).await;
    assert_eq!(b.get(&path(&["anything"])).as_deref(), Some("fine"));
}

// =============================================================================
// Change Notification Across the Mesh
// =============================================================================

#[tokio::test]
async fn watch_fires_for_replicated_updates() {
    init_tracing();
    let a = replica(1_000);
    let b = replica(2_000);
    let _links = link(&a, &b);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _handle = b.watch(&path(&["doorbell"]), move |v| {
        let _ = tx.send(v);
    });

    set_until_visible(&a, &b, "ring", &path(&["doorbell"])).await;

    let seen = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("watcher should have fired")
        .unwrap();
    assert_eq!(seen, "ring");
}
