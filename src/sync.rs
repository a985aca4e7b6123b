// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The synchronizer: a replicated tree over peer byte streams.
//!
//! Composes the concurrent [`Tree`], the [`Broadcast`] fan-out, and a
//! pluggable codec into a flood/gossip replication mesh:
//!
//! ```text
//!   set() ──► apply (LWW) ──► fan-out ──► every outbound session ──► peers
//!                ▲                              │
//!   inbound ─────┘ (accepted records re-enter   │
//!   session        the fan-out and relay on) ◄──┘
//! ```
//!
//! A local write is stamped, applied, and published to every attached
//! outbound session. An inbound session decodes records and applies each
//! one only if its stamp is strictly newer than what the path already
//! holds; accepted records are republished so other peers hear about them
//! through us. Any two replicas that exchange all updates converge,
//! independent of delivery order, because acceptance depends only on the
//! stamp comparison.
//!
//! # Sessions
//!
//! [`attach`](Synchronizer::attach) drives one bidirectional peer stream:
//! a decode loop and an encode loop that terminate together on the first
//! failure, which is returned to the caller. The unidirectional halves are
//! exposed too ([`attach_inbound`](Synchronizer::attach_inbound),
//! [`attach_outbound`](Synchronizer::attach_outbound)). Attach as many
//! sessions as the mesh needs; each runs in its caller's task. There is no
//! retry or reconnection here - a session that fails is gone until the
//! embedding application dials a new stream.

use crate::broadcast::Broadcast;
use crate::clock::{Clock, SystemClock, Timestamp};
use crate::codec::JsonCodec;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::metrics;
use crate::record::Record;
use crate::tree::Tree;
use crate::value::{WatchHandle, Watchers};
use futures::{SinkExt, StreamExt};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tracing::{debug, info_span, trace, warn, Instrument};

/// What [`Synchronizer::apply`] did with a record.
///
/// `Stale` is not a failure: it is the normal end of every relay loop in
/// the mesh and the visible face of last-write-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The record was strictly newer and is now the stored state.
    Applied,
    /// The stored stamp was at least as new; the record was discarded.
    Stale,
}

/// Per-path replication state, stored in the tree's value slot.
struct Slot<V> {
    state: Mutex<SlotState<V>>,
    watchers: Arc<Watchers<V>>,
}

struct SlotState<V> {
    stamp: Option<Timestamp>,
    value: Option<V>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState {
                stamp: None,
                value: None,
            }),
            watchers: Arc::new(Watchers::new()),
        }
    }
}

/// A replicated, hierarchically keyed value store.
///
/// Every synchronizer is an independent replica; wiring replicas together
/// with [`attach`](Self::attach)ed streams forms the mesh. The codec and
/// clock are explicit collaborators passed in at construction - there is no
/// ambient registration state.
pub struct Synchronizer<K, V, C = JsonCodec<K, V>> {
    tree: Tree<K, Slot<V>>,
    clock: Arc<dyn Clock>,
    codec: C,
    config: SyncConfig,
    /// Fan-out, initialized exactly once on first attach/set.
    fanout: OnceCell<Broadcast<Record<K, V>>>,
}

impl<K, V> Synchronizer<K, V, JsonCodec<K, V>> {
    /// A replica with the default JSON codec, wall clock, and config.
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    /// A replica with the default JSON codec and wall clock.
    ///
    /// The codec takes its frame limit from `config`.
    pub fn with_config(config: SyncConfig) -> Self {
        Self::with_codec(
            JsonCodec::with_max_frame_len(config.max_frame_len),
            Arc::new(SystemClock),
            config,
        )
    }
}

impl<K, V> Default for Synchronizer<K, V, JsonCodec<K, V>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C> Synchronizer<K, V, C> {
    /// A replica with an explicit codec, clock, and configuration.
    ///
    /// The codec instance is the session wire format; the clock is the
    /// source of the last-write-wins ordering for local writes.
    pub fn with_codec(codec: C, clock: Arc<dyn Clock>, config: SyncConfig) -> Self {
        Self {
            tree: Tree::new(),
            clock,
            codec,
            config,
            fanout: OnceCell::new(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

impl<K, V, C> Synchronizer<K, V, C>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
    /// The fan-out, created on first use.
    ///
    /// `OnceCell` makes concurrent first attaches race safely: one
    /// dispatcher wins, the others use it.
    fn fanout(&self) -> &Broadcast<Record<K, V>> {
        self.fanout
            .get_or_init(|| Broadcast::with_queue_depth(self.config.fanout_queue_depth))
    }

    /// Apply a record by last-write-wins.
    ///
    /// Locates (or lazily creates) the node at the record's path, then
    /// compares stamps under that node's own slot lock. Not strictly newer
    /// means discard - an idempotent no-op, never an error. Applying here
    /// does NOT publish; sessions and [`set`](Self::set) handle relay.
    pub fn apply(&self, record: &Record<K, V>) -> ApplyOutcome {
        let slot = self.tree.touch(&record.path).value_or_insert_with(Slot::default);

        let accepted = {
            let mut state = slot.state.lock();
            if state.stamp.is_some_and(|held| held >= record.stamp) {
                false
            } else {
                state.stamp = Some(record.stamp);
                state.value = Some(record.value.clone());
                true
            }
        };

        if accepted {
            slot.watchers.notify(record.value.clone());
            metrics::record_applied();
            ApplyOutcome::Applied
        } else {
            trace!(stamp = %record.stamp, depth = record.depth(), "discarded stale record");
            metrics::record_stale();
            ApplyOutcome::Stale
        }
    }

    /// Write a value at `path` and publish it to the mesh.
    ///
    /// The record is stamped with this replica's clock and runs through the
    /// same last-write-wins gate as remote records, so a clock that jumped
    /// backwards cannot regress state - the write is discarded locally and
    /// never published. Suspends only while the fan-out accepts the record.
    pub async fn set(&self, value: V, path: &[K]) -> ApplyOutcome {
        let record = Record::new(self.clock.now(), path.to_vec(), value);
        let outcome = self.apply(&record);
        if outcome == ApplyOutcome::Applied {
            // Cannot fail while we hold the producer handle.
            let _ = self.fanout().send(record).await;
            metrics::record_published();
        }
        outcome
    }

    /// The replicated value at `path`, or `None` if never written.
    pub fn get(&self, path: &[K]) -> Option<V> {
        let slot = self.tree.branch(path)?.value()?;
        let state = slot.state.lock();
        state.value.clone()
    }

    /// The stamp of the value at `path`, if any.
    pub fn stamp(&self, path: &[K]) -> Option<Timestamp> {
        let slot = self.tree.branch(path)?.value()?;
        let state = slot.state.lock();
        state.stamp
    }

    /// Watch one path for accepted updates.
    ///
    /// Fires for every record that wins the last-write-wins comparison at
    /// `path` - local or remote - on an independently scheduled task per
    /// notification. Stale records never fire. Cancel via the returned
    /// handle; cancelling twice is a no-op.
    pub fn watch(&self, path: &[K], watcher: impl Fn(V) + Send + Sync + 'static) -> WatchHandle {
        let slot = self.tree.touch(path).value_or_insert_with(Slot::default);
        slot.watchers.register(watcher)
    }
}

impl<K, V, C> Synchronizer<K, V, C>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
    C: Decoder<Item = Record<K, V>, Error = SyncError>
        + Encoder<Record<K, V>, Error = SyncError>
        + Clone
        + Unpin,
{
    /// Drive the inbound half of a peer session until the stream ends.
    ///
    /// Decodes records and applies each by last-write-wins; accepted
    /// records are republished onto the local fan-out so every other
    /// attached outbound session relays them (flood propagation). Returns
    /// `Ok(())` on clean end-of-stream, the terminating [`SyncError`]
    /// otherwise. Either way only this session is affected.
    pub async fn attach_inbound<R>(&self, reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let span = info_span!("sync_session", direction = "inbound");
        async {
            metrics::record_session_opened("inbound");
            let fanout = self.fanout().clone();
            let mut frames = FramedRead::new(reader, self.codec.clone());

            let result = loop {
                match frames.next().await {
                    Some(Ok(record)) => {
                        if self.apply(&record) == ApplyOutcome::Applied
                            && fanout.send(record).await.is_err()
                        {
                            break Ok(());
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "inbound session failed");
                        break Err(e);
                    }
                    None => {
                        debug!("inbound stream ended");
                        break Ok(());
                    }
                }
            };
            metrics::record_session_closed("inbound", result.is_ok());
            result
        }
        .instrument(span)
        .await
    }

    /// Drive the outbound half of a peer session until the stream fails.
    ///
    /// Subscribes to the local fan-out (policy and depth from
    /// [`SyncConfig`]) and encodes every published record onto the writer.
    /// Returns the terminating [`SyncError`] on a rejected write, `Ok(())`
    /// if the fan-out shuts down first. The subscription is removed either
    /// way.
    pub async fn attach_outbound<W>(&self, writer: W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let span = info_span!("sync_session", direction = "outbound");
        async {
            metrics::record_session_opened("outbound");
            let mut subscription = self
                .fanout()
                .subscribe_with(self.config.delivery_policy, self.config.fanout_queue_depth);
            let mut frames = FramedWrite::new(writer, self.codec.clone());

            let result = loop {
                match subscription.recv().await {
                    Some(record) => {
                        if let Err(e) = frames.send(record).await {
                            warn!(error = %e, "outbound session failed");
                            break Err(e);
                        }
                    }
                    None => {
                        debug!("fan-out closed, outbound session ending");
                        break Ok(());
                    }
                }
            };
            metrics::record_session_closed("outbound", result.is_ok());
            result
        }
        .instrument(span)
        .await
    }

    /// Drive one bidirectional peer session until its first failure.
    ///
    /// Splits the stream into a decode loop and an encode loop; whichever
    /// stops first takes the whole session down (the other half is
    /// cancelled) and its result is returned. Call repeatedly with fresh
    /// streams to build a mesh - each invocation is one independent
    /// session.
    pub async fn attach<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, writer) = tokio::io::split(stream);
        tokio::select! {
            result = self.attach_inbound(reader) => result,
            result = self.attach_outbound(writer) => result,
        }
    }
}
