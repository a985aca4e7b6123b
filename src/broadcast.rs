//! Single-producer, multi-consumer fan-out.
//!
//! One dispatcher task reads from the producer side and forwards each
//! message to every currently registered consumer before accepting the next
//! message. Consumers subscribe and unsubscribe at any time; a subscriber
//! only ever sees messages sent after it registered.
//!
//! # Delivery policy
//!
//! Each consumer owns a bounded queue and an explicit [`DeliveryPolicy`]
//! chosen at subscribe time:
//!
//! - [`Block`](DeliveryPolicy::Block) - a full queue stalls the dispatcher,
//!   and with it the producer and every other consumer. This is the default:
//!   backpressure all the way to the source, one slow consumer slows the
//!   whole fan-out.
//! - [`DropOldest`](DeliveryPolicy::DropOldest) - a full queue sheds its
//!   oldest entry to admit the new one; the consumer always sees the most
//!   recent messages.
//! - [`DropNewest`](DeliveryPolicy::DropNewest) - a full queue rejects the
//!   incoming message; the consumer keeps the backlog it already has.
//!
//! # Shutdown
//!
//! Dropping every [`Broadcast`] producer handle ends the dispatcher: it
//! finishes delivering what was already accepted, closes every consumer
//! queue, and clears the registry. Consumers drain their remaining backlog
//! and then see `None`. Dropping a [`Subscriber`] unregisters it, so an
//! abandoned `Block` consumer can never wedge the dispatcher.

use crate::error::SyncError;
use crate::metrics;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Notify};
use tracing::trace;

/// Per-consumer queue depth used by [`Broadcast::new`].
pub const DEFAULT_QUEUE_DEPTH: usize = 20;

/// What the dispatcher does when a consumer's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Wait for space; stalls the entire fan-out.
    #[default]
    Block,
    /// Shed the queue's oldest message to admit the new one.
    DropOldest,
    /// Reject the incoming message.
    DropNewest,
}

impl DeliveryPolicy {
    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryPolicy::Block => "block",
            DeliveryPolicy::DropOldest => "drop_oldest",
            DeliveryPolicy::DropNewest => "drop_newest",
        }
    }
}

/// One consumer's bounded queue.
struct ConsumerQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    policy: DeliveryPolicy,
    closed: AtomicBool,
    readable: Notify,
    writable: Notify,
}

impl<T> ConsumerQueue<T> {
    fn new(capacity: usize, policy: DeliveryPolicy) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            policy,
            closed: AtomicBool::new(false),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    /// Dispatcher side: enqueue `item` according to the delivery policy.
    async fn deliver(&self, item: T) {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return;
            }
            // Register interest in space before inspecting the queue, so a
            // consumer's wakeup between unlock and await is not lost.
            let space = self.writable.notified();
            {
                let mut items = self.items.lock();
                if items.len() < self.capacity {
                    items.push_back(item);
                    drop(items);
                    self.readable.notify_one();
                    return;
                }
                match self.policy {
                    DeliveryPolicy::Block => {}
                    DeliveryPolicy::DropOldest => {
                        items.pop_front();
                        items.push_back(item);
                        drop(items);
                        metrics::record_fanout_dropped("drop_oldest");
                        self.readable.notify_one();
                        return;
                    }
                    DeliveryPolicy::DropNewest => {
                        metrics::record_fanout_dropped("drop_newest");
                        return;
                    }
                }
            }
            space.await;
        }
    }

    /// Consumer side: dequeue, waiting if empty, `None` once closed and
    /// drained.
    async fn pop(&self) -> Option<T> {
        loop {
            let available = self.readable.notified();
            {
                let mut items = self.items.lock();
                if let Some(item) = items.pop_front() {
                    drop(items);
                    self.writable.notify_one();
                    return Some(item);
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            available.await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.readable.notify_one();
        self.writable.notify_one();
    }
}

/// Consumer registry, one lock shared by every session of a fan-out.
struct Registry<T> {
    consumers: Mutex<HashMap<u64, Arc<ConsumerQueue<T>>>>,
    next_id: AtomicU64,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Self {
            consumers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

/// Producer handle for a fan-out.
///
/// Cloning yields another producer handle onto the same dispatcher; the
/// dispatcher stops when the last handle is dropped.
pub struct Broadcast<T> {
    tx: mpsc::Sender<T>,
    registry: Arc<Registry<T>>,
    default_depth: usize,
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            registry: Arc::clone(&self.registry),
            default_depth: self.default_depth,
        }
    }
}

impl<T: Clone + Send + 'static> Broadcast<T> {
    /// Create a fan-out with the default consumer queue depth.
    ///
    /// Spawns the dispatcher task; must be called within a Tokio runtime.
    pub fn new() -> Self {
        Self::with_queue_depth(DEFAULT_QUEUE_DEPTH)
    }

    /// Create a fan-out whose plain [`subscribe`](Self::subscribe) uses the
    /// given queue depth.
    pub fn with_queue_depth(default_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let registry = Arc::new(Registry::new());
        tokio::spawn(dispatch(rx, Arc::clone(&registry)));
        Self {
            tx,
            registry,
            default_depth,
        }
    }

    /// Hand a message to the dispatcher.
    ///
    /// Suspends while the dispatcher is still delivering earlier messages
    /// (the hand-off buffer holds a single message). Fails only if the
    /// dispatcher is gone.
    pub async fn send(&self, message: T) -> Result<(), SyncError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| SyncError::BroadcastClosed)
    }

    /// Register a consumer with the default depth and [`DeliveryPolicy::Block`].
    pub fn subscribe(&self) -> Subscriber<T> {
        self.subscribe_with(DeliveryPolicy::Block, self.default_depth)
    }

    /// Register a consumer with an explicit policy and queue depth.
    ///
    /// The consumer receives only messages sent after this call returns.
    pub fn subscribe_with(&self, policy: DeliveryPolicy, depth: usize) -> Subscriber<T> {
        let queue = Arc::new(ConsumerQueue::new(depth, policy));
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .consumers
            .lock()
            .insert(id, Arc::clone(&queue));
        trace!(consumer = id, policy = policy.as_str(), depth, "consumer subscribed");
        Subscriber {
            queue,
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }
}

/// Dispatcher: forward each message to every registered consumer, in full,
/// before accepting the next.
async fn dispatch<T: Clone>(mut rx: mpsc::Receiver<T>, registry: Arc<Registry<T>>) {
    while let Some(message) = rx.recv().await {
        let consumers: Vec<Arc<ConsumerQueue<T>>> =
            registry.consumers.lock().values().cloned().collect();
        for consumer in consumers {
            consumer.deliver(message.clone()).await;
        }
    }

    // Every producer handle is gone: close all consumers and clear the
    // registry so late unsubscribes find nothing to do.
    let remaining: Vec<Arc<ConsumerQueue<T>>> = registry
        .consumers
        .lock()
        .drain()
        .map(|(_, queue)| queue)
        .collect();
    for queue in remaining {
        queue.close();
    }
    trace!("fan-out dispatcher stopped");
}

/// Consumer handle for a fan-out.
///
/// Dropping the subscriber unregisters it and closes its queue.
pub struct Subscriber<T> {
    queue: Arc<ConsumerQueue<T>>,
    registry: Weak<Registry<T>>,
    id: u64,
}

impl<T: Clone + Send + 'static> Subscriber<T> {
    /// Receive the next message.
    ///
    /// Suspends until a message arrives; returns `None` once the queue is
    /// closed (producer gone or consumer removed) and the backlog drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.queue.pop().await
    }

    /// Remove this consumer. Further messages are no longer delivered.
    pub fn unsubscribe(self) {
        // Drop does the unregistration.
    }
}

impl<T> Drop for Subscriber<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.consumers.lock().remove(&self.id);
        }
        self.queue.close();
    }
}
