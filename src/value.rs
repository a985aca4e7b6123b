//! Observed value cells.
//!
//! A [`Value`] is a mutex-guarded scalar with a registry of change watchers.
//! [`Value::set`] replaces the stored value and then fires every watcher
//! with the new value, each on its own spawned task - fire-and-forget, with
//! no ordering guarantee between watchers or relative to `set` returning.
//!
//! Watcher registration hands back a [`WatchHandle`]; cancelling removes
//! exactly that registration and is idempotent. Dropping the handle does
//! NOT cancel - a watcher lives until cancelled or until its cell is gone.
//!
//! Notification requires a running Tokio runtime; `get`/`set` themselves
//! are plain synchronous calls.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Watcher<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A registry of change watchers keyed by registration identity.
///
/// Shared between [`Value`] and the synchronizer's per-path slots.
pub(crate) struct Watchers<T> {
    entries: Mutex<HashMap<u64, Watcher<T>>>,
    next_id: AtomicU64,
}

impl<T> Watchers<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T: Clone + Send + 'static> Watchers<T> {
    /// Register a watcher and return its cancellation handle.
    pub(crate) fn register(
        self: &Arc<Self>,
        watcher: impl Fn(T) + Send + Sync + 'static,
    ) -> WatchHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(id, Arc::new(watcher));

        let registry: Weak<Watchers<T>> = Arc::downgrade(self);
        WatchHandle {
            cancel: Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.entries.lock().remove(&id);
                }
            }),
        }
    }

    /// Fire every registered watcher with `value`.
    ///
    /// The registry lock is released before anything runs: each watcher is
    /// handed its own clone of the value on its own task.
    pub(crate) fn notify(&self, value: T) {
        let snapshot: Vec<Watcher<T>> = self.entries.lock().values().cloned().collect();
        for watcher in snapshot {
            let value = value.clone();
            tokio::spawn(async move { watcher(value) });
        }
    }
}

/// Cancels one watcher registration.
///
/// [`cancel`](WatchHandle::cancel) removes the registration it was created
/// for; calling it again (or racing it against a concurrent `set`) is safe
/// and does nothing.
pub struct WatchHandle {
    cancel: Box<dyn Fn() + Send + Sync>,
}

impl WatchHandle {
    /// Remove the registration. Idempotent.
    pub fn cancel(&self) {
        (self.cancel)();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").finish_non_exhaustive()
    }
}

/// A mutex-guarded scalar with change notification.
pub struct Value<T> {
    current: Mutex<T>,
    watchers: Arc<Watchers<T>>,
}

impl<T: Clone + Send + 'static> Value<T> {
    /// Create a cell holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            current: Mutex::new(initial),
            watchers: Arc::new(Watchers::new()),
        }
    }

    /// A copy of the current value.
    pub fn get(&self) -> T {
        self.current.lock().clone()
    }

    /// Replace the value, then notify every watcher.
    ///
    /// Each watcher runs as an independently scheduled task; none of them
    /// have completed (or necessarily started) when `set` returns.
    pub fn set(&self, value: T) {
        *self.current.lock() = value.clone();
        self.watchers.notify(value);
    }

    /// Register a change watcher.
    ///
    /// The watcher fires on every subsequent [`set`](Self::set) until the
    /// returned handle is cancelled.
    pub fn on_change(&self, watcher: impl Fn(T) + Send + Sync + 'static) -> WatchHandle {
        self.watchers.register(watcher)
    }
}

impl<T: Clone + Send + Default + 'static> Default for Value<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Value")
            .field("current", &*self.current.lock())
            .finish_non_exhaustive()
    }
}
