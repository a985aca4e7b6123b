//! Timestamps and the pluggable clock behind last-write-wins.
//!
//! Conflict resolution compares [`Timestamp`]s, so convergence depends
//! entirely on where those timestamps come from. The [`Clock`] trait makes
//! that source explicit: production code uses [`SystemClock`] (wall clock,
//! microsecond resolution), tests inject a deterministic counter. Replicas
//! only need timestamps drawn from a consistent ordering - they do not need
//! to agree on absolute time, a skewed peer just wins or loses conflicts it
//! "shouldn't".

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A point in the ordering used for last-write-wins conflict resolution.
///
/// Microseconds since the Unix epoch under [`SystemClock`]; an opaque
/// monotonic counter under a logical clock. Only the ordering matters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The zero timestamp, older than anything a real clock produces.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Build a timestamp from raw microseconds.
    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// Raw microsecond value.
    pub const fn as_micros(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of timestamps for locally originated updates.
///
/// Passed to the synchronizer at construction so the ordering source is an
/// explicit, swappable collaborator rather than ambient process state.
pub trait Clock: Send + Sync {
    /// The current instant in this clock's ordering.
    fn now(&self) -> Timestamp;
}

/// Wall-clock timestamps from [`SystemTime`].
///
/// The default. A clock that jumps backwards cannot corrupt state - stale
/// stamps lose the last-write-wins comparison - but it can make fresh local
/// writes lose to older remote ones until the clock catches up.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        Timestamp(micros)
    }
}
