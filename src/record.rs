// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The replicated record: one timestamped update to one key path.
//!
//! Records are what travels between peers. The wire layout is the codec's
//! business ([`crate::codec`]); this type only fixes the three fields every
//! codec must round-trip faithfully: stamp, path, payload.

use crate::clock::Timestamp;
use serde::{Deserialize, Serialize};

/// A single timestamped update, addressed by key path.
///
/// For a fixed path the record with the strictly latest stamp wins; equal
/// stamps never overwrite. Records are self-contained - applying a set of
/// them in any delivery order converges to the same state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record<K, V> {
    /// Position in the last-write-wins ordering.
    pub stamp: Timestamp,
    /// Ordered sequence of keys addressing a tree location.
    pub path: Vec<K>,
    /// The new payload for that location.
    pub value: V,
}

impl<K, V> Record<K, V> {
    /// Create a record.
    pub fn new(stamp: Timestamp, path: Vec<K>, value: V) -> Self {
        Self { stamp, path, value }
    }

    /// Number of keys in the path (0 addresses the root).
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_depth() {
        let root = Record::new(Timestamp::from_micros(1), Vec::<String>::new(), 42);
        assert_eq!(root.depth(), 0);

        let nested = Record::new(
            Timestamp::from_micros(1),
            vec!["devices".to_string(), "lamp".to_string()],
            42,
        );
        assert_eq!(nested.depth(), 2);
    }

    #[test]
    fn test_record_serializes_all_fields() {
        let record = Record::new(
            Timestamp::from_micros(1_700_000_000_000_000),
            vec!["sensors".to_string(), "kitchen".to_string()],
            21.5f64,
        );

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("1700000000000000"));
        assert!(json.contains("sensors"));
        assert!(json.contains("kitchen"));
        assert!(json.contains("21.5"));

        let parsed: Record<String, f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
