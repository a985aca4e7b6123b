//! Configuration for the synchronizer.
//!
//! Tunables are passed to
//! [`Synchronizer::with_codec`](crate::sync::Synchronizer::with_codec) and
//! can be constructed programmatically or deserialized from JSON/TOML.
//!
//! # Quick Start
//!
//! ```rust
//! use strata_sync::config::SyncConfig;
//! use strata_sync::broadcast::DeliveryPolicy;
//!
//! let config = SyncConfig {
//!     delivery_policy: DeliveryPolicy::DropOldest,
//!     ..Default::default()
//! };
//! ```

use crate::broadcast::{DeliveryPolicy, DEFAULT_QUEUE_DEPTH};
use crate::codec::DEFAULT_MAX_FRAME_LEN;
use serde::{Deserialize, Serialize};

/// Tunable parameters for a [`Synchronizer`](crate::sync::Synchronizer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Queue depth for each outbound session's fan-out subscription.
    ///
    /// With [`DeliveryPolicy::Block`] this bounds how far one slow peer can
    /// lag before it backpressures every other session.
    #[serde(default = "default_fanout_queue_depth")]
    pub fanout_queue_depth: usize,

    /// What happens when an outbound session's queue fills.
    ///
    /// `Block` (the default) never loses an update but lets one stalled
    /// peer stall the mesh; the dropping policies keep the mesh moving and
    /// rely on later updates to re-converge the lagging peer.
    #[serde(default)]
    pub delivery_policy: DeliveryPolicy,

    /// Upper bound on a single encoded record, inbound or outbound.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

fn default_fanout_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}

fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fanout_queue_depth: DEFAULT_QUEUE_DEPTH,
            delivery_policy: DeliveryPolicy::Block,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl SyncConfig {
    /// Small queues and a small frame limit, for tests that want to hit the
    /// bounds quickly.
    pub fn for_testing() -> Self {
        Self {
            fanout_queue_depth: 4,
            delivery_policy: DeliveryPolicy::Block,
            max_frame_len: 64 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.fanout_queue_depth, DEFAULT_QUEUE_DEPTH);
        assert_eq!(config.delivery_policy, DeliveryPolicy::Block);
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME_LEN);
    }

    #[test]
    fn test_for_testing_is_small() {
        let config = SyncConfig::for_testing();
        assert!(config.fanout_queue_depth < DEFAULT_QUEUE_DEPTH);
        assert!(config.max_frame_len < DEFAULT_MAX_FRAME_LEN);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: SyncConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.fanout_queue_depth, DEFAULT_QUEUE_DEPTH);
        assert_eq!(config.delivery_policy, DeliveryPolicy::Block);
    }

    #[test]
    fn test_deserialize_policy_name() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"delivery_policy": "drop_oldest"}"#).unwrap();
        assert_eq!(config.delivery_policy, DeliveryPolicy::DropOldest);
    }
}
