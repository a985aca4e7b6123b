//! # strata-sync
//!
//! A hierarchical, key-addressed value store with fine-grained concurrent
//! access, change notification, and peer-to-peer replication that converges
//! independent replicas via last-write-wins.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           Synchronizer                              │
//! │                                                                     │
//! │  set(v, path) ──► ┌──────────┐  accepted  ┌───────────┐             │
//! │                   │ Tree     │───────────►│ Broadcast │──► outbound │
//! │  inbound ────────►│ (LWW per │            │ (fan-out) │    sessions │
//! │  sessions decode  │  path)   │            └───────────┘             │
//! │                   └──────────┘   stale records are discarded        │
//! └─────────────────────────────────────────────────────────────────────┘
//!         ▲                                            │
//!         └────────── peer byte streams (codec) ◄──────┘
//! ```
//!
//! Each accepted inbound record is republished to every other attached
//! session, so updates flood through the mesh without a coordinator: with
//! links A↔B and B↔C, an update at A reaches C through B.
//!
//! ## Components
//!
//! - [`Tree`] - recursive concurrency-safe store keyed by paths of opaque
//!   keys; every node independently guards its value slot and child map.
//! - [`Value`] - a mutex-guarded scalar with change watchers.
//! - [`Broadcast`] - single-producer fan-out with dynamic subscriptions and
//!   explicit per-consumer [`DeliveryPolicy`].
//! - [`Synchronizer`] - ties them together over pluggable codecs and
//!   caller-supplied duplex streams.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use strata_sync::Synchronizer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let local: Synchronizer<String, String> = Synchronizer::new();
//!
//!     // Wire up a peer stream (TCP, pipe, anything AsyncRead + AsyncWrite).
//!     let stream = tokio::net::TcpStream::connect("peer:4222").await.unwrap();
//!     let session = local.attach(stream);
//!
//!     let write = async {
//!         local
//!             .set("on".to_string(), &["lights".into(), "porch".into()])
//!             .await;
//!     };
//!
//!     // The session future runs until the stream fails; give it a task or
//!     // select it against your own shutdown.
//!     let (result, ()) = tokio::join!(session, write);
//!     eprintln!("session ended: {result:?}");
//! }
//! ```
//!
//! Transport setup, reconnection policy, and timestamp trust are the
//! embedding application's concerns; see the module docs for the
//! boundaries each component draws.

pub mod broadcast;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod metrics;
pub mod record;
pub mod sync;
pub mod tree;
pub mod value;

// Re-exports for convenience
pub use broadcast::{Broadcast, DeliveryPolicy, Subscriber};
pub use clock::{Clock, SystemClock, Timestamp};
pub use codec::JsonCodec;
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use record::Record;
pub use sync::{ApplyOutcome, Synchronizer};
pub use tree::Tree;
pub use value::{Value, WatchHandle};
