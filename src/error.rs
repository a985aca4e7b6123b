// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the synchronization core.
//!
//! Errors are categorized by where a peer session fails: decoding an inbound
//! record, encoding or writing an outbound record, or the raw stream itself.
//! A stale inbound record is deliberately NOT an error - see
//! [`crate::sync::ApplyOutcome::Stale`].
//!
//! # Error Categories
//!
//! | Error Type | Connection loss | Description |
//! |-------------------|-----------------|----------------------------------------------|
//! | `Decode` | No | Malformed or truncated inbound record |
//! | `Encode` | No | A record could not be serialized |
//! | `Io` | Yes | The underlying stream failed (read or write) |
//! | `BroadcastClosed` | No | The local fan-out shut down mid-session |
//!
//! # Propagation
//!
//! Every variant terminates exactly one peer session and is returned to that
//! session's caller. The core never retries or reconnects - resilience policy
//! belongs to the embedding application. Use
//! [`SyncError::is_connection_loss()`] to decide whether a failed session is
//! worth re-establishing on a fresh stream.

use thiserror::Error;

/// Result type alias for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can terminate a peer session.
///
/// Each variant carries enough context to log the failure. A failure in one
/// session never affects another session or the tree's consistency.
#[derive(Error, Debug)]
pub enum SyncError {
    /// An inbound record could not be decoded.
    ///
    /// The frame was malformed, oversized, or truncated at end of stream.
    /// The data is corrupt at the source; re-reading will not help.
    #[error("decode error: {0}")]
    Decode(String),

    /// An outbound record could not be serialized.
    ///
    /// Indicates a payload the codec cannot represent. The record is
    /// not written and the outbound session terminates.
    #[error("encode error: {0}")]
    Encode(String),

    /// The underlying byte stream failed.
    ///
    /// Raised by either side of a session: a read error in the decode task
    /// or a rejected write in the encode task. Whether to open a new stream
    /// is the caller's decision.
    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),

    /// The local fan-out closed while a session was attached.
    ///
    /// Only happens when the synchronizer owning the session is torn down;
    /// the session ends cleanly from the peer's point of view.
    #[error("broadcast closed")]
    BroadcastClosed,
}

impl SyncError {
    /// Check whether this error indicates the peer connection itself is gone.
    ///
    /// `Io` failures mean the stream died and a caller with a resilience
    /// policy may dial again. `Decode`/`Encode` mean the data is bad and a
    /// new connection would fail the same way.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
