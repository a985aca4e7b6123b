// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Wire codec for replicated records.
//!
//! The pluggable codec boundary is `tokio_util`'s [`Decoder`]/[`Encoder`]
//! pair over [`Record`]: any implementation that round-trips the three
//! record fields and reports [`SyncError`]s can drive a peer session.
//!
//! [`JsonCodec`] is the shipped default: each record is a u32 big-endian
//! length prefix followed by a JSON body. Self-delimiting, symmetric for
//! both directions, and readable on the wire when debugging. A frame longer
//! than the configured limit is rejected before any allocation for it.

use crate::error::SyncError;
use crate::record::Record;
use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tokio_util::codec::{Decoder, Encoder};

/// Frame length limit used by [`JsonCodec::new`] (8 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Length prefix size in bytes.
const HEADER_LEN: usize = 4;

/// Length-prefixed JSON codec for [`Record`]s.
pub struct JsonCodec<K, V> {
    max_frame_len: usize,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> JsonCodec<K, V> {
    /// Codec with the default frame limit.
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Codec with an explicit frame limit.
    ///
    /// Inbound frames announcing more than `max_frame_len` bytes and
    /// outbound records serializing past it both fail the session.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            _marker: PhantomData,
        }
    }
}

impl<K, V> Default for JsonCodec<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for JsonCodec<K, V> {
    fn clone(&self) -> Self {
        Self {
            max_frame_len: self.max_frame_len,
            _marker: PhantomData,
        }
    }
}

impl<K, V> std::fmt::Debug for JsonCodec<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonCodec")
            .field("max_frame_len", &self.max_frame_len)
            .finish()
    }
}

impl<K, V> Decoder for JsonCodec<K, V>
where
    K: DeserializeOwned,
    V: DeserializeOwned,
{
    type Item = Record<K, V>;
    type Error = SyncError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&src[..HEADER_LEN]);
        let frame_len = u32::from_be_bytes(header) as usize;
        if frame_len > self.max_frame_len {
            return Err(SyncError::Decode(format!(
                "frame of {} bytes exceeds limit of {}",
                frame_len, self.max_frame_len
            )));
        }

        if src.len() < HEADER_LEN + frame_len {
            // Partial frame; reserve what we know is coming and wait.
            src.reserve(HEADER_LEN + frame_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let body = src.split_to(frame_len);
        let record = serde_json::from_slice(&body)
            .map_err(|e| SyncError::Decode(format!("malformed record body: {e}")))?;
        Ok(Some(record))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(record) => Ok(Some(record)),
            None if buf.is_empty() => Ok(None),
            None => Err(SyncError::Decode(format!(
                "stream ended inside a frame ({} trailing bytes)",
                buf.len()
            ))),
        }
    }
}

impl<K, V> Encoder<Record<K, V>> for JsonCodec<K, V>
where
    K: Serialize,
    V: Serialize,
{
    type Error = SyncError;

    fn encode(&mut self, record: Record<K, V>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&record)
            .map_err(|e| SyncError::Encode(format!("unserializable record: {e}")))?;
        if body.len() > self.max_frame_len {
            return Err(SyncError::Encode(format!(
                "record of {} bytes exceeds frame limit of {}",
                body.len(),
                self.max_frame_len
            )));
        }

        dst.reserve(HEADER_LEN + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}
