//! Fuzz target for the wire codec.
//!
//! Feeds arbitrary bytes through `JsonCodec::decode` - it must reject or
//! accept, never panic, and never loop without consuming input.

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use strata_sync::JsonCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec: JsonCodec<String, serde_json::Value> = JsonCodec::new();
    let mut buf = BytesMut::from(data);

    // Ok(Some) consumed a frame; Ok(None) wants more input; Err is a
    // rejected frame. All three are fine - only a panic is a finding.
    while let Ok(Some(_)) = codec.decode(&mut buf) {}

    // Whatever is left must also not panic at end of stream.
    let _ = codec.decode_eof(&mut buf);
});
