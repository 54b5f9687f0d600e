// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire framing for strategy-set snapshots.
//!
//! ```text
//! [len: u32 BE][payload: len bytes of UTF-8 JSON, e.g. ["local","facebook"]]
//! ```
//!
//! Every frame carries a full snapshot, never a delta. The decoder keeps any
//! partial frame buffered until the rest of it arrives.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::error::{FrameError, ProtocolError};
use crate::set::StrategySet;

/// Size of the length header.
pub const HEADER_LEN: usize = 4;

/// Largest payload accepted from a peer.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Encode a strategy set as one complete frame.
pub fn encode(set: &StrategySet) -> Result<Bytes, ProtocolError> {
    let payload = serde_json::to_vec(set)?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|_| payload.len() <= MAX_FRAME_LEN)
        .ok_or(ProtocolError::TooLarge { len: payload.len(), max: MAX_FRAME_LEN })?;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u32(len);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Parse one frame payload into a strategy set. Duplicate names collapse.
pub fn parse_payload(payload: &[u8]) -> Result<StrategySet, ProtocolError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Splits a byte stream into frame payloads.
///
/// Use with [`tokio_util::codec::FramedRead`] to get a stream of payloads
/// from a socket, or call [`Decoder::decode`] directly on a buffer that
/// chunks are appended to.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder;

impl Decoder for FrameDecoder {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&src[..HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge { len, max: MAX_FRAME_LEN });
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        Ok(Some(src.split_to(len).freeze()))
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
