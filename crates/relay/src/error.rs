// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::server::ConnectionId;

/// A strategy set that cannot be carried in a frame.
///
/// On receive the offending frame is dropped; the rest of the stream is
/// still usable.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed strategy payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("encoded set of {len} bytes exceeds the {max} byte frame limit")]
    TooLarge { len: usize, max: usize },
}

/// Framing failure that leaves the stream unusable.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A broadcast target that can no longer accept frames.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
}
