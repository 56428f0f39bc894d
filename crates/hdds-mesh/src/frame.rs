// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Datagram framing.
//!
//! A mesh event travels as one UDP payload:
//!
//! ```text
//! +-------------+----+------------+----+
//! | topic bytes | \0 | data bytes | \0 |
//! +-------------+----+------------+----+
//! ```
//!
//! No length prefix, version or checksum. The receiver finds the boundary by
//! scanning for the first NUL.

use crate::config::MAX_PACKET_LEN;
use crate::error::{Error, Result};

/// Decoded view of a received datagram, borrowed from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Event name.
    pub topic: &'a str,
    /// Event payload.
    pub data: &'a str,
}

/// Encoded length of `(topic, data)` including both terminators.
pub const fn encoded_len(topic: &str, data: &str) -> usize {
    topic.len() + 1 + data.len() + 1
}

/// Append the frame for `(topic, data)` to `buf`.
///
/// Rejects NUL bytes inside either field and frames above [`MAX_PACKET_LEN`].
pub fn encode_into(topic: &str, data: &str, buf: &mut Vec<u8>) -> Result<()> {
    if topic.as_bytes().contains(&0) || data.as_bytes().contains(&0) {
        return Err(Error::EmbeddedNul);
    }
    let len = encoded_len(topic, data);
    if len > MAX_PACKET_LEN {
        return Err(Error::FrameTooLarge {
            len,
            max: MAX_PACKET_LEN,
        });
    }

    buf.reserve(len);
    buf.extend_from_slice(topic.as_bytes());
    buf.push(0);
    buf.extend_from_slice(data.as_bytes());
    buf.push(0);
    Ok(())
}

/// Encode `(topic, data)` into a fresh buffer.
pub fn encode(topic: &str, data: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(encoded_len(topic, data));
    encode_into(topic, data, &mut buf)?;
    Ok(buf)
}

/// Split a received datagram into topic and data.
///
/// Both fields must be NUL-terminated inside the datagram and UTF-8,
/// otherwise the frame is rejected with [`Error::MalformedFrame`]. A missing
/// data terminator means the datagram was cut short. Bytes after the data
/// terminator are ignored.
pub fn decode(datagram: &[u8]) -> Result<Frame<'_>> {
    let topic_end = datagram
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::MalformedFrame)?;
    let rest = &datagram[topic_end + 1..];
    let data_end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::MalformedFrame)?;

    let topic = std::str::from_utf8(&datagram[..topic_end]).map_err(|_| Error::MalformedFrame)?;
    let data = std::str::from_utf8(&rest[..data_end]).map_err(|_| Error::MalformedFrame)?;
    Ok(Frame { topic, data })
}
