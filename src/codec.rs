//! Low-level MCS wire framing.
//!
//! An MCS connection opens with a single version byte, after which every
//! record on the wire is `tag:u8 | size:varint | body:[size]u8`. The size
//! field is a base-128 little-endian unsigned varint capped at five bytes,
//! which is sufficient for any `u32` payload length.
//!
//! This module owns the varint codec and frame assembly. Incremental frame
//! *reading* lives in [`crate::parser`], which drives these primitives from
//! its state machine.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Protocol version sent as the first byte of every fresh connection.
pub const MCS_VERSION: u8 = 41;

/// Older protocol revision still emitted by some MCS frontends; accepted on
/// read, never sent.
pub const MCS_VERSION_COMPAT: u8 = 38;

/// Maximum number of bytes a size varint may occupy.
///
/// Five groups of seven bits cover the full `u32` range; a sixth byte can
/// only mean a corrupt or hostile stream.
pub const MAX_VARINT_LEN: usize = 5;

/// Errors produced while reading wire primitives.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The underlying reader failed or reached end of stream mid-record.
    #[error("i/o error reading frame: {0}")]
    Io(#[from] std::io::Error),
    /// A size varint ran past [`MAX_VARINT_LEN`] bytes.
    #[error("malformed varint: continuation past {MAX_VARINT_LEN} bytes")]
    MalformedVarint,
}

/// Append `value` to `dst` as an unsigned LEB128 varint.
pub fn put_varint(dst: &mut BytesMut, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            dst.put_u8(byte);
            return;
        }
        dst.put_u8(byte | 0x80);
    }
}

/// Read an unsigned LEB128 varint from `reader`, one byte at a time.
///
/// # Errors
///
/// Returns [`CodecError::MalformedVarint`] if the continuation bit is still
/// set after [`MAX_VARINT_LEN`] bytes, or [`CodecError::Io`] on any read
/// failure (including a stream that ends mid-varint).
pub async fn read_varint<R>(reader: &mut R) -> Result<u32, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut value: u32 = 0;
    for index in 0..MAX_VARINT_LEN {
        let byte = reader.read_u8().await?;
        value |= u32::from(byte & 0x7f) << (7 * index);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(CodecError::MalformedVarint)
}

/// Assemble a `tag | varint(len) | body` frame.
#[must_use]
pub fn encode_frame(tag: u8, body: &[u8]) -> BytesMut {
    let mut frame = BytesMut::with_capacity(1 + MAX_VARINT_LEN + body.len());
    frame.put_u8(tag);
    put_varint(&mut frame, body.len() as u32);
    frame.extend_from_slice(body);
    frame
}

/// Assemble the one frame per connection that carries the version byte.
///
/// Only the first frame written on a fresh connection (the login request) is
/// prefixed this way; every later frame uses [`encode_frame`].
#[must_use]
pub fn encode_versioned_frame(tag: u8, body: &[u8]) -> BytesMut {
    let mut frame = BytesMut::with_capacity(2 + MAX_VARINT_LEN + body.len());
    frame.put_u8(MCS_VERSION);
    frame.extend_from_slice(&encode_frame(tag, body));
    frame
}
