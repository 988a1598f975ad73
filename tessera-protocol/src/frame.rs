//! ## tessera-protocol::frame
//! Length-prefixed frames: a 4-byte big-endian signed size followed by the
//! payload. Frames outside `1..=MAX_FRAME_SIZE` are rejected before any
//! payload byte is read.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Message, ProtocolError};

/// Largest accepted frame payload (4 MiB).
pub const MAX_FRAME_SIZE: i32 = 4 * 1024 * 1024;

const PREFIX_LEN: usize = 4;

#[inline]
pub fn is_frame_size_valid(size: i32) -> bool {
    size > 0 && size <= MAX_FRAME_SIZE
}

/// Serializes `messages` back-to-back and prepends the frame length.
pub fn encode(messages: &[Message]) -> Result<Bytes, ProtocolError> {
    let payload_len: usize = messages.iter().map(Message::encoded_len).sum();
    let size = i32::try_from(payload_len).map_err(|_| ProtocolError::SizeOverflow {
        field: "frame",
        len: payload_len,
    })?;

    let mut buf = BytesMut::with_capacity(PREFIX_LEN + payload_len);
    buf.put_i32(size);
    for message in messages {
        message.encode_into(&mut buf)?;
    }
    Ok(buf.freeze())
}

/// Reads one frame payload from `reader`.
///
/// Short reads are retried until the frame is complete or the stream
/// fails. An invalid size consumes only the 4-byte prefix.
pub async fn decode_frame<R>(reader: &mut R) -> Result<Bytes, ProtocolError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; PREFIX_LEN];
    reader.read_exact(&mut prefix).await?;

    let size = i32::from_be_bytes(prefix);
    if !is_frame_size_valid(size) {
        return Err(ProtocolError::InvalidFrameSize(size));
    }

    // Validated above: 0 < size <= MAX_FRAME_SIZE.
    let mut payload = vec![0u8; size as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}
