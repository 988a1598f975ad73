use std::io;
use thiserror::Error;

/// Errors raised while framing or parsing wire data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame length prefix outside `1..=MAX_FRAME_SIZE`.
    #[error("invalid frame size: {0}")]
    InvalidFrameSize(i32),

    /// The buffer ended in the middle of a message field.
    #[error("truncated message: missing {field} ({needed} bytes needed, {remaining} remaining)")]
    TruncatedMessage {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// A length does not fit in the signed 32-bit size field.
    #[error("{field} length {len} overflows the size field")]
    SizeOverflow { field: &'static str, len: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// True when the peer closed the stream, cleanly or mid-frame.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(e) if matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            )
        )
    }
}
