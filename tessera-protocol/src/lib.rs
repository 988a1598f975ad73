//! # Tessera Wire Protocol
//!
//! Bit-exact codec for the persistent-TCP protocol spoken between tessera
//! peers. Pure transformation: no state, no retries. Resilience lives in
//! the socket layer.
//!
//! ```text
//! frame   := size:i32be payload[size]            (0 < size <= 4 MiB)
//! payload := message+                            (no trailing bytes)
//! message := uid_size:i32be uid[uid_size]
//!            request_id:i16be response_id:i16be
//!            message_id:i32be
//!            data_size:i32be data[data_size]
//! ```

pub mod error;
pub mod frame;
pub mod message;

pub use error::ProtocolError;
pub use frame::{decode_frame, encode, is_frame_size_valid, MAX_FRAME_SIZE};
pub use message::{decode_messages, Message, NO_CORRELATION};
