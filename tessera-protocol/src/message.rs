//! ## tessera-protocol::message
//! Logical messages ("packets") packed back-to-back inside a frame payload.
//!
//! Size fields are derived from the field contents on encode, so a
//! [`Message`] can never disagree with its own header. On decode a
//! non-positive size yields an empty field.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ProtocolError;

/// Request/response id used when a message is not part of an exchange.
pub const NO_CORRELATION: i16 = -1;

/// Fixed part of a message: four size/id words plus two correlation ids.
const HEADER_LEN: usize = 4 + 2 + 2 + 4 + 4;

/// One decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Opaque correlation token; may be empty.
    pub unique_id: Bytes,
    pub request_id: i16,
    pub response_id: i16,
    /// Application-defined message kind.
    pub message_id: i32,
    /// Serialized application payload, opaque to the protocol.
    pub data: Bytes,
}

impl Message {
    /// Uncorrelated message: empty unique id, request/response ids of -1.
    pub fn new(message_id: i32, data: impl Into<Bytes>) -> Self {
        Self {
            unique_id: Bytes::new(),
            request_id: NO_CORRELATION,
            response_id: NO_CORRELATION,
            message_id,
            data: data.into(),
        }
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<Bytes>) -> Self {
        self.unique_id = unique_id.into();
        self
    }

    pub fn with_correlation(mut self, request_id: i16, response_id: i16) -> Self {
        self.request_id = request_id;
        self.response_id = response_id;
        self
    }

    /// Number of bytes this message occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.unique_id.len() + self.data.len()
    }

    /// Appends the wire form of this message to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let unique_id_size = size_field("unique_id", self.unique_id.len())?;
        let data_size = size_field("proto_data", self.data.len())?;

        buf.reserve(self.encoded_len());
        buf.put_i32(unique_id_size);
        buf.put_slice(&self.unique_id);
        buf.put_i16(self.request_id);
        buf.put_i16(self.response_id);
        buf.put_i32(self.message_id);
        buf.put_i32(data_size);
        buf.put_slice(&self.data);
        Ok(())
    }

    /// Parses one message from the front of `buf`, advancing past it.
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let unique_id_size = take_i32(buf, "unique_id_size")?;
        let unique_id = take_bytes(buf, unique_id_size, "unique_id")?;
        let request_id = take_i16(buf, "request_id")?;
        let response_id = take_i16(buf, "response_id")?;
        let message_id = take_i32(buf, "message_id")?;
        let data_size = take_i32(buf, "proto_size")?;
        let data = take_bytes(buf, data_size, "proto_data")?;

        Ok(Self {
            unique_id,
            request_id,
            response_id,
            message_id,
            data,
        })
    }
}

/// Splits a frame payload into its messages.
///
/// Parsing continues until the buffer is exhausted; any partial trailing
/// message fails the whole payload.
pub fn decode_messages(mut payload: Bytes) -> Result<Vec<Message>, ProtocolError> {
    let mut messages = Vec::new();
    while payload.has_remaining() {
        messages.push(Message::decode(&mut payload)?);
    }
    Ok(messages)
}

fn size_field(field: &'static str, len: usize) -> Result<i32, ProtocolError> {
    i32::try_from(len).map_err(|_| ProtocolError::SizeOverflow { field, len })
}

fn ensure(buf: &Bytes, needed: usize, field: &'static str) -> Result<(), ProtocolError> {
    if buf.remaining() < needed {
        return Err(ProtocolError::TruncatedMessage {
            field,
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

fn take_i16(buf: &mut Bytes, field: &'static str) -> Result<i16, ProtocolError> {
    ensure(buf, 2, field)?;
    Ok(buf.get_i16())
}

fn take_i32(buf: &mut Bytes, field: &'static str) -> Result<i32, ProtocolError> {
    ensure(buf, 4, field)?;
    Ok(buf.get_i32())
}

fn take_bytes(buf: &mut Bytes, size: i32, field: &'static str) -> Result<Bytes, ProtocolError> {
    let Ok(len) = usize::try_from(size) else {
        return Ok(Bytes::new());
    };
    ensure(buf, len, field)?;
    Ok(buf.split_to(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn concat(messages: &[Message]) -> Bytes {
        let mut buf = BytesMut::new();
        for message in messages {
            message.encode_into(&mut buf).unwrap();
        }
        buf.freeze()
    }

    #[test]
    fn encodes_fields_in_wire_order() {
        let message = Message::new(42, &b"hi"[..])
            .with_unique_id(&b"u"[..])
            .with_correlation(7, -1);
        let bytes = concat(&[message.clone()]);

        let mut expected: Vec<u8> = Vec::new();
        expected.extend_from_slice(&[0, 0, 0, 1]); // unique_id_size
        expected.extend_from_slice(b"u");
        expected.extend_from_slice(&[0, 7]); // request_id
        expected.extend_from_slice(&[0xFF, 0xFF]); // response_id
        expected.extend_from_slice(&[0, 0, 0, 42]); // message_id
        expected.extend_from_slice(&[0, 0, 0, 2]); // proto_size
        expected.extend_from_slice(b"hi");
        assert_eq!(&bytes[..], &expected[..]);
        assert_eq!(bytes.len(), message.encoded_len());
    }

    #[test]
    fn uncorrelated_message_defaults() {
        let message = Message::new(3, Bytes::new());
        assert_eq!(message.request_id, NO_CORRELATION);
        assert_eq!(message.response_id, NO_CORRELATION);
        assert!(message.unique_id.is_empty());
    }

    #[test]
    fn decodes_several_messages_from_one_payload() {
        let messages = vec![
            Message::new(1, &b"first"[..]),
            Message::new(2, Bytes::new()),
            Message::new(3, &b"third"[..]).with_unique_id(&b"abc"[..]),
        ];
        let decoded = decode_messages(concat(&messages)).unwrap();
        assert_eq!(decoded, messages);
    }

    #[test]
    fn missing_payload_bytes_are_truncation() {
        let bytes = concat(&[Message::new(9, &b"hello"[..])]);
        let cut = bytes.slice(..bytes.len() - 2);
        let result = decode_messages(cut);
        assert!(matches!(
            result,
            Err(ProtocolError::TruncatedMessage {
                field: "proto_data",
                needed: 5,
                remaining: 3
            })
        ));
    }

    #[test]
    fn trailing_partial_header_is_truncation() {
        let mut buf = BytesMut::from(&concat(&[Message::new(1, &b"x"[..])])[..]);
        buf.put_slice(&[0, 0]);
        let result = decode_messages(buf.freeze());
        assert!(matches!(
            result,
            Err(ProtocolError::TruncatedMessage {
                field: "unique_id_size",
                ..
            })
        ));
    }

    #[test]
    fn negative_sizes_decode_as_empty_fields() {
        let mut buf = BytesMut::new();
        buf.put_i32(-1);
        buf.put_i16(-1);
        buf.put_i16(-1);
        buf.put_i32(5);
        buf.put_i32(-20);
        let decoded = decode_messages(buf.freeze()).unwrap();
        assert_eq!(decoded, vec![Message::new(5, Bytes::new())]);
    }

    #[test]
    fn empty_payload_has_no_messages() {
        assert!(decode_messages(Bytes::new()).unwrap().is_empty());
    }

    fn arb_message() -> impl Strategy<Value = Message> {
        (
            proptest::collection::vec(any::<u8>(), 0..16),
            any::<i16>(),
            any::<i16>(),
            any::<i32>(),
            proptest::collection::vec(any::<u8>(), 0..512),
        )
            .prop_map(|(uid, request_id, response_id, message_id, data)| {
                Message::new(message_id, data)
                    .with_unique_id(uid)
                    .with_correlation(request_id, response_id)
            })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(messages in proptest::collection::vec(arb_message(), 0..8)) {
            let decoded = decode_messages(concat(&messages)).unwrap();
            prop_assert_eq!(decoded, messages);
        }
    }
}
