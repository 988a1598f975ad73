//! Event kinds the socket layer publishes, their payloads, and the channel
//! names they are scoped to.
//!
//! | Kind                    | Channels                              | Payload          |
//! |-------------------------|---------------------------------------|------------------|
//! | [`SocketConnected`]     | `socket-{index}`                      | [`SocketPayload`]|
//! | [`SocketMessageReceived`] | `socket-{index}`, `id-{message_id}` | [`SocketMessage`]|
//! | [`SocketDisconnected`]  | `socket-{index}`                      | [`SocketPayload`]|

use tessera_core::events::{parse_payload, EventKind, Payload};
use tessera_core::EventError;
use tessera_protocol::Message;

use crate::SocketIndex;

pub struct SocketConnected;

impl EventKind for SocketConnected {
    fn name() -> &'static str {
        "socket.connected"
    }
}

pub struct SocketMessageReceived;

impl EventKind for SocketMessageReceived {
    fn name() -> &'static str {
        "socket.message"
    }
}

pub struct SocketDisconnected;

impl EventKind for SocketDisconnected {
    fn name() -> &'static str {
        "socket.disconnected"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketPayload {
    pub socket_index: SocketIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketMessage {
    pub socket_index: SocketIndex,
    pub message: Message,
}

pub fn parse_socket(payload: &[Payload]) -> Result<&SocketPayload, EventError> {
    parse_payload(payload)
}

pub fn parse_socket_message(payload: &[Payload]) -> Result<&SocketMessage, EventError> {
    parse_payload(payload)
}

/// Per-connection channel.
pub fn socket_channel(index: SocketIndex) -> String {
    format!("socket-{}", index)
}

/// Per-message-kind channel.
pub fn message_channel(message_id: i32) -> String {
    format!("id-{}", message_id)
}
