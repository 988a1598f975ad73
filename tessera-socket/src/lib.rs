//! # Tessera Sockets
//!
//! Persistent TCP connections speaking the tessera wire protocol. Each
//! connection is a [`Socket`] with its own receive and send loops; inbound
//! messages are published on the engine's event bus (see [`events`]) and
//! handlers answer through [`send_message`] or [`SocketSubsystem::send`].
//!
//! ```no_run
//! use tessera_socket::events::{parse_socket_message, SocketMessageReceived};
//! # fn wire(engine: &tessera_engine::Engine) {
//! let on_ping = tessera_core::events::FnListener::new("ping", |_, payload| {
//!     if let Ok(received) = parse_socket_message(payload) {
//!         println!("ping from socket {}", received.socket_index);
//!     }
//! });
//! engine
//!     .events()
//!     .register::<SocketMessageReceived>(&on_ping, &["id-1"]);
//! # }
//! ```

pub mod error;
pub mod events;
pub mod socket;
pub mod subsystem;

use bytes::Bytes;
use std::sync::Arc;

use tessera_engine::Engine;

pub use error::SocketError;
pub use socket::{Socket, SocketState};
pub use subsystem::SocketSubsystem;

/// Generator-issued connection id, unique for the registry's lifetime.
pub type SocketIndex = i32;

fn subsystem(engine: &Engine) -> Result<Arc<SocketSubsystem>, SocketError> {
    engine
        .subsystem::<SocketSubsystem>()
        .ok_or(SocketError::SubsystemUnavailable)
}

/// Dials `host:port` through the engine's socket subsystem.
pub async fn connect(engine: &Engine, host: &str, port: u16) -> Result<SocketIndex, SocketError> {
    subsystem(engine)?.connect(host, port).await
}

/// Sends one uncorrelated message on socket `index`.
pub async fn send_message(
    engine: &Engine,
    index: SocketIndex,
    message_id: i32,
    data: impl Into<Bytes>,
) -> Result<(), SocketError> {
    subsystem(engine)?.send(index, message_id, data).await
}
