use std::io;

use thiserror::Error;

use tessera_core::GeneratorError;
use tessera_protocol::ProtocolError;

use crate::SocketIndex;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("Socket not found: {0}")]
    SocketNotFound(SocketIndex),

    #[error("Socket {0} is closed")]
    Closed(SocketIndex),

    #[error("Socket subsystem is not registered")]
    SubsystemUnavailable,

    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Cannot allocate socket index: {0}")]
    Index(#[from] GeneratorError),
}
