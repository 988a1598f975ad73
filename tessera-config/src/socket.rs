//! Socket subsystem configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::validate_bind_address;

/// Listener and per-connection settings.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct SocketConfig {
    /// Port to accept connections on. `None` disables the listener; the
    /// subsystem can still open outbound connections.
    #[serde(default)]
    pub listen_port: Option<u16>,

    /// Address the listener binds to.
    #[validate(custom(function = "validate_bind_address"))]
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Bounded outbound queue per socket. A full queue blocks the sender.
    #[validate(range(min = 1, max = 65536))]
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            listen_port: None,
            bind_address: default_bind_address(),
            send_queue_capacity: default_send_queue_capacity(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".into()
}

fn default_send_queue_capacity() -> usize {
    100
}
