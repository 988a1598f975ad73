use thiserror::Error;

use tessera_config::ConfigError;
use tessera_engine::EngineError;
use tessera_socket::SocketError;
use tessera_telemetry::TelemetryError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error("Engine task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("No reply within {0} ms")]
    Timeout(u64),

    #[error("Connection closed before a reply arrived")]
    NoReply,
}
