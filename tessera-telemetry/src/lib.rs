//! # Tessera Telemetry
//!
//! Logging setup and Prometheus counters for the socket layer.

pub mod logging;
pub mod metrics;

use thiserror::Error;

pub use logging::Logger;
pub use metrics::MetricsRecorder;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Metrics output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}
