//! Observability configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::validate_log_filter;

/// Logging parameters handed to `tessera_telemetry::Logger`.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TelemetryConfig {
    /// `tracing_subscriber::EnvFilter` directives. `RUST_LOG` wins when set.
    #[validate(custom(function = "validate_log_filter"))]
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Include thread names in log lines.
    #[serde(default = "default_thread_names")]
    pub thread_names: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            thread_names: default_thread_names(),
        }
    }
}

fn default_log_filter() -> String {
    "info".into()
}

fn default_thread_names() -> bool {
    true
}
