//! Structured logging with `tracing`.

use tracing_subscriber::{fmt, EnvFilter};

use crate::TelemetryError;

#[derive(Clone, Debug)]
pub struct Logger;

impl Logger {
    /// Installs the global fmt subscriber. `RUST_LOG` takes precedence over
    /// `filter` when it is set.
    pub fn init(filter: &str, thread_names: bool) -> Result<(), TelemetryError> {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(from_env) => from_env,
            Err(_) => Self::filter(filter)?,
        };

        fmt()
            .with_env_filter(env_filter)
            .with_thread_names(thread_names)
            .try_init()
            .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

        tracing::debug!(filter, "Logger initialized");
        Ok(())
    }

    fn filter(directives: &str) -> Result<EnvFilter, TelemetryError> {
        EnvFilter::try_new(directives).map_err(|e| TelemetryError::InvalidFilter {
            filter: directives.to_string(),
            reason: e.to_string(),
        })
    }
}
