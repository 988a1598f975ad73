//! # Tessera Configuration System
//!
//! Layered, validated configuration for tessera services. Each subsystem
//! receives its typed section before `init`/`start`; nothing in the core
//! reads files or the environment on its own.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod events;
mod socket;
mod telemetry;
mod validation;

pub use error::ConfigError;
pub use events::EventBusConfig;
pub use socket::SocketConfig;
pub use telemetry::TelemetryConfig;

const BASE_FILE: &str = "config/tessera.yaml";
const ENV_PREFIX: &str = "TESSERA_";

/// Top‑level configuration container for all tessera components.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct TesseraConfig {
    /// Socket subsystem: listener and per-connection queues.
    #[validate(nested)]
    #[serde(default)]
    pub socket: SocketConfig,

    /// Event bus behaviour.
    #[validate(nested)]
    #[serde(default)]
    pub events: EventBusConfig,

    /// Logging.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl TesseraConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/tessera.yaml`, when present
    /// 3. `config/<TESSERA_ENV>.yaml`, when present (default environment `production`)
    /// 4. `TESSERA_*` environment variables, nested with `__`
    ///    (e.g. `TESSERA_SOCKET__LISTEN_PORT=9000`)
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(TesseraConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        }

        let env = std::env::var("TESSERA_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::extract(figment)
    }

    /// Load a specific file (plus the environment layer) on top of defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        let figment =
            Figment::from(Serialized::defaults(TesseraConfig::default())).merge(Yaml::file(path));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
