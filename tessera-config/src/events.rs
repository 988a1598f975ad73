//! Event bus configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Default, Serialize, Deserialize, Validate, Clone)]
pub struct EventBusConfig {
    /// Log every register, unregister and invoke at info level.
    #[serde(default)]
    pub debug: bool,
}
