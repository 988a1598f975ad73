//! # tessera-core
//!
//! Process-level primitives shared by every tessera service:
//!
//! - `events`: typed publish/subscribe bus with channel-scoped delivery
//! - `generator`: thread-safe monotonically increasing id source
//! - `routine`: crash-isolated task spawning with optional restart
//!
//! None of these depend on networking; the socket layer builds on them.

pub mod error;
pub mod events;
pub mod generator;
pub mod routine;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::generator::IncreaseGenerator;
}

pub use error::{EventError, GeneratorError};
