//! # Tessera Engine
//!
//! The control plane: subsystems register with an [`Engine`], which drives
//! them through Init → Start → (wait for stop) → Stop in registration order.

pub mod engine;

pub use engine::{
    Engine, EngineError, Hook, Hooks, Phase, StopErrors, Subsystem, SubsystemState,
};

pub mod prelude {
    pub use super::{Engine, EngineError, Hooks, Subsystem};
}
