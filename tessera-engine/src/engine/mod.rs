mod error;
mod runtime;
mod subsystem;

pub use self::{
    error::{EngineError, StopErrors},
    runtime::{Engine, Hook, Hooks, Phase},
    subsystem::{Subsystem, SubsystemState},
};
