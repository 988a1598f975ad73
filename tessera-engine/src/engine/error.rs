use std::fmt;

use thiserror::Error;

use super::runtime::Phase;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Cannot register subsystem '{0}': registration is closed")]
    RegistrationClosed(String),

    #[error("Subsystem '{0}' is already registered")]
    DuplicateSubsystem(String),

    #[error("Cannot {operation} while the engine is {phase:?}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
    },

    #[error("{stage} hook failed: {source}")]
    Hook {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Subsystem '{subsystem}' failed to init: {source}")]
    Init {
        subsystem: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Subsystem '{subsystem}' failed to start: {source}")]
    Start {
        subsystem: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Stop failed:\n{0}")]
    Stop(StopErrors),

    #[error("Subsystem not found: {0}")]
    SubsystemNotFound(String),
}

/// Every subsystem that failed to stop, in stop order.
#[derive(Debug, Default)]
pub struct StopErrors {
    errors: Vec<(String, anyhow::Error)>,
}

impl StopErrors {
    pub(crate) fn push(&mut self, subsystem: String, error: anyhow::Error) {
        self.errors.push((subsystem, error));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn subsystems(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &anyhow::Error)> {
        self.errors.iter().map(|(name, error)| (name.as_str(), error))
    }
}

impl fmt::Display for StopErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (subsystem, error)) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}", subsystem, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for StopErrors {}
