use thiserror::Error;

/// Failures extracting a typed value from an event payload.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("payload index {index} out of range [0,{len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid payload type at index {index}, expected {expected}")]
    InvalidPayloadType {
        index: usize,
        expected: &'static str,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GeneratorError {
    #[error("generator step must be positive")]
    InvalidStep,

    #[error("generator exhausted its value range")]
    Exhausted,
}
