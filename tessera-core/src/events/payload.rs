//! Positional event payloads. The bus does not type payloads per kind;
//! listeners pull values out by position with [`parse_payload_index`],
//! which reports a mismatch as an [`EventError`] instead of panicking.

use std::any::{type_name, Any};
use std::sync::Arc;

use crate::EventError;

pub type Payload = Arc<dyn Any + Send + Sync>;

#[inline]
pub fn payload<T: Any + Send + Sync>(value: T) -> Payload {
    Arc::new(value)
}

pub fn parse_payload_index<T: Any>(payload: &[Payload], index: usize) -> Result<&T, EventError> {
    let element = payload.get(index).ok_or(EventError::IndexOutOfRange {
        index,
        len: payload.len(),
    })?;
    (**element)
        .downcast_ref::<T>()
        .ok_or(EventError::InvalidPayloadType {
            index,
            expected: type_name::<T>(),
        })
}

/// First payload element as `T`.
pub fn parse_payload<T: Any>(payload: &[Payload]) -> Result<&T, EventError> {
    parse_payload_index(payload, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Login {
        user: String,
    }

    #[test]
    fn extracts_by_position() {
        let values = [payload(7u32), payload(Login { user: "ada".into() })];
        assert_eq!(parse_payload::<u32>(&values), Ok(&7));
        assert_eq!(
            parse_payload_index::<Login>(&values, 1).unwrap().user,
            "ada"
        );
    }

    #[test]
    fn wrong_type_is_an_error() {
        let values = [payload("text")];
        let err = parse_payload::<u32>(&values).unwrap_err();
        assert_eq!(
            err,
            EventError::InvalidPayloadType {
                index: 0,
                expected: "u32"
            }
        );
    }

    #[test]
    fn missing_element_is_an_error() {
        let values = [payload(1u8)];
        assert_eq!(
            parse_payload_index::<u8>(&values, 3).unwrap_err(),
            EventError::IndexOutOfRange { index: 3, len: 1 }
        );
        assert_eq!(
            parse_payload::<u8>(&[]).unwrap_err(),
            EventError::IndexOutOfRange { index: 0, len: 0 }
        );
    }
}
