//! CRDT delta bytes ↔ JSON-transportable integer arrays.
//!
//! The bus carries payloads as JSON, so binary deltas travel as arrays
//! of integers. Decoding is strict: an element outside `0..=255` marks
//! the whole payload malformed rather than being truncated into a byte.
//! The zero-length payload is a valid no-op delta and round-trips to an
//! empty buffer.

use thiserror::Error;

/// A wire payload that does not describe a byte sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("update element {value} at index {index} is not a byte")]
    OutOfRange { index: usize, value: i64 },
}

/// Encode delta bytes as a JSON-safe integer array.
pub fn encode(bytes: &[u8]) -> Vec<i64> {
    bytes.iter().map(|&b| i64::from(b)).collect()
}

/// Decode a wire integer array back into delta bytes.
pub fn decode(wire: &[i64]) -> Result<Vec<u8>, CodecError> {
    wire.iter()
        .enumerate()
        .map(|(index, &value)| {
            u8::try_from(value).map_err(|_| CodecError::OutOfRange { index, value })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let payload = vec![0u8, 1, 42, 127, 128, 254, 255];
        assert_eq!(decode(&encode(&payload)).unwrap(), payload);
    }

    #[test]
    fn test_empty_roundtrip() {
        assert_eq!(encode(&[]), Vec::<i64>::new());
        assert_eq!(decode(&[]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert_eq!(
            decode(&[1, 256, 3]),
            Err(CodecError::OutOfRange {
                index: 1,
                value: 256
            })
        );
        assert_eq!(
            decode(&[-1]),
            Err(CodecError::OutOfRange {
                index: 0,
                value: -1
            })
        );
    }
}
