//! Centralizes the bincode configuration so every member encodes
//! [`PartyMessage`]s byte-for-byte the same way.
//!
//! # Examples
//!
//! ```
//! use party_special_sync::network::codec::{decode_message, encode_message};
//! use party_special_sync::{MemberId, PartyMessage, SpecialPercent, StateUpdate};
//!
//! let msg = PartyMessage::StateUpdate(StateUpdate {
//!     sender: MemberId::new(7),
//!     special: SpecialPercent::new(25).unwrap(),
//!     used_special: true,
//! });
//!
//! let bytes = encode_message(&msg).expect("encoding should succeed");
//! assert_eq!(decode_message(&bytes).expect("decoding should succeed"), msg);
//! ```

use std::fmt;

use crate::network::messages::PartyMessage;

// Fixed-size integers keep message sizes independent of the values carried.
fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Upper bound on the encoded size of any [`PartyMessage`], in bytes.
pub const MAX_MESSAGE_SIZE: usize = 32;

/// What the codec was doing when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecOperation {
    /// Encoding a party message.
    EncodeMessage,
    /// Decoding a party message.
    DecodeMessage,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeMessage => write!(f, "encoding party message"),
            Self::DecodeMessage => write!(f, "decoding party message"),
        }
    }
}

/// Errors that can occur during encoding or decoding.
///
/// bincode errors only expose a human-readable message, so that message is
/// kept as a `String`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The encoding operation failed.
    EncodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The decoding operation failed.
    DecodeError {
        /// The underlying bincode error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// A message decoded cleanly but did not use the whole buffer.
    TrailingBytes {
        /// Bytes the message used.
        consumed: usize,
        /// Bytes that were provided.
        provided: usize,
    },
}

impl CodecError {
    /// Creates a new encode error with the given message and operation.
    pub fn encode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::EncodeError {
            message: message.into(),
            operation,
        }
    }

    /// Creates a new decode error with the given message and operation.
    pub fn decode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::DecodeError {
            message: message.into(),
            operation,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeError { message, operation } => {
                write!(f, "encoding failed while {operation}: {message}")
            },
            Self::DecodeError { message, operation } => {
                write!(f, "decoding failed while {operation}: {message}")
            },
            Self::TrailingBytes { consumed, provided } => write!(
                f,
                "message used {consumed} of {provided} bytes; trailing data rejected"
            ),
        }
    }
}

impl std::error::Error for CodecError {}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes a [`PartyMessage`] into a new buffer.
pub fn encode_message(msg: &PartyMessage) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(msg, config())
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::EncodeMessage))
}

/// Decodes exactly one [`PartyMessage`] from `bytes`.
///
/// # Errors
///
/// Fails on malformed input, on an energy value outside `0..=100`, and on
/// trailing bytes after the message.
pub fn decode_message(bytes: &[u8]) -> CodecResult<PartyMessage> {
    let (msg, consumed): (PartyMessage, usize) =
        bincode::serde::decode_from_slice(bytes, config())
            .map_err(|e| CodecError::decode(e.to_string(), CodecOperation::DecodeMessage))?;
    if consumed != bytes.len() {
        return Err(CodecError::TrailingBytes {
            consumed,
            provided: bytes.len(),
        });
    }
    Ok(msg)
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::network::messages::{StateUpdate, StopTracking};
    use crate::{MemberId, SpecialPercent};

    fn update(special: u8) -> PartyMessage {
        PartyMessage::StateUpdate(StateUpdate {
            sender: MemberId::new(42),
            special: SpecialPercent::new(special).unwrap(),
            used_special: true,
        })
    }

    #[test]
    fn messages_fit_in_max_size() {
        for msg in [
            update(100),
            PartyMessage::StopTracking(StopTracking {
                sender: MemberId::new(u64::MAX),
            }),
        ] {
            let bytes = encode_message(&msg).unwrap();
            assert!(bytes.len() <= MAX_MESSAGE_SIZE);
            assert_eq!(decode_message(&bytes).unwrap(), msg);
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        assert_eq!(encode_message(&update(10)).unwrap(), encode_message(&update(10)).unwrap());
    }

    #[test]
    fn encoded_size_does_not_depend_on_values() {
        assert_eq!(
            encode_message(&update(0)).unwrap().len(),
            encode_message(&update(100)).unwrap().len()
        );
    }

    #[test]
    fn out_of_range_special_is_rejected() {
        let mut bytes = encode_message(&update(100)).unwrap();
        // The percentage sits right before the trailing bool.
        let special_at = bytes.len() - 2;
        assert_eq!(bytes[special_at], 100);
        bytes[special_at] = 101;

        let err = decode_message(&bytes).unwrap_err();
        assert!(matches!(
            err,
            CodecError::DecodeError {
                operation: CodecOperation::DecodeMessage,
                ..
            }
        ));
    }

    #[test]
    fn truncated_message_is_rejected() {
        let bytes = encode_message(&update(50)).unwrap();
        assert!(decode_message(&bytes[..bytes.len() - 1]).is_err());
        assert!(decode_message(&[]).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode_message(&update(50)).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_message(&bytes),
            Err(CodecError::TrailingBytes { .. })
        ));
    }

    #[test]
    fn error_display_names_operation() {
        let err = CodecError::decode("bad tag", CodecOperation::DecodeMessage);
        assert_eq!(
            err.to_string(),
            "decoding failed while decoding party message: bad tag"
        );
        let err = CodecError::TrailingBytes {
            consumed: 18,
            provided: 19,
        };
        assert_eq!(
            err.to_string(),
            "message used 18 of 19 bytes; trailing data rejected"
        );
    }
}
