//! Errors returned while building trackers, validating settings, and
//! encoding or decoding party messages.

use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::network::codec::CodecError;

/// This enum contains all error messages this library can return.
///
/// Runtime tracking never fails: dropped messages, unknown leavers and
/// suppressed sends degrade to no-ops. Errors are only produced while
/// building a tracker, validating configuration, converting raw readouts,
/// or encoding and decoding wire messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncError {
    /// The provided [`TrackerConfig`] breaks one of its constraints.
    ///
    /// [`TrackerConfig`]: crate::TrackerConfig
    InvalidConfig {
        /// Further specifies which constraint was broken.
        info: String,
    },
    /// A raw special value could not be converted to a percentage.
    InvalidSpecialValue {
        /// The rejected value as it was reported.
        raw: i64,
    },
    /// Serialization or deserialization of a party message failed.
    Serialization {
        /// A description of what failed to serialize/deserialize.
        context: String,
    },
}

impl Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::InvalidConfig { info } => {
                write!(f, "Invalid tracker configuration: {}", info)
            },
            SyncError::InvalidSpecialValue { raw } => {
                write!(f, "Special value {} is outside the range 0..=100", raw)
            },
            SyncError::Serialization { context } => {
                write!(f, "Serialization error: {}", context)
            },
        }
    }
}

impl Error for SyncError {}

impl From<CodecError> for SyncError {
    fn from(err: CodecError) -> Self {
        SyncError::Serialization {
            context: err.to_string(),
        }
    }
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
    use crate::network::codec::CodecOperation;

    #[test]
    fn display_mentions_offending_value() {
        let err = SyncError::InvalidSpecialValue { raw: 140 };
        assert_eq!(
            err.to_string(),
            "Special value 140 is outside the range 0..=100"
        );
    }

    #[test]
    fn invalid_config_display_includes_info() {
        let err = SyncError::InvalidConfig {
            info: "tick_display must be at least 1".to_owned(),
        };
        assert!(err.to_string().contains("tick_display must be at least 1"));
    }

    #[test]
    fn codec_errors_become_serialization_errors() {
        let codec = CodecError::decode("unexpected end", CodecOperation::DecodeMessage);
        let err: SyncError = codec.into();
        match err {
            SyncError::Serialization { context } => {
                assert!(context.contains("decoding party message"));
                assert!(context.contains("unexpected end"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
