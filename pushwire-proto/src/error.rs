//! Error types for building and parsing gateway frames.

use thiserror::Error;

/// Errors raised while constructing or encoding a [`Message`](crate::Message).
#[derive(Debug, Error)]
pub enum MessageError {
    /// The device token is not 64 hexadecimal characters.
    #[error("Invalid device token {token:?}: {reason}")]
    InvalidDeviceToken {
        token: String,
        #[source]
        reason: hex::FromHexError,
    },

    /// The JSON payload is larger than the gateway accepts.
    #[error("Payload is {size} bytes and it cannot exceed {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// A custom property would overwrite the `aps` dictionary.
    #[error("Custom property {0:?} is reserved")]
    ReservedKey(String),

    /// The payload could not be serialised.
    #[error("Failed to serialise payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The notification frame could not be built.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Errors raised while encoding or decoding a notification frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than the frame header or its declared lengths require.
    #[error("Frame truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// The leading command byte is not the enhanced notification command.
    #[error("Unexpected command byte {0}")]
    UnexpectedCommand(u8),

    /// A length field disagrees with the protocol or the buffer.
    #[error("Length mismatch in {field}: expected {expected}, got {actual}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The payload does not fit the frame's 16-bit length field.
    #[error("Payload is {length} bytes and a frame carries at most {max}")]
    PayloadTooLong { length: usize, max: usize },
}
