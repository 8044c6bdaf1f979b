//! Frame layouts exchanged with the gateway.
//!
//! A notification is written as:
//!
//! ```text
//! +---------+------------+------------+-----------+-------------+-------------+---------+
//! | command | message id | expiration | token len | token       | payload len | payload |
//! | 1 byte  | 4 bytes    | 4 bytes    | 2 bytes   | 32 bytes    | 2 bytes     | N bytes |
//! +---------+------------+------------+-----------+-------------+-------------+---------+
//! ```
//!
//! and a rejection comes back as `command (8) | status | message id`.
//! Every integer is big-endian.

use crate::{
    error::FrameError,
    message::{DeviceToken, TOKEN_LENGTH},
    status::Status,
};

/// Leading byte of an enhanced notification frame.
pub const NOTIFICATION_COMMAND: u8 = 1;

/// Leading byte of an error response.
pub const ERROR_RESPONSE_COMMAND: u8 = 8;

const HEADER_LENGTH: usize = 1 + 4 + 4 + 2;

/// One enhanced notification as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_id: u32,
    /// Unix time after which the gateway may discard the notification.
    pub expiration: u32,
    pub device_token: DeviceToken,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Serialises the frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::PayloadTooLong`] if the payload length does not
    /// fit in the `u16` length field.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let payload_length =
            u16::try_from(self.payload.len()).map_err(|_| FrameError::PayloadTooLong {
                length: self.payload.len(),
                max: usize::from(u16::MAX),
            })?;
        let mut bytes =
            Vec::with_capacity(HEADER_LENGTH + TOKEN_LENGTH + 2 + self.payload.len());

        bytes.push(NOTIFICATION_COMMAND);
        bytes.extend_from_slice(&self.message_id.to_be_bytes());
        bytes.extend_from_slice(&self.expiration.to_be_bytes());
        bytes.extend_from_slice(&token_length().to_be_bytes());
        bytes.extend_from_slice(self.device_token.as_bytes());
        bytes.extend_from_slice(&payload_length.to_be_bytes());
        bytes.extend_from_slice(&self.payload);

        Ok(bytes)
    }

    /// Parses exactly one notification frame.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`] if the buffer is short, carries trailing bytes,
    /// starts with the wrong command, or declares a token that is not 32 bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_LENGTH {
            return Err(FrameError::Truncated {
                expected: HEADER_LENGTH,
                actual: bytes.len(),
            });
        }

        if bytes[0] != NOTIFICATION_COMMAND {
            return Err(FrameError::UnexpectedCommand(bytes[0]));
        }

        let message_id = read_u32(&bytes[1..5]);
        let expiration = read_u32(&bytes[5..9]);
        let declared_token = usize::from(read_u16(&bytes[9..11]));
        if declared_token != TOKEN_LENGTH {
            return Err(FrameError::LengthMismatch {
                field: "device token",
                expected: TOKEN_LENGTH,
                actual: declared_token,
            });
        }

        let payload_start = HEADER_LENGTH + TOKEN_LENGTH + 2;
        if bytes.len() < payload_start {
            return Err(FrameError::Truncated {
                expected: payload_start,
                actual: bytes.len(),
            });
        }

        let mut token = [0u8; TOKEN_LENGTH];
        token.copy_from_slice(&bytes[HEADER_LENGTH..HEADER_LENGTH + TOKEN_LENGTH]);

        let payload_length = usize::from(read_u16(&bytes[payload_start - 2..payload_start]));
        let expected = payload_start + payload_length;
        if bytes.len() < expected {
            return Err(FrameError::Truncated {
                expected,
                actual: bytes.len(),
            });
        }
        if bytes.len() > expected {
            return Err(FrameError::LengthMismatch {
                field: "frame",
                expected,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            message_id,
            expiration,
            device_token: DeviceToken::from(token),
            payload: bytes[payload_start..].to_vec(),
        })
    }
}

/// The 6-byte frame the gateway writes before closing the connection on a
/// rejected notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    pub command: u8,
    pub status: Status,
    pub message_id: u32,
}

impl ErrorResponse {
    pub const LENGTH: usize = 6;

    pub const fn new(status: Status, message_id: u32) -> Self {
        Self {
            command: ERROR_RESPONSE_COMMAND,
            status,
            message_id,
        }
    }

    /// Decodes an error response from the first six bytes of `bytes`.
    ///
    /// Returns `None` when fewer than six bytes were read, which happens when
    /// the gateway closes the stream mid-frame.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let frame = bytes.get(..Self::LENGTH)?;

        Some(Self {
            command: frame[0],
            status: Status::from(frame[1]),
            message_id: read_u32(&frame[2..6]),
        })
    }

    pub fn encode(&self) -> [u8; Self::LENGTH] {
        let id = self.message_id.to_be_bytes();
        [
            self.command,
            u8::from(self.status),
            id[0],
            id[1],
            id[2],
            id[3],
        ]
    }
}

fn token_length() -> u16 {
    u16::try_from(TOKEN_LENGTH).unwrap_or(u16::MAX)
}

fn read_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
