//! Typed errors for the gateway connection and the delivery engine.
//!
//! Connection errors are recoverable within a run: the engine turns them into
//! callback invocations and counter updates. Only construction-time problems
//! (configuration, certificates) surface to the caller.

use std::io;

use pushwire_proto::MessageError;
use thiserror::Error;

/// Errors raised by a gateway connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// DNS, TCP or TLS handshake failure while opening the connection.
    #[error("Failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    /// Opening the connection took longer than the configured timeout.
    #[error("Timed out connecting to {0}")]
    Timeout(String),

    /// The client certificate or private key could not be loaded.
    #[error("Invalid client certificate: {0}")]
    Certificate(String),

    /// Writing a frame failed; the stream is no longer trustworthy.
    #[error("Write failed: {0}")]
    Write(#[source] io::Error),

    /// Reading from the stream failed.
    #[error("Read failed: {0}")]
    Read(#[source] io::Error),

    /// The connection was used after being closed.
    #[error("Connection is closed")]
    Closed,
}

/// Specialized `Result` type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Top-level error type for the delivery engine.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Rejected configuration; raised before any I/O happens.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transport failure while writing a message.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The current message could not be encoded.
    #[error("Message error: {0}")]
    Message(#[from] MessageError),
}

impl DeliveryError {
    /// Returns `true` if the error came from the transport rather than from
    /// the message or the configuration.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<toml::de::Error> for DeliveryError {
    fn from(error: toml::de::Error) -> Self {
        Self::InvalidConfig(error.message().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let error = ConnectionError::Connect {
            address: "gateway.example.com:2195".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to connect to gateway.example.com:2195: connection refused"
        );
        assert_eq!(ConnectionError::Closed.to_string(), "Connection is closed");
    }

    #[test]
    fn test_delivery_error_from_connection() {
        let error: DeliveryError = ConnectionError::Write(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "broken pipe",
        ))
        .into();

        assert!(error.is_transport());
        assert_eq!(
            error.to_string(),
            "Connection error: Write failed: broken pipe"
        );
    }

    #[test]
    fn test_delivery_error_from_message() {
        let error: DeliveryError = MessageError::PayloadTooLarge {
            size: 300,
            max: 256,
        }
        .into();

        assert!(!error.is_transport());
        assert_eq!(
            error.to_string(),
            "Message error: Payload is 300 bytes and it cannot exceed 256 bytes"
        );
    }
}
