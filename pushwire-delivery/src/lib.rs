//! Streams notifications to a push gateway over a certificate-authenticated
//! TLS connection.
//!
//! - [`Delivery`]: the retrying, circuit-breaking delivery loop
//! - [`GatewayConnector`] / [`GatewayConnection`]: the TLS transport
//! - [`DeliveryConfig`]: TOML configuration for both

mod config;
mod connection;
mod delivery;
mod error;

pub use config::{ConnectionConfig, DeliveryConfig, FailurePolicy};
pub use connection::{
    Connector, DEFAULT_POLL_TIMEOUT, GatewayConnection, GatewayConnector, Transport,
};
pub use delivery::{Callbacks, Delivery, DeliveryState};
pub use error::{ConnectionError, ConnectionResult, DeliveryError};
// Re-export the codec so callers need only this crate
pub use pushwire_proto::{ErrorResponse, Message, MessageBuilder, Sound, Status};
