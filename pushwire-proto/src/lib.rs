//! Binary codec for the "enhanced notification" gateway protocol.
//!
//! - [`Message`]: one notification, validated at construction
//! - [`Frame`]: the fixed big-endian frame a message is written as
//! - [`ErrorResponse`]: the 6-byte frame the gateway sends before it drops
//!   the connection
//! - [`Status`]: gateway status codes carried by an error response

mod error;
mod frame;
mod message;
mod status;

pub use error::{FrameError, MessageError};
pub use frame::{ErrorResponse, Frame};
pub use message::{DEFAULT_SOUND, DeviceToken, MAX_PAYLOAD_SIZE, Message, MessageBuilder, Sound};
pub use status::Status;
