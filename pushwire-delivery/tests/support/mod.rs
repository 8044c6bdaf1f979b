#![allow(dead_code)]

pub mod mock_gateway;

use pushwire_delivery::{FailurePolicy, Message};

pub const DEVICE_TOKEN: &str = "0f1e2d3c4b5a69788796a5b4c3d2e1f00f1e2d3c4b5a69788796a5b4c3d2e1f0";

pub fn message(message_id: u32) -> Message {
    Message::builder(message_id, DEVICE_TOKEN)
        .alert(format!("Message {message_id}"))
        .build()
        .unwrap()
}

pub fn messages(ids: impl IntoIterator<Item = u32>) -> Vec<Message> {
    ids.into_iter().map(message).collect()
}

/// The default policy without the pause between retries.
pub fn no_sleep() -> FailurePolicy {
    FailurePolicy {
        sleep_on_exception_ms: 0,
        ..FailurePolicy::default()
    }
}
