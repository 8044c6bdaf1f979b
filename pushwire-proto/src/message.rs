//! A single push notification and its JSON payload.

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{error::MessageError, frame::Frame};

/// Largest payload, in bytes, the gateway accepts.
pub const MAX_PAYLOAD_SIZE: usize = 256;

/// Sound file played when a message only asks for "a sound".
pub const DEFAULT_SOUND: &str = "1.aiff";

pub(crate) const TOKEN_LENGTH: usize = 32;

/// How long the gateway keeps trying to reach an offline device.
const EXPIRY: Duration = Duration::from_secs(30 * 24 * 3600);

/// The 32 raw bytes identifying an app installation on a device.
///
/// Parsed from, and displayed as, 64 lowercase hexadecimal characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceToken([u8; TOKEN_LENGTH]);

impl DeviceToken {
    pub const fn as_bytes(&self) -> &[u8; TOKEN_LENGTH] {
        &self.0
    }
}

impl From<[u8; TOKEN_LENGTH]> for DeviceToken {
    fn from(bytes: [u8; TOKEN_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl FromStr for DeviceToken {
    type Err = MessageError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; TOKEN_LENGTH];
        hex::decode_to_slice(token, &mut bytes).map_err(|reason| {
            MessageError::InvalidDeviceToken {
                token: token.to_string(),
                reason,
            }
        })?;
        Ok(Self(bytes))
    }
}

impl Display for DeviceToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for DeviceToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceToken({self})")
    }
}

/// The sound to play when the notification arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sound {
    /// A sound file bundled with the app.
    Named(String),
    /// The stock [`DEFAULT_SOUND`].
    Default,
}

impl Sound {
    pub fn file_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Default => DEFAULT_SOUND,
        }
    }
}

/// A push notification addressed to one device.
///
/// Two messages are equal when they carry the same `message_id`, the value
/// the gateway echoes back when it rejects a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Attributes", into = "Attributes")]
pub struct Message {
    message_id: u32,
    device_token: DeviceToken,
    alert: Option<String>,
    badge: Option<u32>,
    sound: Option<Sound>,
    content_available: bool,
    custom: Map<String, Value>,
}

impl Message {
    /// Creates a message with no alert, badge or sound.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::InvalidDeviceToken`] if `device_token` is not 64
    /// hexadecimal characters.
    pub fn new(message_id: u32, device_token: &str) -> Result<Self, MessageError> {
        Self::builder(message_id, device_token).build()
    }

    pub fn builder(message_id: u32, device_token: impl Into<String>) -> MessageBuilder {
        MessageBuilder {
            message_id,
            device_token: device_token.into(),
            alert: None,
            badge: None,
            sound: None,
            content_available: false,
            custom: Map::new(),
        }
    }

    pub const fn message_id(&self) -> u32 {
        self.message_id
    }

    pub const fn device_token(&self) -> &DeviceToken {
        &self.device_token
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub const fn badge(&self) -> Option<u32> {
        self.badge
    }

    pub const fn sound(&self) -> Option<&Sound> {
        self.sound.as_ref()
    }

    pub const fn content_available(&self) -> bool {
        self.content_available
    }

    pub const fn custom(&self) -> &Map<String, Value> {
        &self.custom
    }

    pub const fn set_message_id(&mut self, message_id: u32) {
        self.message_id = message_id;
    }

    pub fn set_alert(&mut self, alert: Option<String>) {
        self.alert = alert;
    }

    pub const fn set_badge(&mut self, badge: Option<u32>) {
        self.badge = badge;
    }

    pub fn set_sound(&mut self, sound: Option<Sound>) {
        self.sound = sound;
    }

    pub const fn set_content_available(&mut self, content_available: bool) {
        self.content_available = content_available;
    }

    /// The payload as a JSON value: an `aps` dictionary followed by the custom
    /// properties. Absent fields are left out rather than written as `null`.
    pub fn payload_value(&self) -> Value {
        let mut aps = Map::new();

        if let Some(alert) = &self.alert {
            aps.insert("alert".to_string(), Value::from(alert.as_str()));
        }
        if let Some(badge) = self.badge.filter(|badge| *badge > 0) {
            aps.insert("badge".to_string(), Value::from(badge));
        }
        if let Some(sound) = &self.sound {
            aps.insert("sound".to_string(), Value::from(sound.file_name()));
        }
        if self.content_available {
            aps.insert("content-available".to_string(), Value::from(1));
        }

        let mut payload = Map::with_capacity(self.custom.len() + 1);
        payload.insert("aps".to_string(), Value::Object(aps));
        payload.extend(self.custom.iter().map(|(k, v)| (k.clone(), v.clone())));

        Value::Object(payload)
    }

    /// The serialised JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Json`] if serialisation fails.
    pub fn payload(&self) -> Result<String, MessageError> {
        Ok(serde_json::to_string(&self.payload_value())?)
    }

    /// Size of the serialised payload in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Json`] if serialisation fails.
    pub fn payload_size(&self) -> Result<usize, MessageError> {
        self.payload().map(|payload| payload.len())
    }

    /// Encodes the message as an enhanced notification frame expiring thirty
    /// days from now.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::PayloadTooLarge`] if a field was changed after
    /// construction and pushed the payload over [`MAX_PAYLOAD_SIZE`].
    pub fn to_wire_bytes(&self) -> Result<Vec<u8>, MessageError> {
        self.encode_at(SystemTime::now())
    }

    /// Encodes the message with an expiration thirty days after `now`.
    ///
    /// # Errors
    ///
    /// See [`Message::to_wire_bytes`].
    pub fn encode_at(&self, now: SystemTime) -> Result<Vec<u8>, MessageError> {
        let payload = self.checked_payload()?;
        let expires_at = now.duration_since(UNIX_EPOCH).unwrap_or_default() + EXPIRY;

        let frame = Frame {
            message_id: self.message_id,
            expiration: u32::try_from(expires_at.as_secs()).unwrap_or(u32::MAX),
            device_token: self.device_token,
            payload: payload.into_bytes(),
        };
        Ok(frame.encode()?)
    }

    fn checked_payload(&self) -> Result<String, MessageError> {
        let payload = self.payload()?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(MessageError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(payload)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.message_id == other.message_id
    }
}

impl Eq for Message {}

/// Builder for [`Message`]; every field but the id and token is optional.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message_id: u32,
    device_token: String,
    alert: Option<String>,
    badge: Option<u32>,
    sound: Option<Sound>,
    content_available: bool,
    custom: Map<String, Value>,
}

impl MessageBuilder {
    #[must_use]
    pub fn alert(mut self, alert: impl Into<String>) -> Self {
        self.alert = Some(alert.into());
        self
    }

    #[must_use]
    pub const fn badge(mut self, badge: u32) -> Self {
        self.badge = Some(badge);
        self
    }

    #[must_use]
    pub fn sound(mut self, file_name: impl Into<String>) -> Self {
        self.sound = Some(Sound::Named(file_name.into()));
        self
    }

    /// Plays [`DEFAULT_SOUND`].
    #[must_use]
    pub fn default_sound(mut self) -> Self {
        self.sound = Some(Sound::Default);
        self
    }

    #[must_use]
    pub const fn content_available(mut self, content_available: bool) -> Self {
        self.content_available = content_available;
        self
    }

    /// Adds a top-level payload property next to the `aps` dictionary.
    #[must_use]
    pub fn custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Validates the token and the payload size.
    ///
    /// # Errors
    ///
    /// - [`MessageError::InvalidDeviceToken`] for a malformed token
    /// - [`MessageError::ReservedKey`] when a custom property is named `aps`
    /// - [`MessageError::PayloadTooLarge`] when the payload exceeds
    ///   [`MAX_PAYLOAD_SIZE`] bytes
    pub fn build(self) -> Result<Message, MessageError> {
        if self.custom.contains_key("aps") {
            return Err(MessageError::ReservedKey("aps".to_string()));
        }

        let message = Message {
            message_id: self.message_id,
            device_token: self.device_token.parse()?,
            alert: self.alert,
            badge: self.badge,
            sound: self.sound,
            content_available: self.content_available,
            custom: self.custom,
        };
        message.checked_payload()?;

        Ok(message)
    }
}

/// `sound` accepts either a file name or `true` for the default sound.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SoundAttribute {
    Flag(bool),
    Named(String),
}

/// Serialised shape of a [`Message`], as read from JSON lines.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Attributes {
    message_id: u32,
    device_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    badge: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sound: Option<SoundAttribute>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    content_available: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    custom: Map<String, Value>,
}

impl TryFrom<Attributes> for Message {
    type Error = MessageError;

    fn try_from(attributes: Attributes) -> Result<Self, Self::Error> {
        let mut builder = Self::builder(attributes.message_id, attributes.device_token)
            .content_available(attributes.content_available);
        builder.alert = attributes.alert;
        builder.badge = attributes.badge;
        builder.sound = match attributes.sound {
            Some(SoundAttribute::Named(name)) => Some(Sound::Named(name)),
            Some(SoundAttribute::Flag(true)) => Some(Sound::Default),
            Some(SoundAttribute::Flag(false)) | None => None,
        };
        builder.custom = attributes.custom;
        builder.build()
    }
}

impl From<Message> for Attributes {
    fn from(message: Message) -> Self {
        Self {
            message_id: message.message_id,
            device_token: message.device_token.to_string(),
            alert: message.alert,
            badge: message.badge,
            sound: message.sound.map(|sound| match sound {
                Sound::Named(name) => SoundAttribute::Named(name),
                Sound::Default => SoundAttribute::Flag(true),
            }),
            content_available: message.content_available,
            custom: message.custom,
        }
    }
}
