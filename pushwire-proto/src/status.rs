use core::fmt::{self, Display, Formatter};

/// Status code carried by a gateway error response.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Status {
    NoErrorsEncountered,
    ProcessingError,
    MissingDeviceToken,
    MissingTopic,
    MissingPayload,
    InvalidTokenSize,
    InvalidTopicSize,
    InvalidPayloadSize,
    InvalidToken,
    Shutdown,
    None,
    Unknown(u8),
}

impl Status {
    /// The gateway closes the connection after every status except
    /// [`Status::NoErrorsEncountered`]; all of them mean the frame was dropped.
    pub const fn is_error(self) -> bool {
        !matches!(self, Self::NoErrorsEncountered)
    }

    /// The gateway is going away for maintenance rather than rejecting the
    /// notification itself.
    pub const fn is_shutdown(self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

impl From<u8> for Status {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::NoErrorsEncountered,
            1 => Self::ProcessingError,
            2 => Self::MissingDeviceToken,
            3 => Self::MissingTopic,
            4 => Self::MissingPayload,
            5 => Self::InvalidTokenSize,
            6 => Self::InvalidTopicSize,
            7 => Self::InvalidPayloadSize,
            8 => Self::InvalidToken,
            10 => Self::Shutdown,
            255 => Self::None,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Status> for u8 {
    fn from(value: Status) -> Self {
        match value {
            Status::NoErrorsEncountered => 0,
            Status::ProcessingError => 1,
            Status::MissingDeviceToken => 2,
            Status::MissingTopic => 3,
            Status::MissingPayload => 4,
            Status::InvalidTokenSize => 5,
            Status::InvalidTopicSize => 6,
            Status::InvalidPayloadSize => 7,
            Status::InvalidToken => 8,
            Status::Shutdown => 10,
            Status::None => 255,
            Status::Unknown(v) => v,
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u8::from(*self))
    }
}

#[cfg(test)]
mod test {
    use super::Status;

    #[test]
    fn status() {
        assert!(Status::InvalidToken.is_error());
        assert!(!Status::NoErrorsEncountered.is_error());
        assert!(Status::Shutdown.is_shutdown());

        assert_eq!(Status::from(8), Status::InvalidToken);
        assert_eq!(u8::from(Status::InvalidPayloadSize), 7);
        assert_eq!(Status::from(255), Status::None);
        assert_eq!(Status::from(42), Status::Unknown(42));
        assert_eq!(u8::from(Status::Unknown(42)), 42);
        assert_eq!(Status::MissingTopic.to_string(), "3");
    }
}
