use std::{io::IsTerminal, str::FromStr};

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Environment variable holding the log level.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Emits an event inside a `gateway` span carrying the traffic direction and
/// the message the traffic belongs to.
#[macro_export]
macro_rules! gateway_event {
    ($level:ident, $direction:literal, $message_id:expr, $($arg:tt)+) => {{
        let span = $crate::tracing::span!(
            $crate::tracing::Level::$level,
            "gateway",
            direction = $direction,
            message_id = $message_id,
        );
        let _enter = span.enter();

        $crate::tracing::event!($crate::tracing::Level::$level, $($arg)+)
    }};
}

/// A frame written to the gateway for `message_id`.
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $message_id:expr, $($arg:tt)+) => {
        $crate::gateway_event!($level, "outgoing", $message_id, $($arg)+)
    };

    ($message_id:expr, $($arg:tt)+) => {
        $crate::outgoing!(level = TRACE, $message_id, $($arg)+)
    };
}

/// A frame read back from the gateway about `message_id`.
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $message_id:expr, $($arg:tt)+) => {
        $crate::gateway_event!($level, "incoming", $message_id, $($arg)+)
    };

    ($message_id:expr, $($arg:tt)+) => {
        $crate::incoming!(level = TRACE, $message_id, $($arg)+)
    };
}

/// Connection lifecycle for the gateway at `address`.
#[macro_export]
macro_rules! connection {
    (level = $level:ident, $address:expr, $($arg:tt)+) => {{
        let span = $crate::tracing::span!(
            $crate::tracing::Level::$level,
            "gateway",
            address = %$address,
        );
        let _enter = span.enter();

        $crate::tracing::event!($crate::tracing::Level::$level, $($arg)+)
    }};

    ($address:expr, $($arg:tt)+) => {
        $crate::connection!(level = DEBUG, $address, $($arg)+)
    };
}

/// Resolves the level filter from a `LOG_LEVEL` style value, falling back to
/// `default` when it is absent or unparsable.
fn level_from(value: Option<&str>, default: LevelFilter) -> LevelFilter {
    value.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

fn is_pushwire_target(target: &str) -> bool {
    target.starts_with("pushwire")
}

/// Installs the global subscriber, writing to stderr.
///
/// Only events from `pushwire*` targets are emitted. Colour is used when
/// stderr is a terminal.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let level = level_from(std::env::var(LOG_LEVEL_ENV).ok().as_deref(), default);

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(std::io::stderr().is_terminal())
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    is_pushwire_target(metadata.target())
                })),
        )
        .init();
}
