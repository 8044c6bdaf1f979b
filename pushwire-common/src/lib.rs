//! Pieces shared by every pushwire crate.

pub mod logging;

pub use tracing;
