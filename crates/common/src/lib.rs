//! Shared ambient infrastructure for the USB/IP stub server: error types and
//! logging setup. Kept deliberately thin — everything domain-specific (wire
//! codec, transfer registry, device state) lives in its own crate or module.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::setup_logging;
