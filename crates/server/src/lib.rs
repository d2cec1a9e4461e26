//! Library surface for the USB/IP stub server binary: configuration, the
//! control-protocol handshake, and the per-device stub engine. Split out
//! from the binary crate so integration tests can exercise them directly.

pub mod config;
pub mod error;
pub mod handshake;
pub mod usb;

pub use error::StubError;
