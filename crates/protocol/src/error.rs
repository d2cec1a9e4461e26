//! Wire-codec error types

use thiserror::Error;

/// Errors raised while decoding or encoding a USB/IP PDU.
#[derive(Debug, Error)]
pub enum WireError {
    /// The `command` field did not match any known USB/IP command.
    #[error("unknown USB/IP command: {command:#06x}")]
    UnknownCommand { command: u32 },

    /// A PDU was structurally well-formed but internally inconsistent.
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// The sum of a CMD_SUBMIT's ISO packet descriptor lengths did not match
    /// its `transfer_buffer_length`.
    #[error("ISO packet lengths sum to {actual}, expected {expected}")]
    IsoLengthMismatch { expected: u32, actual: u32 },

    /// Underlying socket I/O failed while reading or writing a PDU.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WireError>;
