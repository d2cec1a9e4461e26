//! Layered error type for the stub engine (§7: transport/resource/protocol/
//! device/logic), replacing ad-hoc `.map_err(|_| FatalReason::...)` with a
//! type that keeps the underlying cause instead of discarding it.

use thiserror::Error;

use crate::usb::backend::BackendError;
use crate::usb::events::FatalReason;
use crate::usb::registry::RegistryError;

/// Everything that can end a stub session before the client disconnects
/// cleanly. Device-status errors (a single transfer's outcome) are never
/// represented here: those are reported in that transfer's own RET_SUBMIT
/// and never fatal to the session.
#[derive(Debug, Error)]
pub enum StubError {
    /// The TCP stream produced malformed bytes, or any I/O error that is not
    /// a clean EOF. Raises `ERROR_TCP`.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The registry could not allocate a transfer record. Raises
    /// `ERROR_MALLOC`.
    #[error("resource exhausted: {0}")]
    Resource(String),

    /// A PDU was malformed at the protocol level (unknown command, ISO
    /// lengths that don't sum). Raises `ERROR_TCP`.
    #[error("protocol error: {0}")]
    Protocol(#[from] protocol::WireError),

    /// The backend rejected a submit, cancel, or control call outright.
    /// Raises `ERROR_SUBMIT` (or `ERROR_CANCEL` for a rejected cancel).
    #[error("device error: {0}")]
    Device(String),

    /// An invariant this engine relies on was violated — a record found on
    /// two queues, a handle that outlived its record. Panics in development
    /// builds; treated as a fatal session error here in release builds.
    #[error("internal invariant violated: {0}")]
    Logic(String),
}

impl StubError {
    /// The coordinator signal this error raises, for the RX/TX pipelines'
    /// existing `FatalReason`-based session teardown.
    pub fn signal(&self) -> FatalReason {
        match self {
            StubError::Transport(_) => FatalReason::ErrorTcp,
            StubError::Resource(_) => FatalReason::ErrorSubmit,
            StubError::Protocol(_) => FatalReason::ErrorTcp,
            StubError::Device(_) => FatalReason::ErrorSubmit,
            StubError::Logic(_) => FatalReason::ErrorTcp,
        }
    }
}

impl From<RegistryError> for StubError {
    fn from(e: RegistryError) -> Self {
        StubError::Resource(e.to_string())
    }
}

impl From<BackendError> for StubError {
    fn from(e: BackendError) -> Self {
        StubError::Device(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_protocol_map_to_error_tcp() {
        let io_err = StubError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io_err.signal(), FatalReason::ErrorTcp);

        let wire_err = StubError::from(protocol::WireError::IsoLengthMismatch { expected: 4, actual: 2 });
        assert_eq!(wire_err.signal(), FatalReason::ErrorTcp);
    }

    #[test]
    fn resource_and_device_map_to_error_submit() {
        assert_eq!(StubError::from(RegistryError::OutOfMemory).signal(), FatalReason::ErrorSubmit);
        assert_eq!(StubError::from(BackendError::NoDevice).signal(), FatalReason::ErrorSubmit);
    }
}
