//! Fatal session-ending signals shared between the RX pipeline, the TX
//! pipeline, and the engine coordinator that winds a session down once one
//! of them fires.
//!
//! These mirror the handful of `usbip_event_add(ud, SDEV_EVENT_*)` calls in
//! the reference rx/tx paths: a malformed or unreadable stream, a submit the
//! backend refused outright, a cancel request the backend refused outright,
//! and device removal noticed mid-session.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    /// The TCP stream produced malformed bytes, or an I/O error that isn't
    /// a clean EOF.
    ErrorTcp,
    /// The backend rejected a transfer at submission time (not a completion
    /// outcome — those are reported as a normal `RET_SUBMIT` status).
    ErrorSubmit,
    /// The backend rejected a cancellation request outright.
    ErrorCancel,
    /// The backend reported the underlying device is gone.
    Removed,
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FatalReason::ErrorTcp => "TCP stream error",
            FatalReason::ErrorSubmit => "transfer submission failed",
            FatalReason::ErrorCancel => "transfer cancellation failed",
            FatalReason::Removed => "device removed",
        };
        f.write_str(s)
    }
}

/// How the RX pipeline's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxOutcome {
    /// The client closed the connection cleanly between PDUs.
    Closed,
    Fatal(FatalReason),
}

/// How the TX pipeline's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Asked to stop (RX closed, or a fatal signal elsewhere) and finished
    /// draining whatever replies were already queued.
    Stopped,
    Fatal(FatalReason),
}
