//! USB outcome <-> USB/IP wire status (Linux negative errno) mapping.

/// Outcome of a completed (or failed) USB transfer, as reported by the
/// USB library's completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbOutcome {
    Completed,
    Cancelled,
    Stall,
    TimedOut,
    Overflow,
    NoDevice,
    Error,
}

// Linux generic errno.h values.
const ENOENT: i32 = 2;
const EPIPE: i32 = 32;
const EOVERFLOW: i32 = 75;
const ESHUTDOWN: i32 = 108;
const ECONNRESET: i32 = 104;
const ETIMEDOUT: i32 = 110;

impl UsbOutcome {
    /// Map to the negative-errno status carried in a RET_SUBMIT/RET_UNLINK PDU.
    pub fn to_wire_status(self) -> i32 {
        match self {
            UsbOutcome::Completed => 0,
            UsbOutcome::Cancelled => -ECONNRESET,
            UsbOutcome::Stall => -EPIPE,
            UsbOutcome::TimedOut => -ETIMEDOUT,
            UsbOutcome::Overflow => -EOVERFLOW,
            UsbOutcome::NoDevice => -ESHUTDOWN,
            UsbOutcome::Error => -ENOENT,
        }
    }

    /// Inverse of [`to_wire_status`], used when decoding inbound ISO
    /// packet descriptors that carry a previously-reported status.
    pub fn from_wire_status(status: i32) -> Self {
        match status {
            0 => UsbOutcome::Completed,
            s if s == -ECONNRESET => UsbOutcome::Cancelled,
            s if s == -EPIPE => UsbOutcome::Stall,
            s if s == -ETIMEDOUT => UsbOutcome::TimedOut,
            s if s == -EOVERFLOW => UsbOutcome::Overflow,
            s if s == -ESHUTDOWN => UsbOutcome::NoDevice,
            _ => UsbOutcome::Error,
        }
    }

    /// Whether this outcome should trigger the coordinator's `REMOVE` signal.
    pub fn is_device_removal(self) -> bool {
        matches!(self, UsbOutcome::NoDevice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_spec() {
        assert_eq!(UsbOutcome::Completed.to_wire_status(), 0);
        assert_eq!(UsbOutcome::Cancelled.to_wire_status(), -104);
        assert_eq!(UsbOutcome::Stall.to_wire_status(), -32);
        assert_eq!(UsbOutcome::TimedOut.to_wire_status(), -110);
        assert_eq!(UsbOutcome::Overflow.to_wire_status(), -75);
        assert_eq!(UsbOutcome::NoDevice.to_wire_status(), -108);
        assert_eq!(UsbOutcome::Error.to_wire_status(), -2);
    }

    #[test]
    fn inverse_round_trips_known_codes() {
        for outcome in [
            UsbOutcome::Completed,
            UsbOutcome::Cancelled,
            UsbOutcome::Stall,
            UsbOutcome::TimedOut,
            UsbOutcome::Overflow,
            UsbOutcome::NoDevice,
        ] {
            let status = outcome.to_wire_status();
            assert_eq!(UsbOutcome::from_wire_status(status), outcome);
        }
    }

    #[test]
    fn no_device_triggers_removal() {
        assert!(UsbOutcome::NoDevice.is_device_removal());
        assert!(!UsbOutcome::Completed.is_device_removal());
    }
}
