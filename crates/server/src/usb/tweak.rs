//! Special-request tweaker (C5).
//!
//! A handful of standard control requests cannot simply be forwarded to
//! `libusb_submit_transfer` as-is: some need a dedicated libusb call instead
//! of a generic control transfer, and one (`SET_CONFIGURATION`) must never
//! reach the device at all, because re-configuring it would make the kernel
//! unbind and rebind the interface out from under this session.
//!
//! Detection here mirrors the four `is_*_cmd` predicates in the reference
//! rx path bit for bit: recipient and request code are read out of the raw
//! 8-byte control setup packet, which travels the wire unmodified (only the
//! basic header and command-specific union are endian-corrected; the setup
//! packet is opaque payload).

use crate::usb::backend::UsbBackend;

const REQUEST_CLEAR_FEATURE: u8 = 1;
const REQUEST_SET_FEATURE: u8 = 3;
const REQUEST_SET_INTERFACE: u8 = 11;
const REQUEST_SET_CONFIGURATION: u8 = 9;

const RECIPIENT_DEVICE: u8 = 0;
const RECIPIENT_INTERFACE: u8 = 1;
const RECIPIENT_ENDPOINT: u8 = 2;
const RECIPIENT_OTHER: u8 = 3;

const REQUEST_TYPE_CLASS: u8 = 1;

const USB_ENDPOINT_HALT: u16 = 0;
const USB_PORT_FEAT_RESET: u16 = 4;

/// A parsed 8-byte USB control setup packet.
#[derive(Debug, Clone, Copy)]
struct ControlSetup {
    bm_request_type: u8,
    b_request: u8,
    w_value: u16,
    w_index: u16,
}

impl ControlSetup {
    fn parse(setup: &[u8; 8]) -> Self {
        Self {
            bm_request_type: setup[0],
            b_request: setup[1],
            w_value: u16::from_le_bytes([setup[2], setup[3]]),
            w_index: u16::from_le_bytes([setup[4], setup[5]]),
        }
    }

    fn recipient(&self) -> u8 {
        self.bm_request_type & 0x1f
    }

    fn request_type(&self) -> u8 {
        (self.bm_request_type >> 5) & 0x3
    }
}

/// Outcome of attempting to tweak a control request.
pub enum Tweak {
    /// Not one of the recognized special requests; submit it normally.
    NotSpecial,
    /// Handled locally. The caller should synthesize a COMPLETED reply with
    /// `actual_length = 0` and must not submit anything to the backend.
    HandledLocally,
}

/// Inspect a CONTROL request's setup packet and, if it is one of the four
/// special cases, perform the corresponding backend call.
///
/// Returns [`Tweak::NotSpecial`] for every other control request (and for
/// anything that isn't CONTROL at all — callers only invoke this for
/// CONTROL transfers).
pub fn tweak_special_request(
    backend: &dyn UsbBackend,
    setup: &[u8; 8],
) -> crate::usb::backend::BackendResult<Tweak> {
    let req = ControlSetup::parse(setup);

    if is_clear_halt(&req) {
        backend.clear_halt(req.w_index as u8)?;
        return Ok(Tweak::HandledLocally);
    }
    if is_set_interface(&req) {
        let interface = req.w_index as u8;
        let alternate = req.w_value as u8;
        backend.set_interface_alt_setting(interface, alternate)?;
        return Ok(Tweak::HandledLocally);
    }
    if is_set_configuration(&req) {
        // Never forwarded: changing configuration would make the kernel
        // unbind and rebind the claimed interface mid-session.
        return Ok(Tweak::HandledLocally);
    }
    if is_reset_device_port(&req) {
        // No-op: modern kernels no longer unbind across a device reset, so
        // there is nothing to do here beyond acknowledging the request.
        return Ok(Tweak::HandledLocally);
    }

    Ok(Tweak::NotSpecial)
}

fn is_clear_halt(req: &ControlSetup) -> bool {
    req.b_request == REQUEST_CLEAR_FEATURE
        && req.recipient() == RECIPIENT_ENDPOINT
        && req.w_value == USB_ENDPOINT_HALT
}

fn is_set_interface(req: &ControlSetup) -> bool {
    req.b_request == REQUEST_SET_INTERFACE && req.recipient() == RECIPIENT_INTERFACE
}

fn is_set_configuration(req: &ControlSetup) -> bool {
    req.b_request == REQUEST_SET_CONFIGURATION && req.recipient() == RECIPIENT_DEVICE
}

fn is_reset_device_port(req: &ControlSetup) -> bool {
    req.b_request == REQUEST_SET_FEATURE
        && req.request_type() == REQUEST_TYPE_CLASS
        && req.recipient() == RECIPIENT_OTHER
        && req.w_value == USB_PORT_FEAT_RESET
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::backend::{BackendError, MockBackend};

    fn setup(bm_request_type: u8, b_request: u8, w_value: u16, w_index: u16) -> [u8; 8] {
        let mut s = [0u8; 8];
        s[0] = bm_request_type;
        s[1] = b_request;
        s[2..4].copy_from_slice(&w_value.to_le_bytes());
        s[4..6].copy_from_slice(&w_index.to_le_bytes());
        s
    }

    #[test]
    fn clear_feature_endpoint_halt_calls_clear_halt() {
        let backend = MockBackend::new();
        // bmRequestType = host-to-device, standard, recipient=endpoint (0x02)
        let req = setup(0x02, REQUEST_CLEAR_FEATURE, USB_ENDPOINT_HALT, 0x81);
        let outcome = tweak_special_request(&backend, &req).unwrap();
        assert!(matches!(outcome, Tweak::HandledLocally));
        assert_eq!(backend.clear_halt_calls(), vec![0x81]);
    }

    #[test]
    fn clear_feature_other_selector_is_not_special() {
        let backend = MockBackend::new();
        let req = setup(0x02, REQUEST_CLEAR_FEATURE, 1, 0x81);
        let outcome = tweak_special_request(&backend, &req).unwrap();
        assert!(matches!(outcome, Tweak::NotSpecial));
    }

    #[test]
    fn set_interface_calls_set_interface_alt_setting() {
        let backend = MockBackend::new();
        // recipient=interface (0x01), wIndex=interface 0, wValue=alt 2
        let req = setup(0x01, REQUEST_SET_INTERFACE, 2, 0);
        let outcome = tweak_special_request(&backend, &req).unwrap();
        assert!(matches!(outcome, Tweak::HandledLocally));
        assert_eq!(backend.set_interface_calls(), vec![(0, 2)]);
    }

    #[test]
    fn set_configuration_is_swallowed_not_forwarded() {
        let backend = MockBackend::new();
        let req = setup(0x00, REQUEST_SET_CONFIGURATION, 1, 0);
        let outcome = tweak_special_request(&backend, &req).unwrap();
        assert!(matches!(outcome, Tweak::HandledLocally));
        assert!(backend.clear_halt_calls().is_empty());
        assert!(backend.set_interface_calls().is_empty());
    }

    #[test]
    fn port_reset_is_a_no_op() {
        let backend = MockBackend::new();
        let req = setup(0x23, REQUEST_SET_FEATURE, USB_PORT_FEAT_RESET, 1);
        let outcome = tweak_special_request(&backend, &req).unwrap();
        assert!(matches!(outcome, Tweak::HandledLocally));
    }

    #[test]
    fn ordinary_get_descriptor_is_not_special() {
        let backend = MockBackend::new();
        let req = setup(0x80, 6, 0x0100, 0);
        let outcome = tweak_special_request(&backend, &req).unwrap();
        assert!(matches!(outcome, Tweak::NotSpecial));
    }

    #[test]
    fn backend_error_propagates() {
        let backend = MockBackend::new();
        backend.fail_next_clear_halt(BackendError::NoDevice);
        let req = setup(0x02, REQUEST_CLEAR_FEATURE, USB_ENDPOINT_HALT, 0x81);
        assert!(tweak_special_request(&backend, &req).is_err());
    }
}
