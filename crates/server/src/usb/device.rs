//! Per-session device state: the endpoint table and the `StubDevice`
//! handle the RX/TX pipelines and the engine coordinator all share.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use protocol::{Direction, TransferType};

use crate::usb::backend::UsbBackend;
use crate::usb::registry::TransferRegistry;

/// One endpoint's static properties, as read from the active configuration
/// descriptor at import time.
#[derive(Debug, Clone, Copy)]
pub struct EndpointInfo {
    /// 7-bit endpoint number, direction masked off.
    pub number: u8,
    pub direction: Direction,
    pub transfer_type: TransferType,
    pub max_packet_size: u16,
}

/// Built once when a device is imported, from its active configuration's
/// interface descriptors. Endpoint 0 is always present and is always
/// `CONTROL`, `direction` is nominal (control endpoints carry both
/// directions; lookups for endpoint 0 ignore `direction`).
#[derive(Debug, Clone)]
pub struct EndpointTable {
    endpoints: Vec<EndpointInfo>,
}

impl EndpointTable {
    /// Build a table from the device's other endpoints (as read off its
    /// active configuration descriptor), plus the implicit control
    /// endpoint 0.
    pub fn new(mut endpoints: Vec<EndpointInfo>) -> Self {
        endpoints.push(EndpointInfo {
            number: 0,
            direction: Direction::Out,
            transfer_type: TransferType::Control,
            max_packet_size: 64,
        });
        Self { endpoints }
    }

    /// Look up an endpoint by its wire `ep` field (7-bit number, direction
    /// bit masked off) and the direction carried in the basic header.
    /// Endpoint 0 matches regardless of `direction`.
    pub fn lookup(&self, ep: u8, direction: Direction) -> Option<&EndpointInfo> {
        let number = ep & 0x7f;
        self.endpoints.iter().find(|e| {
            e.number == number && (e.number == 0 || e.direction == direction)
        })
    }
}

/// Lifecycle state of one stub session, replacing the reference
/// implementation's commented-out request-validity check: once the session
/// starts tearing down, the RX pipeline rejects further SUBMIT/UNLINK
/// requests instead of racing the backend shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Closing,
}

/// Everything one imported device's stub engine needs: identity, the
/// endpoint table, the transfer registry, and the backend it drives.
pub struct StubDevice {
    pub devid: u32,
    pub endpoints: EndpointTable,
    pub registry: TransferRegistry,
    pub backend: Arc<dyn UsbBackend>,
    closing: AtomicBool,
}

impl StubDevice {
    pub fn new(devid: u32, endpoints: EndpointTable, backend: Arc<dyn UsbBackend>) -> Self {
        Self {
            devid,
            endpoints,
            registry: TransferRegistry::new(),
            backend,
            closing: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.closing.load(Ordering::Acquire) {
            SessionState::Closing
        } else {
            SessionState::Active
        }
    }

    pub fn begin_closing(&self) {
        self.closing.store(true, Ordering::Release);
    }
}
