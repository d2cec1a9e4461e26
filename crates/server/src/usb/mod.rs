//! The per-device USB/IP stub engine.
//!
//! Each imported device gets one [`device::StubDevice`] plus a pair of
//! actors spawned by [`engine::spawn`]: an RX actor decoding and dispatching
//! incoming PDUs ([`rx`]), and a TX actor draining completed transfers and
//! serializing replies ([`tx`]). Both drive state through
//! [`registry::TransferRegistry`], consult [`tweak`] for the handful of
//! control requests that need special handling, and submit real work
//! through the [`backend::UsbBackend`] abstraction.

pub mod backend;
pub mod device;
pub mod engine;
pub mod events;
pub mod registry;
pub mod rx;
pub mod tweak;
pub mod tx;

pub use backend::{BackendError, MockBackend, RusbBackend, UsbBackend};
pub use device::{EndpointInfo, EndpointTable, SessionState, StubDevice};
pub use engine::{EngineHandle, build_mock_device, build_rusb_device, spawn};
pub use events::{FatalReason, RxOutcome, TxOutcome};
pub use registry::{IsoSlot, TransferHandle, TransferRegistry};
