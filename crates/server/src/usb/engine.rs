//! Stub engine coordinator: spawns the RX and TX actors for one imported
//! device's session and winds the session down when either one signals a
//! fatal condition or the peer disconnects.
//!
//! This is the cross-cutting event/error coordinator the wire-level
//! components (C2-C5) don't know about themselves: `rx`/`tx` only report
//! how their own loop ended, and it's this module's job to translate that
//! into `StubDevice::begin_closing` plus cancelling whatever the backend
//! still has in flight, mirroring the reference implementation's
//! `usbip_event_happened()` check threaded through both loops.

use std::io::{Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::usb::backend::{CompletionReport, CompletionSink, MockBackend, RusbBackend};
use crate::usb::device::{EndpointTable, SessionState, StubDevice};
use crate::usb::events::{RxOutcome, TxOutcome};
use crate::usb::{rx, tx};

/// Forwards a backend's completion reports into the owning session's
/// transfer registry. Holds only a [`std::sync::Weak`] reference so the
/// backend (which owns this sink) and the device (which owns the backend)
/// don't form a reference cycle.
pub struct RegistrySink {
    device: std::sync::Weak<StubDevice>,
}

impl CompletionSink for RegistrySink {
    fn report(&self, report: CompletionReport) {
        if let Some(device) = self.device.upgrade() {
            let outcome = report.outcome;
            device.registry.on_completion(
                report.handle,
                outcome,
                report.actual_length,
                report.buffer,
                report.iso_results,
            );
            // A NO_DEVICE completion means the physical device vanished
            // mid-session: the spec's REMOVE signal, which tears the whole
            // session down rather than being reported as just this one
            // transfer's outcome. Cancelling the rest is best-effort — they
            // will themselves complete as NO_DEVICE/CANCELLED and drain
            // normally once the TX actor notices `Closing`.
            if outcome.is_device_removal() && device.state() == crate::usb::device::SessionState::Active {
                tracing::warn!(devid = device.devid, "device removed mid-session, tearing down");
                device.begin_closing();
                for handle in device.registry.all_in_init() {
                    let _ = device.backend.cancel(handle);
                }
            }
        }
    }
}

/// Build a session backed by a real `rusb` device handle, wiring the
/// completion trampoline back to the device's own registry via
/// [`Arc::new_cyclic`].
pub fn build_rusb_device(
    devid: u32,
    endpoints: EndpointTable,
    context: rusb::Context,
    handle: rusb::DeviceHandle<rusb::Context>,
) -> Arc<StubDevice> {
    Arc::new_cyclic(|weak| {
        let sink: Arc<dyn CompletionSink> = Arc::new(RegistrySink { device: weak.clone() });
        let backend = Arc::new(RusbBackend::new(context, handle, sink));
        StubDevice::new(devid, endpoints, backend)
    })
}

/// Build a session backed by `backend` (typically a [`MockBackend`]), wired
/// the same way [`build_rusb_device`] wires a real one. Used by this crate's
/// own unit tests and by integration tests that want the full RX/TX
/// pipeline without real hardware.
pub fn build_mock_device(devid: u32, endpoints: EndpointTable, backend: Arc<MockBackend>) -> Arc<StubDevice> {
    Arc::new_cyclic(|weak| {
        let sink: Arc<dyn CompletionSink> = Arc::new(RegistrySink { device: weak.clone() });
        backend.set_sink(sink);
        StubDevice::new(devid, endpoints, backend)
    })
}

/// Handles to the RX and TX threads of one running session.
pub struct EngineHandle {
    rx: JoinHandle<()>,
    tx: JoinHandle<()>,
}

impl EngineHandle {
    /// Block until both actors have exited. Used by the listener's
    /// per-connection task once the socket it handed off is done.
    pub fn join(self) {
        let _ = self.rx.join();
        let _ = self.tx.join();
    }
}

/// Spawn the RX and TX actors for one session. `reader`/`writer` are
/// typically the two halves of a `TcpStream::try_clone()` pair; kept
/// generic so tests can drive the engine over in-memory pipes instead.
pub fn spawn<R, W>(device: Arc<StubDevice>, mut reader: R, mut writer: W) -> EngineHandle
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let rx_device = device.clone();
    let rx_handle = thread::spawn(move || {
        let outcome = rx::run_rx_loop(&mut reader, &rx_device);
        if let RxOutcome::Fatal(reason) = outcome {
            tracing::warn!(devid = rx_device.devid, %reason, "rx pipeline ended fatally");
        }
        rx_device.begin_closing();
        // Ask the backend to cancel everything still outstanding so the TX
        // loop sees a final burst of completions instead of hanging
        // forever waiting on transfers whose client has gone away.
        for handle in rx_device.registry.all_in_init() {
            let _ = rx_device.backend.cancel(handle);
        }
    });

    let tx_device = device.clone();
    let tx_handle = thread::spawn(move || {
        let stop_device = tx_device.clone();
        let outcome = tx::run_tx_loop(&mut writer, &tx_device, move || {
            stop_device.state() == SessionState::Closing
        });
        if let TxOutcome::Fatal(reason) = outcome {
            tracing::warn!(devid = tx_device.devid, %reason, "tx pipeline ended fatally");
            tx_device.begin_closing();
        }
    });

    EngineHandle { rx: rx_handle, tx: tx_handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::device::{EndpointInfo, EndpointTable};
    use protocol::{BasicHeader, Command, Direction, Pdu, TransferType};
    use std::io::Cursor;

    fn device_with_mock() -> (Arc<StubDevice>, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::new());
        let table = EndpointTable::new(vec![EndpointInfo {
            number: 1,
            direction: Direction::In,
            transfer_type: TransferType::Bulk,
            max_packet_size: 512,
        }]);
        let device = crate::usb::engine::build_mock_device(1, table, backend.clone());
        (device, backend)
    }

    #[test]
    fn end_to_end_submit_produces_one_ret_submit() {
        let (device, backend) = device_with_mock();
        backend.queue_response(vec![0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02, 0x03, 0x04]);

        let header = BasicHeader::new(Command::CmdSubmit, 1, 1, Direction::In.as_u32(), 1);
        let body = protocol::CmdSubmit {
            transfer_flags: 0,
            transfer_buffer_length: 8,
            start_frame: 0,
            number_of_packets: -1,
            interval: 0,
            setup: [0; 8],
        };
        let request_bytes = protocol::encode(&Pdu::CmdSubmit { header, body }).unwrap();

        let mut out = Vec::new();
        {
            let mut reader = Cursor::new(request_bytes);
            let outcome = rx::run_rx_loop(&mut reader, &device);
            assert_eq!(outcome, RxOutcome::Closed);
        }
        let sent = tx::pump(&mut out, &device, std::time::Duration::from_millis(0)).unwrap();
        assert_eq!(sent, 1);
        assert_eq!(out.len(), protocol::HEADER_SIZE + 8);

        let decoded = protocol::decode_bytes(&out[..protocol::HEADER_SIZE]).unwrap();
        match decoded {
            Pdu::RetSubmit { header, body } => {
                assert_eq!(header.seqnum, 1);
                assert_eq!(body.status, 0);
                assert_eq!(body.actual_length, 8);
            }
            other => panic!("expected RetSubmit, got {other:?}"),
        }
        assert_eq!(&out[protocol::HEADER_SIZE..], &[0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn no_device_completion_begins_closing_the_session() {
        let (device, backend) = device_with_mock();
        assert_eq!(device.state(), SessionState::Active);

        backend.queue_outcome(protocol::UsbOutcome::NoDevice);
        let header = BasicHeader::new(Command::CmdSubmit, 1, 1, Direction::In.as_u32(), 1);
        let body = protocol::CmdSubmit {
            transfer_flags: 0,
            transfer_buffer_length: 8,
            start_frame: 0,
            number_of_packets: -1,
            interval: 0,
            setup: [0; 8],
        };
        let request_bytes = protocol::encode(&Pdu::CmdSubmit { header, body }).unwrap();
        let mut reader = Cursor::new(request_bytes);
        let outcome = rx::run_rx_loop(&mut reader, &device);
        assert_eq!(outcome, RxOutcome::Closed);

        assert_eq!(device.state(), SessionState::Closing);
    }
}
