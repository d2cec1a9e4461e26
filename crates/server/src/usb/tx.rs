//! TX pipeline (C4): drives the backend's event dispatch, drains completed
//! transfers and unlink replies, and serializes them onto the wire.
//!
//! Grounded on the reference `stub_tx_loop`/`stub_send_ret_submit`/
//! `stub_send_ret_unlink`/`poll_events_and_complete`. The "unlink
//! dominance" comment block in the reference source is the authoritative
//! explanation for why a transfer that completes before its UNLINK arrives
//! still only ever produces one reply (the RET_SUBMIT), never both: once
//! `on_completion` has moved a record to `priv_tx`, `TransferRegistry::unlink`
//! no longer finds it in `priv_init` and reports `AlreadyGone`, sending a
//! second, independent RET_UNLINK with status 0 — matching the vhci client's
//! expectation that a late UNLINK is acknowledged even though the data
//! transfer it targeted has already completed.

use std::io::Write;
use std::time::Duration;

use protocol::{BasicHeader, Command, IsoPacketDescriptor, RetSubmit, RetUnlink};

use crate::error::StubError;
use crate::usb::device::StubDevice;
use crate::usb::events::TxOutcome;
use crate::usb::registry::TransferRecord;

/// One poll of the TX pipeline: dispatch backend events, then drain and
/// send every reply that became ready. Returns the number of replies sent,
/// for callers that want to back off when idle.
pub fn pump<W: Write>(writer: &mut W, device: &StubDevice, poll_timeout: Duration) -> Result<usize, TxOutcome> {
    device.backend.dispatch_events(poll_timeout).map_err(to_tx_fatal)?;

    let mut sent = 0;
    for record in device.registry.drain_tx() {
        send_ret_submit(writer, record).map_err(to_tx_fatal)?;
        sent += 1;
    }
    for unlink in device.registry.drain_unlink_tx() {
        send_ret_unlink(writer, unlink.seqnum, unlink.status).map_err(to_tx_fatal)?;
        sent += 1;
    }
    device.registry.reap_free();
    Ok(sent)
}

/// Log the underlying cause before collapsing it to the coordinator signal
/// `TxOutcome` carries — the error itself is never propagated past this
/// point, only its classification.
fn to_tx_fatal(err: impl Into<StubError>) -> TxOutcome {
    let err = err.into();
    tracing::warn!(error = %err, "tx pipeline failed");
    TxOutcome::Fatal(err.signal())
}

/// Run the TX loop until `should_stop` reports true, draining whatever is
/// left one final time before returning.
pub fn run_tx_loop<W: Write>(
    writer: &mut W,
    device: &StubDevice,
    should_stop: impl Fn() -> bool,
) -> TxOutcome {
    loop {
        match pump(writer, device, Duration::from_millis(50)) {
            Ok(_) => {}
            Err(fatal) => return fatal,
        }
        if should_stop() {
            // Drain whatever completed in the same instant we were asked
            // to stop, so the client always sees a reply for every request
            // it sent before the session ended.
            if let Err(fatal) = pump(writer, device, Duration::from_millis(0)) {
                return fatal;
            }
            return TxOutcome::Stopped;
        }
        device.registry.wait_for_tx_work(Duration::from_millis(50));
    }
}

fn send_ret_submit<W: Write>(writer: &mut W, record: TransferRecord) -> std::io::Result<()> {
    let outcome = record.outcome.unwrap_or(protocol::UsbOutcome::Error);
    let is_iso = !record.iso_packets.is_empty();
    let actual_length = if is_iso {
        record.iso_packets.iter().map(|p| p.actual_length as i32).sum()
    } else {
        record.actual_length as i32
    };

    let header = BasicHeader::new(Command::RetSubmit, record.seqnum, 0, 0, 0);
    let body = RetSubmit {
        status: outcome.to_wire_status(),
        actual_length,
        start_frame: 0,
        number_of_packets: if is_iso { record.iso_packets.len() as i32 } else { 0 },
        error_count: 0,
    };

    let mut out = protocol::encode(&protocol::Pdu::RetSubmit { header, body })
        .map_err(std::io::Error::other)?;

    match (record.direction, is_iso) {
        (protocol::Direction::In, false) if actual_length > 0 => {
            out.extend_from_slice(&record.buffer[record.offset..record.offset + actual_length as usize]);
        }
        (protocol::Direction::In, true) => {
            // One contiguous run per packet, each exactly `actual_length`
            // bytes — padding between packets is never sent back, even
            // though the descriptor `offset`s (written below) still
            // account for it.
            let mut cursor = record.offset;
            for packet in &record.iso_packets {
                let len = packet.actual_length as usize;
                out.extend_from_slice(&record.buffer[cursor..cursor + len]);
                cursor += packet.length as usize;
            }
        }
        _ => {}
    }

    if is_iso {
        IsoPacketDescriptor::write_trailer(&mut out, &to_wire_descriptors(&record))
            .map_err(std::io::Error::other)?;
    }

    writer.write_all(&out)
}

fn to_wire_descriptors(record: &TransferRecord) -> Vec<IsoPacketDescriptor> {
    record
        .iso_packets
        .iter()
        .map(|slot| IsoPacketDescriptor {
            offset: slot.offset,
            length: slot.length,
            actual_length: slot.actual_length,
            status: slot.status.to_wire_status(),
        })
        .collect()
}

fn send_ret_unlink<W: Write>(writer: &mut W, seqnum: u32, status: i32) -> std::io::Result<()> {
    let header = BasicHeader::new(Command::RetUnlink, seqnum, 0, 0, 0);
    let body = RetUnlink { status };
    let out = protocol::encode(&protocol::Pdu::RetUnlink { header, body }).map_err(std::io::Error::other)?;
    writer.write_all(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::backend::MockBackend;
    use crate::usb::device::{EndpointInfo, EndpointTable};
    use crate::usb::registry::IsoSlot;
    use protocol::{Direction, TransferType, UsbOutcome};
    use std::sync::Arc;

    fn device() -> StubDevice {
        StubDevice::new(1, EndpointTable::new(Vec::new()), Arc::new(MockBackend::new()))
    }

    #[test]
    fn send_ret_submit_for_in_bulk_includes_payload() {
        let mut out = Vec::new();
        let handle = {
            let d = device();
            let h = d
                .registry
                .register_submit(1, Direction::In, 0x81, TransferType::Bulk, vec![0u8; 4], 0, Vec::new())
                .unwrap();
            d.registry
                .on_completion(h, UsbOutcome::Completed, 4, vec![0xAA, 0xBB, 0xCC, 0xDD], Vec::new());
            let record = d.registry.drain_tx().remove(0);
            send_ret_submit(&mut out, record).unwrap();
            h
        };
        let _ = handle;
        assert_eq!(out.len(), protocol::HEADER_SIZE + 4);
        assert_eq!(&out[protocol::HEADER_SIZE..], &[0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn send_ret_submit_for_out_has_no_payload() {
        let mut out = Vec::new();
        let d = device();
        let h = d
            .registry
            .register_submit(1, Direction::Out, 0x01, TransferType::Bulk, vec![0u8; 4], 0, Vec::new())
            .unwrap();
        d.registry.on_completion(h, UsbOutcome::Completed, 4, Vec::new(), Vec::new());
        let record = d.registry.drain_tx().remove(0);
        send_ret_submit(&mut out, record).unwrap();
        assert_eq!(out.len(), protocol::HEADER_SIZE);
    }

    #[test]
    fn send_ret_submit_iso_skips_padding_between_packets() {
        let mut out = Vec::new();
        let d = device();
        let iso_packets = vec![
            IsoSlot { offset: 0, length: 100, actual_length: 0, status: UsbOutcome::Completed },
            IsoSlot { offset: 100, length: 200, actual_length: 0, status: UsbOutcome::Completed },
        ];
        let h = d
            .registry
            .register_submit(1, Direction::In, 0x82, TransferType::Isochronous, vec![0u8; 300], 0, iso_packets)
            .unwrap();
        let completed_slots = vec![
            IsoSlot { offset: 0, length: 100, actual_length: 100, status: UsbOutcome::Completed },
            IsoSlot { offset: 100, length: 200, actual_length: 50, status: UsbOutcome::Completed },
        ];
        let completed_buffer = {
            let mut buf = vec![1u8; 100];
            buf.extend(vec![2u8; 200]);
            buf
        };
        d.registry
            .on_completion(h, UsbOutcome::Completed, 150, completed_buffer, completed_slots);
        let record = d.registry.drain_tx().remove(0);
        send_ret_submit(&mut out, record).unwrap();
        // header + 100 bytes (packet 0 actual) + 50 bytes (packet 1 actual) + 2*16 trailer
        assert_eq!(out.len(), protocol::HEADER_SIZE + 150 + 2 * IsoPacketDescriptor::SIZE);
    }

    #[test]
    fn send_ret_unlink_is_header_only() {
        let mut out = Vec::new();
        send_ret_unlink(&mut out, 42, 0).unwrap();
        assert_eq!(out.len(), protocol::HEADER_SIZE);
    }
}
