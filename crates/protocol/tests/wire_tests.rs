//! Wire-level integration tests for the USB/IP PDU codec.
//!
//! Exercises the byte-level scenarios from the stub engine's testable
//! properties: endian round-tripping of every PDU variant, ISO descriptor
//! packing/padding, and the USB-outcome-to-wire-status table.

use protocol::{
    BasicHeader, CmdSubmit, CmdUnlink, Command, HEADER_SIZE, IsoPacketDescriptor, Pdu, RetSubmit,
    RetUnlink, UsbOutcome, decode_bytes, encode,
};

fn all_pdu_variants() -> Vec<Pdu> {
    vec![
        Pdu::Nop,
        Pdu::CmdSubmit {
            header: BasicHeader::new(Command::CmdSubmit, 1, 0x0001_0002, 1, 1),
            body: CmdSubmit {
                transfer_flags: 0x0000_0200,
                transfer_buffer_length: 64,
                start_frame: 0,
                number_of_packets: -1,
                interval: 0,
                setup: [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00],
            },
        },
        Pdu::CmdUnlink {
            header: BasicHeader::new(Command::CmdUnlink, 100, 0x0001_0002, 0, 0),
            body: CmdUnlink { seqnum: 1 },
        },
        Pdu::RetSubmit {
            header: BasicHeader::new(Command::RetSubmit, 1, 0, 0, 0),
            body: RetSubmit {
                status: 0,
                actual_length: 64,
                start_frame: 0,
                number_of_packets: 0,
                error_count: 0,
            },
        },
        Pdu::RetUnlink {
            header: BasicHeader::new(Command::RetUnlink, 100, 0, 0, 0),
            body: RetUnlink { status: -104 },
        },
    ]
}

#[test]
fn decode_of_encode_is_identity_for_every_variant() {
    for pdu in all_pdu_variants() {
        let bytes = encode(&pdu).expect("encode");
        assert_eq!(bytes.len(), HEADER_SIZE);
        let decoded = decode_bytes(&bytes).expect("decode");
        assert_eq!(decoded, pdu);
    }
}

#[test]
fn iso_in_three_packets_skips_padding_in_actual_length_but_not_offset() {
    // S6: 3 packets of 100/200/100, second only partially filled (150 actual).
    let packets = vec![
        (100u32, 100u32, UsbOutcome::Completed),
        (200u32, 150u32, UsbOutcome::Completed),
        (100u32, 100u32, UsbOutcome::Completed),
    ];
    let trailer = IsoPacketDescriptor::pack_trailer(&packets);

    assert_eq!(trailer.len(), 3);
    // offsets track the padded (requested) length, not actual_length.
    assert_eq!(trailer[0].offset, 0);
    assert_eq!(trailer[1].offset, 100);
    assert_eq!(trailer[2].offset, 300);

    let total_actual: u32 = trailer.iter().map(|d| d.actual_length).sum();
    assert_eq!(total_actual, 100 + 150 + 100);

    let mut buf = Vec::new();
    IsoPacketDescriptor::write_trailer(&mut buf, &trailer).unwrap();
    assert_eq!(buf.len(), trailer.len() * IsoPacketDescriptor::SIZE);

    let mut cursor = std::io::Cursor::new(buf);
    let read_back = IsoPacketDescriptor::read_trailer(&mut cursor, 3).unwrap();
    assert_eq!(read_back, trailer);
}

#[test]
fn status_table_matches_spec() {
    let cases = [
        (UsbOutcome::Completed, 0),
        (UsbOutcome::Cancelled, -104),
        (UsbOutcome::Stall, -32),
        (UsbOutcome::TimedOut, -110),
        (UsbOutcome::Overflow, -75),
        (UsbOutcome::NoDevice, -108),
        (UsbOutcome::Error, -2),
    ];
    for (outcome, wire_status) in cases {
        assert_eq!(outcome.to_wire_status(), wire_status);
    }
}

#[test]
fn nop_is_skipped_not_treated_as_malformed() {
    let bytes = encode(&Pdu::Nop).unwrap();
    assert_eq!(decode_bytes(&bytes).unwrap(), Pdu::Nop);
}

#[test]
fn short_buffer_is_malformed_frame() {
    assert!(decode_bytes(&[0u8; HEADER_SIZE - 1]).is_err());
}
