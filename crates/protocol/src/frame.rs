//! Whole-PDU framing: combines a [`BasicHeader`] with its command-specific
//! body into a single `Pdu` value, and provides the pure `encode`/`decode`
//! pair used by the RX/TX pipelines.
//!
//! `decode` only consumes the fixed 48-byte header portion of the stream;
//! any variable-length payload (transfer data, ISO descriptor trailers)
//! is read separately by the caller once it knows the PDU's lengths, since
//! those lengths are only meaningful in light of the endpoint table and
//! queue state that the wire codec itself has no knowledge of.

use std::io::{Cursor, Read, Write};

use crate::error::{Result, WireError};
use crate::header::BasicHeader;
use crate::pdu::{CmdSubmit, CmdUnlink, RetSubmit, RetUnlink, skip_nop_body};
use crate::types::{Command, HEADER_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pdu {
    CmdSubmit { header: BasicHeader, body: CmdSubmit },
    CmdUnlink { header: BasicHeader, body: CmdUnlink },
    RetSubmit { header: BasicHeader, body: RetSubmit },
    RetUnlink { header: BasicHeader, body: RetUnlink },
    Nop,
}

impl Pdu {
    pub fn header(&self) -> Option<&BasicHeader> {
        match self {
            Pdu::CmdSubmit { header, .. }
            | Pdu::CmdUnlink { header, .. }
            | Pdu::RetSubmit { header, .. }
            | Pdu::RetUnlink { header, .. } => Some(header),
            Pdu::Nop => None,
        }
    }
}

/// Decode exactly one fixed-size 48-byte PDU header+body from `reader`.
///
/// `NOP` (command 0) is a recognized no-op, not malformed, and decodes to
/// [`Pdu::Nop`] after consuming and discarding its zeroed union.
pub fn decode<R: Read>(reader: &mut R) -> Result<Pdu> {
    let header = BasicHeader::read_from(reader)?;
    match header.command() {
        Ok(Command::Nop) => {
            skip_nop_body(reader)?;
            Ok(Pdu::Nop)
        }
        Ok(Command::CmdSubmit) => Ok(Pdu::CmdSubmit { header, body: CmdSubmit::read_from(reader)? }),
        Ok(Command::CmdUnlink) => Ok(Pdu::CmdUnlink { header, body: CmdUnlink::read_from(reader)? }),
        Ok(Command::RetSubmit) => Ok(Pdu::RetSubmit { header, body: RetSubmit::read_from(reader)? }),
        Ok(Command::RetUnlink) => Ok(Pdu::RetUnlink { header, body: RetUnlink::read_from(reader)? }),
        Err(WireError::UnknownCommand { command }) => Err(WireError::UnknownCommand { command }),
        Err(other) => Err(other),
    }
}

/// Decode a PDU from an in-memory byte slice (must be exactly [`HEADER_SIZE`] bytes).
pub fn decode_bytes(bytes: &[u8]) -> Result<Pdu> {
    if bytes.len() != HEADER_SIZE {
        return Err(WireError::MalformedFrame {
            reason: format!("expected {HEADER_SIZE} bytes, got {}", bytes.len()),
        });
    }
    decode(&mut Cursor::new(bytes))
}

/// Encode a PDU's fixed header+body portion. Pure: does not touch any socket.
pub fn encode(pdu: &Pdu) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_SIZE);
    match pdu {
        Pdu::CmdSubmit { header, body } => {
            header.write_to(&mut buf)?;
            body.write_to(&mut buf)?;
        }
        Pdu::CmdUnlink { header, body } => {
            header.write_to(&mut buf)?;
            body.write_to(&mut buf)?;
        }
        Pdu::RetSubmit { header, body } => {
            header.write_to(&mut buf)?;
            body.write_to(&mut buf)?;
        }
        Pdu::RetUnlink { header, body } => {
            header.write_to(&mut buf)?;
            body.write_to(&mut buf)?;
        }
        Pdu::Nop => {
            let header = BasicHeader::new(Command::Nop, 0, 0, 0, 0);
            header.write_to(&mut buf)?;
            buf.write_all(&[0u8; crate::types::COMMAND_UNION_SIZE])?;
        }
    }
    debug_assert_eq!(buf.len(), HEADER_SIZE);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{CmdSubmit, RetSubmit};

    fn submit_pdu(seqnum: u32) -> Pdu {
        Pdu::CmdSubmit {
            header: BasicHeader::new(Command::CmdSubmit, seqnum, 1, 1, 1),
            body: CmdSubmit {
                transfer_flags: 0,
                transfer_buffer_length: 64,
                start_frame: 0,
                number_of_packets: 0,
                interval: 0,
                setup: [0; 8],
            },
        }
    }

    #[test]
    fn encode_then_decode_is_identity_for_submit() {
        let pdu = submit_pdu(42);
        let bytes = encode(&pdu).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(decode_bytes(&bytes).unwrap(), pdu);
    }

    #[test]
    fn encode_then_decode_is_identity_for_ret_submit() {
        let pdu = Pdu::RetSubmit {
            header: BasicHeader::new(Command::RetSubmit, 1, 1, 0, 0),
            body: RetSubmit { status: 0, actual_length: 18, start_frame: 0, number_of_packets: 0, error_count: 0 },
        };
        let bytes = encode(&pdu).unwrap();
        assert_eq!(decode_bytes(&bytes).unwrap(), pdu);
    }

    #[test]
    fn nop_is_ignored_not_malformed() {
        let bytes = encode(&Pdu::Nop).unwrap();
        assert_eq!(decode_bytes(&bytes).unwrap(), Pdu::Nop);
    }

    #[test]
    fn unknown_command_is_malformed() {
        let mut bytes = encode(&submit_pdu(1)).unwrap();
        bytes[3] = 0x7f; // corrupt the low byte of `command`
        assert!(matches!(decode_bytes(&bytes), Err(WireError::UnknownCommand { .. })));
    }

    #[test]
    fn wrong_length_is_malformed() {
        assert!(matches!(decode_bytes(&[0u8; 10]), Err(WireError::MalformedFrame { .. })));
    }
}
