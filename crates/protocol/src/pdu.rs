//! Command-specific PDU bodies, each zero-padded to [`COMMAND_UNION_SIZE`] bytes.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::Result;
use crate::types::COMMAND_UNION_SIZE;

/// Body of a `CMD_SUBMIT` PDU (28 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdSubmit {
    pub transfer_flags: u32,
    pub transfer_buffer_length: i32,
    pub start_frame: i32,
    pub number_of_packets: i32,
    pub interval: i32,
    pub setup: [u8; 8],
}

impl CmdSubmit {
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let transfer_flags = reader.read_u32::<BigEndian>()?;
        let transfer_buffer_length = reader.read_i32::<BigEndian>()?;
        let start_frame = reader.read_i32::<BigEndian>()?;
        let number_of_packets = reader.read_i32::<BigEndian>()?;
        let interval = reader.read_i32::<BigEndian>()?;
        let mut setup = [0u8; 8];
        reader.read_exact(&mut setup)?;
        Ok(Self {
            transfer_flags,
            transfer_buffer_length,
            start_frame,
            number_of_packets,
            interval,
            setup,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(self.transfer_flags)?;
        writer.write_i32::<BigEndian>(self.transfer_buffer_length)?;
        writer.write_i32::<BigEndian>(self.start_frame)?;
        writer.write_i32::<BigEndian>(self.number_of_packets)?;
        writer.write_i32::<BigEndian>(self.interval)?;
        writer.write_all(&self.setup)?;
        Ok(())
    }
}

/// Body of a `CMD_UNLINK` PDU: the victim seqnum plus 24 reserved bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdUnlink {
    pub seqnum: u32,
}

impl CmdUnlink {
    const RESERVED: usize = COMMAND_UNION_SIZE - 4;

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let seqnum = reader.read_u32::<BigEndian>()?;
        let mut reserved = [0u8; Self::RESERVED];
        reader.read_exact(&mut reserved)?;
        Ok(Self { seqnum })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(self.seqnum)?;
        writer.write_all(&[0u8; Self::RESERVED])?;
        Ok(())
    }
}

/// Body of a `RET_SUBMIT` PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetSubmit {
    pub status: i32,
    pub actual_length: i32,
    pub start_frame: i32,
    pub number_of_packets: i32,
    pub error_count: i32,
}

impl RetSubmit {
    const RESERVED: usize = COMMAND_UNION_SIZE - 20;

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let status = reader.read_i32::<BigEndian>()?;
        let actual_length = reader.read_i32::<BigEndian>()?;
        let start_frame = reader.read_i32::<BigEndian>()?;
        let number_of_packets = reader.read_i32::<BigEndian>()?;
        let error_count = reader.read_i32::<BigEndian>()?;
        let mut reserved = [0u8; Self::RESERVED];
        reader.read_exact(&mut reserved)?;
        Ok(Self { status, actual_length, start_frame, number_of_packets, error_count })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<BigEndian>(self.status)?;
        writer.write_i32::<BigEndian>(self.actual_length)?;
        writer.write_i32::<BigEndian>(self.start_frame)?;
        writer.write_i32::<BigEndian>(self.number_of_packets)?;
        writer.write_i32::<BigEndian>(self.error_count)?;
        writer.write_all(&[0u8; Self::RESERVED])?;
        Ok(())
    }
}

/// Body of a `RET_UNLINK` PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetUnlink {
    pub status: i32,
}

impl RetUnlink {
    const RESERVED: usize = COMMAND_UNION_SIZE - 4;

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let status = reader.read_i32::<BigEndian>()?;
        let mut reserved = [0u8; Self::RESERVED];
        reader.read_exact(&mut reserved)?;
        Ok(Self { status })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<BigEndian>(self.status)?;
        writer.write_all(&[0u8; Self::RESERVED])?;
        Ok(())
    }
}

/// Skip the zeroed 28-byte union that follows a NOP's basic header.
pub fn skip_nop_body<R: Read>(reader: &mut R) -> Result<()> {
    let mut reserved = [0u8; COMMAND_UNION_SIZE];
    reader.read_exact(&mut reserved)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn cmd_submit_round_trips() {
        let body = CmdSubmit {
            transfer_flags: 0x1234,
            transfer_buffer_length: 64,
            start_frame: 0,
            number_of_packets: -1,
            interval: 0,
            setup: [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00],
        };
        let mut buf = Vec::new();
        body.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), crate::types::COMMAND_UNION_SIZE);
        let decoded = CmdSubmit::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn cmd_unlink_round_trips() {
        let body = CmdUnlink { seqnum: 100 };
        let mut buf = Vec::new();
        body.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), crate::types::COMMAND_UNION_SIZE);
        assert_eq!(CmdUnlink::read_from(&mut Cursor::new(buf)).unwrap(), body);
    }

    #[test]
    fn ret_submit_round_trips() {
        let body = RetSubmit {
            status: 0,
            actual_length: 64,
            start_frame: 0,
            number_of_packets: 0,
            error_count: 0,
        };
        let mut buf = Vec::new();
        body.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), crate::types::COMMAND_UNION_SIZE);
        assert_eq!(RetSubmit::read_from(&mut Cursor::new(buf)).unwrap(), body);
    }

    #[test]
    fn ret_unlink_round_trips() {
        let body = RetUnlink { status: -104 };
        let mut buf = Vec::new();
        body.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), crate::types::COMMAND_UNION_SIZE);
        assert_eq!(RetUnlink::read_from(&mut Cursor::new(buf)).unwrap(), body);
    }
}
